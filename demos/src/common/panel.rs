//! Side-by-side panels of equally tall images.

use image::{imageops, RgbImage};

/// Scale `image` to `height`, keeping its aspect ratio.
fn scale_to_height(image: &RgbImage, height: u32) -> RgbImage {
    let (width, current) = image.dimensions();
    if current == height {
        return image.clone();
    }
    let scaled_width =
        ((f64::from(width) * f64::from(height) / f64::from(current)).round() as u32).max(1);
    imageops::resize(image, scaled_width, height, imageops::FilterType::Triangle)
}

/// Place `panels` left to right at a common height.
///
/// `height` defaults to the tallest panel.
pub fn side_by_side(panels: &[&RgbImage], height: Option<u32>) -> RgbImage {
    let height = height
        .or_else(|| panels.iter().map(|p| p.height()).max())
        .unwrap_or(0)
        .max(1);

    let scaled: Vec<RgbImage> = panels
        .iter()
        .filter(|p| p.width() > 0 && p.height() > 0)
        .map(|p| scale_to_height(p, height))
        .collect();
    let width = scaled.iter().map(RgbImage::width).sum::<u32>().max(1);

    let mut canvas = RgbImage::new(width, height);
    let mut x = 0i64;
    for panel in &scaled {
        imageops::replace(&mut canvas, panel, x, 0);
        x += i64::from(panel.width());
    }
    canvas
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn panels_share_the_tallest_height() {
        let left = RgbImage::from_pixel(40, 30, Rgb([255, 0, 0]));
        let right = RgbImage::from_pixel(20, 60, Rgb([0, 0, 255]));

        let panel = side_by_side(&[&left, &right], None);
        // left is scaled to 80x60
        assert_eq!(panel.dimensions(), (100, 60));
        assert_eq!(panel.get_pixel(10, 10), &Rgb([255, 0, 0]));
        assert_eq!(panel.get_pixel(90, 10), &Rgb([0, 0, 255]));
    }

    #[test]
    fn explicit_height_rescales_everything() {
        let left = RgbImage::new(224, 224);
        let right = RgbImage::new(224, 224);
        assert_eq!(side_by_side(&[&left, &right], Some(112)).dimensions(), (224, 112));
    }
}
