//! Label decoding and background replacement.
//!
//! A class map is painted with the palette, the resulting color mask is
//! thresholded and softened into an alpha matte, and the matte blends the
//! source image over a flat background.

use std::path::Path;

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use image::{DynamicImage, RgbImage};

use crate::{
    config::{MatteConfig, MatteMode},
    error::{SegMatteError, SegMatteResult},
    filters::{gaussian_blur, gaussian_kernel_1d},
    image::ImageUtils,
    palette::Palette,
};

/// Paint a `[H, W]` class map with `palette` (a `[num_classes, 3]` tensor).
///
/// Returns a `[3, H, W]` color mask on the 0..255 scale. Indices outside
/// the palette stay black.
pub fn decode_segmap<B: Backend>(class_map: Tensor<B, 2, Int>, palette: Tensor<B, 2>) -> Tensor<B, 3> {
    let [height, width] = class_map.dims();
    let [num_classes, _] = palette.dims();

    let flat = class_map.reshape([height * width]);
    let valid = flat
        .clone()
        .lower_elem(num_classes as i64)
        .float()
        .mul(flat.clone().greater_equal_elem(0).float())
        .unsqueeze_dim::<2>(1);

    let indices = flat.clamp(0, num_classes as i64 - 1);
    let colors = palette.select(0, indices).mul(valid);

    colors.reshape([height, width, 3]).permute([2, 0, 1])
}

/// Turn a color mask into an alpha matte in [0, 1].
///
/// Channels above `config.threshold` become 255, the result is blurred with
/// the configured Gaussian, rounded to 8-bit levels and scaled down.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if the blur settings are invalid.
pub fn alpha_matte<B: Backend>(
    color_mask: Tensor<B, 3>,
    config: &MatteConfig,
) -> SegMatteResult<Tensor<B, 3>> {
    config.validate()?;
    let kernel = gaussian_kernel_1d(config.blur_kernel_size, config.blur_sigma)?;
    Ok(matte_with_kernel(color_mask, config, &kernel))
}

fn matte_with_kernel<B: Backend>(
    color_mask: Tensor<B, 3>,
    config: &MatteConfig,
    kernel: &[f32],
) -> Tensor<B, 3> {
    let threshold = f32::from(config.threshold);

    let binary = match config.mode {
        MatteMode::PerChannel => color_mask.greater_elem(threshold).float(),
        MatteMode::Foreground => {
            let any = color_mask.max_dim(0).greater_elem(threshold).float();
            Tensor::cat(vec![any.clone(), any.clone(), any], 0)
        }
    };

    gaussian_blur(binary * 255.0, kernel).round().clamp(0.0, 255.0) / 255.0
}

/// Blend `foreground` over a flat `background` color using `alpha`.
///
/// `foreground` is `[3, H, W]` on the 0..255 scale and `alpha` has the same
/// shape in [0, 1]. The result is in [0, 1].
///
/// # Errors
///
/// Returns `DimensionMismatch` when the two grids differ in shape.
pub fn composite<B: Backend>(
    foreground: Tensor<B, 3>,
    alpha: Tensor<B, 3>,
    background: [u8; 3],
) -> SegMatteResult<Tensor<B, 3>> {
    let fg_dims = foreground.dims();
    let alpha_dims = alpha.dims();
    if fg_dims != alpha_dims || fg_dims[0] != 3 {
        return Err(SegMatteError::DimensionMismatch {
            left: "foreground",
            left_dims: fg_dims,
            right: "alpha",
            right_dims: alpha_dims,
        });
    }

    let device = foreground.device();
    let background =
        Tensor::<B, 1>::from_floats(background.map(f32::from), &device).reshape([3, 1, 1]);

    let blended = foreground * alpha.clone() + background * (alpha.neg() + 1.0);
    Ok((blended / 255.0).clamp(0.0, 1.0))
}

/// A composited image, `[3, H, W]` in [0, 1].
#[derive(Debug, Clone)]
pub struct Composite<B: Backend> {
    image: Tensor<B, 3>,
}

impl<B: Backend> Composite<B> {
    /// Dimensions as `[channels, height, width]`.
    pub fn dims(&self) -> [usize; 3] {
        self.image.dims()
    }

    /// The underlying tensor.
    pub fn tensor(&self) -> &Tensor<B, 3> {
        &self.image
    }

    pub fn into_tensor(self) -> Tensor<B, 3> {
        self.image
    }

    /// Normalized pixel values in HWC order.
    ///
    /// # Errors
    ///
    /// Returns `TensorConversion` if the data cannot be read back.
    pub fn to_rgb32f(&self) -> SegMatteResult<Vec<f32>> {
        self.image
            .clone()
            .permute([1, 2, 0])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SegMatteError::TensorConversion {
                reason: format!("{e:?}"),
            })
    }

    /// Quantize to an 8-bit RGB image.
    ///
    /// # Errors
    ///
    /// Returns `TensorConversion` if the data cannot be read back.
    pub fn to_rgb_image(&self) -> SegMatteResult<RgbImage> {
        ImageUtils::tensor_to_rgb_image(self.image.clone() * 255.0)
    }
}

/// Decodes class maps into composites with a fixed palette and matte setup.
#[derive(Debug, Clone)]
pub struct Compositor<B: Backend> {
    palette: Palette,
    palette_tensor: Tensor<B, 2>,
    config: MatteConfig,
    kernel: Vec<f32>,
    device: B::Device,
}

impl<B: Backend> Compositor<B> {
    /// Create a compositor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` does not validate.
    pub fn new(palette: Palette, config: MatteConfig, device: &B::Device) -> SegMatteResult<Self> {
        config.validate()?;
        let kernel = gaussian_kernel_1d(config.blur_kernel_size, config.blur_sigma)?;

        Ok(Self {
            palette_tensor: palette.to_tensor(device),
            palette,
            config,
            kernel,
            device: device.clone(),
        })
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn config(&self) -> &MatteConfig {
        &self.config
    }

    /// Decode `class_map` against the image stored at `source`.
    ///
    /// # Errors
    ///
    /// Returns `ImageLoad` if the source cannot be read, and otherwise the
    /// errors of [`Self::decode_image`].
    pub fn decode<P: AsRef<Path>>(
        &self,
        class_map: Tensor<B, 2, Int>,
        source: P,
    ) -> SegMatteResult<Composite<B>> {
        let source = ImageUtils::open(source)?;
        self.decode_image(class_map, &source)
    }

    /// Decode `class_map` against an in-memory source image.
    ///
    /// The source is resized to the class map's size before blending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTensorShape` for an empty class map.
    pub fn decode_image(
        &self,
        class_map: Tensor<B, 2, Int>,
        source: &DynamicImage,
    ) -> SegMatteResult<Composite<B>> {
        let [height, width] = class_map.dims();
        if height == 0 || width == 0 {
            return Err(SegMatteError::InvalidTensorShape {
                expected: "non-empty [height, width] class map".to_string(),
                actual: format!("{:?}", [height, width]),
            });
        }

        let color_mask = decode_segmap(
            class_map.to_device(&self.device),
            self.palette_tensor.clone(),
        );

        let resized = ImageUtils::resize_exact(
            source,
            width as u32,
            height as u32,
            &self.config.source_filter,
        );
        let foreground = ImageUtils::to_rgb_tensor::<B>(&resized, &self.device);

        let alpha = matte_with_kernel(color_mask, &self.config, &self.kernel);
        let image = composite(foreground, alpha, self.config.background)?;

        tracing::debug!(height, width, "decoded class map");
        Ok(Composite { image })
    }
}

/// Build a class map tensor from row-major indices.
pub fn class_map_from_indices<B: Backend>(
    indices: Vec<i64>,
    height: usize,
    width: usize,
    device: &B::Device,
) -> SegMatteResult<Tensor<B, 2, Int>> {
    if indices.len() != height * width {
        return Err(SegMatteError::InvalidTensorShape {
            expected: format!("{} indices for a {height}x{width} map", height * width),
            actual: indices.len().to_string(),
        });
    }

    Ok(Tensor::from_data(
        TensorData::new(indices, [height, width]).convert::<B::IntElem>(),
        device,
    ))
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use image::Rgb;

    use super::*;

    type TestBackend = NdArray;

    fn to_vec(tensor: Tensor<TestBackend, 3>) -> Vec<f32> {
        tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    fn uniform_map(class: i64, height: usize, width: usize) -> Tensor<TestBackend, 2, Int> {
        class_map_from_indices(vec![class; height * width], height, width, &Default::default())
            .unwrap()
    }

    fn gradient_source(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 30) as u8, ((x + y) * 7) as u8])
        }))
    }

    fn compositor() -> Compositor<TestBackend> {
        Compositor::new(
            Palette::pascal_voc(),
            MatteConfig::new(),
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn decode_segmap_paints_every_class() {
        let device = Default::default();
        let palette = Palette::pascal_voc();
        let map =
            class_map_from_indices::<TestBackend>((0..21).collect(), 3, 7, &device).unwrap();

        let mask = to_vec(decode_segmap(map, palette.to_tensor(&device)));
        let plane = 21;
        for class in 0..21 {
            let expected = palette.color(class).unwrap();
            for channel in 0..3 {
                assert_eq!(
                    mask[channel * plane + class],
                    f32::from(expected[channel]),
                    "class {class} channel {channel}"
                );
            }
        }
    }

    #[test]
    fn out_of_range_classes_stay_black() {
        let device = Default::default();
        let palette = Palette::pascal_voc();
        let map = class_map_from_indices::<TestBackend>(vec![15, 21, 255, -1], 2, 2, &device)
            .unwrap();

        let mask = to_vec(decode_segmap(map, palette.to_tensor(&device)));
        assert_eq!(mask[0], 192.0);
        for channel in 0..3 {
            assert_eq!(&mask[channel * 4 + 1..channel * 4 + 4], &[0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn all_background_is_white() {
        let composite = compositor()
            .decode_image(uniform_map(0, 6, 8), &gradient_source(8, 6))
            .unwrap();

        assert_eq!(composite.dims(), [3, 6, 8]);
        assert!(composite.to_rgb32f().unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn full_foreground_reproduces_source() {
        let source = gradient_source(8, 6);
        // Person: all three palette channels are non-zero.
        let composite = compositor()
            .decode_image(uniform_map(15, 6, 8), &source)
            .unwrap();

        let values = composite.to_rgb32f().unwrap();
        let expected: Vec<f32> = source
            .to_rgb8()
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();

        assert_eq!(values.len(), expected.len());
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
    }

    #[test]
    fn per_channel_matte_keeps_only_lit_channels() {
        // Aeroplane is (128, 0, 0): only red shows the source.
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, Rgb([51, 102, 153])));
        let composite = compositor()
            .decode_image(uniform_map(1, 5, 5), &source)
            .unwrap();

        let values = composite.to_rgb32f().unwrap();
        for pixel in values.chunks(3) {
            assert!((pixel[0] - 0.2).abs() < 1e-5);
            assert_eq!(pixel[1], 1.0);
            assert_eq!(pixel[2], 1.0);
        }
    }

    #[test]
    fn foreground_matte_shares_alpha_across_channels() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 5, Rgb([51, 102, 153])));
        let config = MatteConfig::new().with_mode(MatteMode::Foreground);
        let compositor =
            Compositor::<TestBackend>::new(Palette::pascal_voc(), config, &Default::default())
                .unwrap();

        let values = compositor
            .decode_image(uniform_map(1, 5, 5), &source)
            .unwrap()
            .to_rgb32f()
            .unwrap();
        for pixel in values.chunks(3) {
            assert!((pixel[0] - 0.2).abs() < 1e-5);
            assert!((pixel[1] - 0.4).abs() < 1e-5);
            assert!((pixel[2] - 0.6).abs() < 1e-5);
        }
    }

    #[test]
    fn source_is_resized_to_class_map() {
        let composite = compositor()
            .decode_image(uniform_map(15, 4, 9), &gradient_source(32, 20))
            .unwrap();
        assert_eq!(composite.dims(), [3, 4, 9]);
        assert_eq!(composite.to_rgb_image().unwrap().dimensions(), (9, 4));
    }

    #[test]
    fn matte_edges_are_soft_and_bounded() {
        let device = Default::default();
        let palette = Palette::pascal_voc();
        let mut indices = vec![0i64; 10 * 10];
        for y in 3..7 {
            for x in 3..7 {
                indices[y * 10 + x] = 15;
            }
        }
        let map = class_map_from_indices::<TestBackend>(indices.clone(), 10, 10, &device).unwrap();
        let mask = decode_segmap(map, palette.to_tensor(&device));
        let alpha = to_vec(alpha_matte(mask, &MatteConfig::new()).unwrap());

        assert!(alpha.iter().all(|&a| (0.0..=1.0).contains(&a)));
        // Blur spreads into the border ring.
        assert!(alpha[2 * 10 + 5] > 0.0 && alpha[2 * 10 + 5] < 1.0);
        // Corners see the square only through the outer taps, once directly
        // and once reflected: 255 * 0.0625^2 rounds up to one level.
        for corner in [alpha[0], alpha[10 * 10 - 1]] {
            assert!((corner - 1.0 / 255.0).abs() < 1e-6);
        }
        // Every alpha is an 8-bit level.
        for a in alpha {
            let level = a * 255.0;
            assert!((level - level.round()).abs() < 1e-3);
        }

        let composite = compositor()
            .decode_image(
                class_map_from_indices(indices, 10, 10, &device).unwrap(),
                &gradient_source(10, 10),
            )
            .unwrap();
        assert!(composite
            .to_rgb32f()
            .unwrap()
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn decoding_is_deterministic() {
        let device = Default::default();
        let indices: Vec<i64> = (0..48).map(|i| (i * 7) % 21).collect();
        let source = gradient_source(8, 6);
        let compositor = compositor();

        let first = compositor
            .decode_image(
                class_map_from_indices(indices.clone(), 6, 8, &device).unwrap(),
                &source,
            )
            .unwrap()
            .to_rgb32f()
            .unwrap();
        let second = compositor
            .decode_image(class_map_from_indices(indices, 6, 8, &device).unwrap(), &source)
            .unwrap()
            .to_rgb32f()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn decode_reads_source_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.png");
        let source = gradient_source(8, 6);
        source.save(&path).unwrap();

        let compositor = compositor();
        let from_disk = compositor.decode(uniform_map(15, 6, 8), &path).unwrap();
        let in_memory = compositor
            .decode_image(uniform_map(15, 6, 8), &source)
            .unwrap();
        assert_eq!(from_disk.to_rgb32f().unwrap(), in_memory.to_rgb32f().unwrap());

        let missing = compositor.decode(uniform_map(15, 6, 8), dir.path().join("missing.png"));
        assert!(matches!(missing, Err(SegMatteError::ImageLoad { .. })));
    }

    #[test]
    fn composite_rejects_mismatched_grids() {
        let device = Default::default();
        let fg = Tensor::<TestBackend, 3>::zeros([3, 4, 4], &device);
        let alpha = Tensor::<TestBackend, 3>::zeros([3, 4, 5], &device);
        assert!(matches!(
            composite(fg, alpha, [255, 255, 255]),
            Err(SegMatteError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn custom_background_color_is_used() {
        let config = MatteConfig::new().with_background([0, 255, 0]);
        let compositor =
            Compositor::<TestBackend>::new(Palette::pascal_voc(), config, &Default::default())
                .unwrap();
        let image = compositor
            .decode_image(uniform_map(0, 3, 3), &gradient_source(3, 3))
            .unwrap()
            .to_rgb_image()
            .unwrap();
        assert!(image.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn empty_class_map_is_rejected() {
        let device = Default::default();
        let map = class_map_from_indices::<TestBackend>(Vec::new(), 0, 4, &device).unwrap();
        assert!(compositor()
            .decode_image(map, &gradient_source(4, 4))
            .is_err());
    }
}
