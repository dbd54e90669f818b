//! Inference driver: image preprocessing, network forward and arg-max.

use std::{collections::BTreeMap, path::Path};

use burn::{prelude::*, tensor::Int};
use image::{imageops, DynamicImage, GenericImageView, RgbImage};

use crate::{
    config::{PreprocessConfig, ResizeFilter},
    error::{SegMatteError, SegMatteResult},
    image::ImageUtils,
    palette::Palette,
};

/// A network producing per-class logits for a batch of images.
pub trait SegmentationModel<B: Backend> {
    /// Map `[N, 3, H, W]` normalized images to `[N, num_classes, H, W]` logits.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;
}

/// Channel-wise mean/std normalization of `[N, 3, H, W]` tensors.
#[derive(Debug, Clone)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    pub fn new(mean: [f32; 3], std: [f32; 3], device: &B::Device) -> Self {
        let mean = Tensor::<B, 1>::from_floats(mean, device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(std, device).reshape([1, 3, 1, 1]);
        Self { mean, std }
    }

    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn denormalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        input * self.std.clone() + self.mean.clone()
    }
}

/// Resize so the shorter side becomes `size`; the longer side is scaled
/// proportionally and truncated.
pub fn resize_shorter(image: &RgbImage, size: u32, filter: &ResizeFilter) -> RgbImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = if width <= height {
        (size, (u64::from(size) * u64::from(height) / u64::from(width)) as u32)
    } else {
        ((u64::from(size) * u64::from(width) / u64::from(height)) as u32, size)
    };

    if (new_width, new_height) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, new_width, new_height, filter.filter_type())
}

/// Take a centered `size` x `size` window.
///
/// Images smaller than the window are padded with black first. Offsets
/// round half to even.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();

    let padded = if width < size || height < size {
        let canvas_width = width.max(size);
        let canvas_height = height.max(size);
        let mut canvas = RgbImage::new(canvas_width, canvas_height);
        imageops::replace(
            &mut canvas,
            image,
            i64::from((canvas_width - width) / 2),
            i64::from((canvas_height - height) / 2),
        );
        canvas
    } else {
        image.clone()
    };

    let (width, height) = padded.dimensions();
    let left = crop_offset(width, size);
    let top = crop_offset(height, size);
    imageops::crop_imm(&padded, left, top, size, size).to_image()
}

fn crop_offset(length: u32, size: u32) -> u32 {
    (f64::from(length - size) / 2.0).round_ties_even() as u32
}

/// Apply the geometric part of preprocessing: optional shorter-side resize,
/// then optional center crop.
pub fn prepare_image(image: &DynamicImage, config: &PreprocessConfig) -> RgbImage {
    let mut rgb = image.to_rgb8();
    if let Some(size) = config.resize {
        rgb = resize_shorter(&rgb, size, &config.filter);
    }
    if let Some(size) = config.crop {
        rgb = center_crop(&rgb, size);
    }
    rgb
}

fn normalized_input<B: Backend>(
    image: &DynamicImage,
    config: &PreprocessConfig,
    normalizer: &Normalizer<B>,
    device: &B::Device,
) -> Tensor<B, 4> {
    let prepared = prepare_image(image, config);
    let tensor = ImageUtils::rgb_image_to_tensor::<B>(&prepared, device) / 255.0;
    normalizer.normalize(tensor.unsqueeze::<4>())
}

/// Turn an image into a normalized `[1, 3, H, W]` network input.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if `config` does not validate.
pub fn preprocess<B: Backend>(
    image: &DynamicImage,
    config: &PreprocessConfig,
    device: &B::Device,
) -> SegMatteResult<Tensor<B, 4>> {
    config.validate()?;
    let normalizer = Normalizer::new(config.mean, config.std, device);
    Ok(normalized_input(image, config, &normalizer, device))
}

/// Reduce `[1, C, H, W]` logits to a `[H, W]` class map by arg-max over `C`.
///
/// # Errors
///
/// Returns `InvalidTensorShape` when the batch is not exactly one image.
pub fn class_map<B: Backend>(logits: Tensor<B, 4>) -> SegMatteResult<Tensor<B, 2, Int>> {
    let [batch, channels, height, width] = logits.dims();
    if batch != 1 || channels == 0 {
        return Err(SegMatteError::InvalidTensorShape {
            expected: "[1, classes, height, width]".to_string(),
            actual: format!("{:?}", [batch, channels, height, width]),
        });
    }

    Ok(logits.argmax(1).reshape([height, width]))
}

/// How much of the image a class covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPresence {
    pub class: usize,
    pub name: String,
    pub pixels: usize,
}

/// A class map together with the image it was computed from.
#[derive(Debug, Clone)]
pub struct Segmentation<B: Backend> {
    pub class_map: Tensor<B, 2, Int>,
    pub source: DynamicImage,
}

impl<B: Backend> Segmentation<B> {
    /// Classes occurring in the map, ascending, with their pixel counts.
    ///
    /// # Errors
    ///
    /// Returns `TensorConversion` if the class map cannot be read back.
    pub fn present_classes(&self, palette: &Palette) -> SegMatteResult<Vec<ClassPresence>> {
        let indices = self
            .class_map
            .clone()
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| SegMatteError::TensorConversion {
                reason: format!("{e:?}"),
            })?;

        let mut counts = BTreeMap::<i64, usize>::new();
        for index in indices {
            *counts.entry(index).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .filter_map(|(index, pixels)| {
                let class = usize::try_from(index).ok()?;
                let name = palette.name(class).unwrap_or("unknown").to_string();
                Some(ClassPresence {
                    class,
                    name,
                    pixels,
                })
            })
            .collect())
    }
}

/// Runs a segmentation network on whole images.
#[derive(Debug)]
pub struct Segmenter<B: Backend, M> {
    model: M,
    config: PreprocessConfig,
    normalizer: Normalizer<B>,
    device: B::Device,
}

impl<B: Backend, M: SegmentationModel<B>> Segmenter<B, M> {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` does not validate.
    pub fn new(model: M, config: PreprocessConfig, device: &B::Device) -> SegMatteResult<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: Normalizer::new(config.mean, config.std, device),
            model,
            config,
            device: device.clone(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Segment the image stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ImageLoad` if the image cannot be read, and otherwise the
    /// errors of [`Self::segment_image`].
    pub fn segment<P: AsRef<Path>>(&self, path: P) -> SegMatteResult<Segmentation<B>> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "segmenting image");

        let source = ImageUtils::open(path)?;
        self.segment_image(&source)
    }

    /// Segment an in-memory image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTensorShape` if the network output does not carry the
    /// advertised number of classes.
    pub fn segment_image(&self, source: &DynamicImage) -> SegMatteResult<Segmentation<B>> {
        let input = normalized_input(source, &self.config, &self.normalizer, &self.device);
        let [_, _, height, width] = input.dims();

        let logits = self.model.forward(input);
        let dims = logits.dims();
        if dims[1] != self.model.num_classes() {
            return Err(SegMatteError::InvalidTensorShape {
                expected: format!("[1, {}, height, width]", self.model.num_classes()),
                actual: format!("{dims:?}"),
            });
        }

        let class_map = class_map(logits)?;
        let (source_width, source_height) = source.dimensions();
        tracing::debug!(
            source_width,
            source_height,
            height,
            width,
            "computed class map"
        );

        Ok(Segmentation {
            class_map,
            source: source.clone(),
        })
    }
}

/// Logits that put all mass on one class per pixel; handy for stub models.
#[cfg(any(test, feature = "test-utils"))]
pub fn one_hot_logits<B: Backend>(
    classes: &[i64],
    num_classes: usize,
    height: usize,
    width: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let mut data = vec![0.0f32; num_classes * height * width];
    for (pixel, &class) in classes.iter().enumerate().take(height * width) {
        if let Ok(class) = usize::try_from(class) {
            if class < num_classes {
                data[class * height * width + pixel] = 1.0;
            }
        }
    }

    Tensor::from_data(
        burn::tensor::TensorData::new(data, [1, num_classes, height, width])
            .convert::<B::FloatElem>(),
        device,
    )
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use image::Rgb;

    use super::*;

    type TestBackend = NdArray;

    /// Marks the left half of every input as class 15 and the rest as background.
    struct HalfPerson;

    impl SegmentationModel<TestBackend> for HalfPerson {
        fn forward(&self, input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 4> {
            let [_, _, height, width] = input.dims();
            let classes: Vec<i64> = (0..height * width)
                .map(|i| if i % width < width / 2 { 15 } else { 0 })
                .collect();
            one_hot_logits(&classes, 21, height, width, &input.device())
        }

        fn num_classes(&self) -> usize {
            21
        }
    }

    fn map_values(map: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        map.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn resize_shorter_truncates_long_side() {
        let landscape = RgbImage::new(500, 375);
        assert_eq!(
            resize_shorter(&landscape, 256, &ResizeFilter::Triangle).dimensions(),
            (341, 256)
        );
        let portrait = RgbImage::new(300, 451);
        assert_eq!(
            resize_shorter(&portrait, 256, &ResizeFilter::Triangle).dimensions(),
            (256, 384)
        );
    }

    #[test]
    fn center_crop_offsets_round_half_to_even() {
        // (341 - 224) / 2 = 58.5 rounds to 58.
        let image = RgbImage::from_fn(341, 224, |x, _| Rgb([(x % 256) as u8, 0, 0]));
        let cropped = center_crop(&image, 224);
        assert_eq!(cropped.dimensions(), (224, 224));
        assert_eq!(cropped.get_pixel(0, 0)[0], 58);

        // (227 - 224) / 2 = 1.5 rounds to 2.
        let image = RgbImage::from_fn(227, 224, |x, _| Rgb([x as u8, 0, 0]));
        assert_eq!(center_crop(&image, 224).get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn center_crop_pads_small_images() {
        let image = RgbImage::from_pixel(4, 2, Rgb([200, 200, 200]));
        let cropped = center_crop(&image, 6);
        assert_eq!(cropped.dimensions(), (6, 6));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(cropped.get_pixel(1, 2), &Rgb([200, 200, 200]));
        assert_eq!(cropped.get_pixel(1, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn preprocess_produces_normalized_crop() {
        let device = Default::default();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([255, 0, 124])));

        let input =
            preprocess::<TestBackend>(&image, &PreprocessConfig::new(), &device).unwrap();
        assert_eq!(input.dims(), [1, 3, 224, 224]);

        let values = input.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let plane = 224 * 224;
        assert!((values[0] - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((values[plane] - (0.0 - 0.456) / 0.224).abs() < 1e-4);
        assert!((values[2 * plane] - (124.0 / 255.0 - 0.406) / 0.225).abs() < 1e-4);
    }

    #[test]
    fn preprocess_without_resize_or_crop_keeps_size() {
        let device = Default::default();
        let image = DynamicImage::ImageRgb8(RgbImage::new(33, 17));
        let config = PreprocessConfig::new().with_resize(None).with_crop(None);

        let input = preprocess::<TestBackend>(&image, &config, &device).unwrap();
        assert_eq!(input.dims(), [1, 3, 17, 33]);
    }

    #[test]
    fn normalizer_round_trips() {
        let device = Default::default();
        let normalizer = Normalizer::<TestBackend>::new([0.5; 3], [0.25; 3], &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 2, 2], &device);

        let normalized = normalizer.normalize(input);
        let values = normalized
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|&v| (v - 2.0).abs() < 1e-6));

        let restored = normalizer
            .denormalize(normalized)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        assert!(restored.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn class_map_takes_arg_max() {
        let device = Default::default();
        let logits = one_hot_logits::<TestBackend>(&[3, 0, 20, 7, 7, 1], 21, 2, 3, &device);

        let map = class_map(logits).unwrap();
        assert_eq!(map.dims(), [2, 3]);
        assert_eq!(map_values(map), vec![3, 0, 20, 7, 7, 1]);
    }

    #[test]
    fn class_map_rejects_batches() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 4>::zeros([2, 21, 4, 4], &device);
        assert!(matches!(
            class_map(logits),
            Err(SegMatteError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn segmenter_runs_model_on_preprocessed_image() {
        let device = Default::default();
        let segmenter =
            Segmenter::<TestBackend, _>::new(HalfPerson, PreprocessConfig::new(), &device)
                .unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(320, 240));

        let segmentation = segmenter.segment_image(&image).unwrap();
        assert_eq!(segmentation.class_map.dims(), [224, 224]);
        assert_eq!(segmentation.source.dimensions(), (320, 240));

        let present = segmentation
            .present_classes(&Palette::pascal_voc())
            .unwrap();
        assert_eq!(present.len(), 2);
        assert_eq!(present[0].name, "background");
        assert_eq!(present[1].class, 15);
        assert_eq!(present[1].name, "person");
        assert_eq!(present[1].pixels, 112 * 224);
    }

    #[test]
    fn segment_reads_image_from_disk() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.png");
        RgbImage::new(64, 48).save(&path).unwrap();

        let config = PreprocessConfig::new().with_resize(Some(32)).with_crop(Some(16));
        let segmenter = Segmenter::<TestBackend, _>::new(HalfPerson, config, &device).unwrap();
        let segmentation = segmenter.segment(&path).unwrap();
        assert_eq!(segmentation.class_map.dims(), [16, 16]);

        assert!(matches!(
            segmenter.segment(dir.path().join("missing.png")),
            Err(SegMatteError::ImageLoad { .. })
        ));
    }

    #[test]
    fn segmenter_rejects_invalid_config() {
        let device = Default::default();
        let config = PreprocessConfig::new().with_crop(Some(0));
        assert!(Segmenter::<TestBackend, _>::new(HalfPerson, config, &device).is_err());
    }
}
