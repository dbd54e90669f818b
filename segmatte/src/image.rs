//! Conversions between `image` buffers and `[C, H, W]` tensors on the 0..255 scale.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::{
    config::ResizeFilter,
    error::{SegMatteError, SegMatteResult},
};

/// Image conversion helpers.
pub struct ImageUtils;

impl ImageUtils {
    /// Open an image file.
    ///
    /// # Errors
    ///
    /// Returns `ImageLoad` when the file cannot be read or decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> SegMatteResult<DynamicImage> {
        let path = path.as_ref();
        image::open(path).map_err(|source| SegMatteError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Convert an image to an RGB tensor of shape `[3, height, width]` with
    /// values in 0..=255. Alpha is discarded, grayscale is replicated.
    pub fn to_rgb_tensor<B: Backend>(image: &DynamicImage, device: &B::Device) -> Tensor<B, 3> {
        Self::rgb_image_to_tensor(&image.to_rgb8(), device)
    }

    /// Same as [`Self::to_rgb_tensor`] for an 8-bit RGB buffer.
    pub fn rgb_image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 3> {
        let (width, height) = image.dimensions();
        let buf: Vec<f32> = image.as_raw().iter().map(|&v| f32::from(v)).collect();

        let data =
            TensorData::new(buf, [height as usize, width as usize, 3]).convert::<B::FloatElem>();
        Tensor::<B, 3>::from_data(data, device).permute([2, 0, 1])
    }

    /// Resize `image` to exactly `width` x `height`, skipping the work when
    /// it already has that size.
    pub fn resize_exact(
        image: &DynamicImage,
        width: u32,
        height: u32,
        filter: &ResizeFilter,
    ) -> DynamicImage {
        if image.dimensions() == (width, height) {
            image.clone()
        } else {
            image.resize_exact(width, height, filter.filter_type())
        }
    }

    /// Convert a `[3, height, width]` tensor on the 0..255 scale back into an
    /// 8-bit image. Values are rounded and saturated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTensorShape` if the tensor does not have three
    /// channels and `TensorConversion` if its data cannot be read back.
    pub fn tensor_to_rgb_image<B: Backend>(tensor: Tensor<B, 3>) -> SegMatteResult<RgbImage> {
        let [channels, height, width] = tensor.dims();
        if channels != 3 {
            return Err(SegMatteError::InvalidTensorShape {
                expected: "[3, height, width]".to_string(),
                actual: format!("{:?}", [channels, height, width]),
            });
        }

        let data = tensor
            .clamp(0.0, 255.0)
            .round()
            .permute([1, 2, 0])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SegMatteError::TensorConversion {
                reason: format!("{e:?}"),
            })?;

        let raw: Vec<u8> = data.into_iter().map(|v| v as u8).collect();
        RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
            SegMatteError::TensorConversion {
                reason: format!("buffer does not fit a {width}x{height} RGB image"),
            }
        })
    }
}
