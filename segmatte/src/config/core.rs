//! Core configuration structures for decoding and preprocessing.

use burn::prelude::*;

use super::enums::*;
use crate::error::{SegMatteError, SegMatteResult};

/// ImageNet channel means, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations, RGB order.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration of the label decoder and compositor.
#[derive(Config, Debug)]
pub struct MatteConfig {
    /// Color mask channels strictly above this value become opaque.
    #[config(default = "0")]
    pub threshold: u8,
    /// Side of the square Gaussian kernel that softens the matte. Must be odd.
    #[config(default = "7")]
    pub blur_kernel_size: usize,
    /// Gaussian sigma. `None` derives it from the kernel size.
    #[config(default = "None")]
    pub blur_sigma: Option<f64>,
    /// Per-channel or whole-pixel alpha.
    #[config(default = "MatteMode::PerChannel")]
    pub mode: MatteMode,
    /// Color laid behind the foreground.
    #[config(default = "[255, 255, 255]")]
    pub background: [u8; 3],
    /// Filter used to resize the source image onto the class map grid.
    ///
    /// `Triangle` widens its support when shrinking, so large sources come
    /// out softer than with a plain two-tap bilinear resize.
    #[config(default = "ResizeFilter::Triangle")]
    pub source_filter: ResizeFilter,
}

impl MatteConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the blur kernel is even or zero, or
    /// if an explicit sigma is not a positive finite number.
    pub fn validate(&self) -> SegMatteResult<()> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(SegMatteError::InvalidConfiguration {
                reason: format!(
                    "blur kernel size must be odd and positive, got {}",
                    self.blur_kernel_size
                ),
            });
        }

        if let Some(sigma) = self.blur_sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(SegMatteError::InvalidConfiguration {
                    reason: format!("blur sigma must be positive, got {sigma}"),
                });
            }
        }

        Ok(())
    }
}

/// Configuration of the image preprocessing that feeds the network.
///
/// Defaults reproduce torchvision's `Resize(256)`, `CenterCrop(224)`,
/// `ToTensor()`, `Normalize(IMAGENET_MEAN, IMAGENET_STD)`.
#[derive(Config, Debug)]
pub struct PreprocessConfig {
    /// Target length of the shorter image side. `None` keeps the input size.
    #[config(default = "Some(256)")]
    pub resize: Option<u32>,
    /// Side of the square center crop. `None` disables cropping.
    #[config(default = "Some(224)")]
    pub crop: Option<u32>,
    /// Filter used by the resize step.
    #[config(default = "ResizeFilter::Triangle")]
    pub filter: ResizeFilter,
    /// Per-channel mean subtracted after scaling to [0, 1].
    #[config(default = "IMAGENET_MEAN")]
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided out after the mean.
    #[config(default = "IMAGENET_STD")]
    pub std: [f32; 3],
}

impl PreprocessConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for zero sizes or a non-positive std.
    pub fn validate(&self) -> SegMatteResult<()> {
        if self.resize == Some(0) || self.crop == Some(0) {
            return Err(SegMatteError::InvalidConfiguration {
                reason: "resize and crop sizes must be positive".to_string(),
            });
        }

        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(SegMatteError::InvalidConfiguration {
                reason: format!("normalization std must be positive, got {:?}", self.std),
            });
        }

        Ok(())
    }
}
