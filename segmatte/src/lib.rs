//! # SegMatte
//!
//! Background replacement driven by semantic segmentation, on Burn.
//!
//! An image goes through a torchvision-compatible FCN or DeepLabV3 network,
//! the per-pixel arg-max class map is painted with the PASCAL VOC palette,
//! and the painted mask becomes a blurred alpha matte that blends the
//! original image over a white background.
//!
//! ## Modules
//!
//! - `palette`: class colors and names
//! - `filters`: Gaussian blur with reflected borders
//! - `decode`: class map to composite ([`Compositor`])
//! - `inference`: preprocessing, [`SegmentationModel`], [`Segmenter`]
//! - `models`: ResNet-based FCN and DeepLabV3 networks
//! - `weights`: PyTorch, safetensors and Burn record loading
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use burn::backend::NdArray;
//! use segmatte_burn::{
//!     load_net, Compositor, MatteConfig, Palette, PreprocessConfig, SegmentationNetConfig,
//!     Segmenter,
//! };
//!
//! # fn main() -> Result<(), segmatte_burn::SegMatteError> {
//! let device = Default::default();
//! let config = SegmentationNetConfig::from_name("deeplabv3_resnet101")?;
//! let net = load_net::<NdArray>(&config, Path::new("deeplabv3_resnet101.pth"), &device)?;
//!
//! let segmenter = Segmenter::new(net, PreprocessConfig::new(), &device)?;
//! let compositor = Compositor::new(Palette::pascal_voc(), MatteConfig::new(), &device)?;
//!
//! let segmentation = segmenter.segment("photo.jpg")?;
//! let composite = compositor.decode_image(segmentation.class_map, &segmentation.source)?;
//! composite.to_rgb_image()?.save("photo_matte.png").ok();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod filters;
pub mod image;
pub mod inference;
pub mod models;
pub mod palette;
pub mod weights;

mod tests;

pub use config::{
    Architecture, MatteConfig, MatteMode, PreprocessConfig, ResizeFilter, IMAGENET_MEAN,
    IMAGENET_STD,
};
pub use decode::{
    alpha_matte, class_map_from_indices, composite, decode_segmap, Composite, Compositor,
};
pub use error::{SegMatteError, SegMatteResult};
pub use crate::image::ImageUtils;
pub use inference::{
    class_map, preprocess, ClassPresence, Normalizer, Segmentation, SegmentationModel, Segmenter,
};
pub use models::{SegmentationNet, SegmentationNetConfig, MODEL_NAMES};
pub use palette::Palette;
pub use weights::{load_module, load_net, save_mpk, save_net, WeightFormat};
