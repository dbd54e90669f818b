//! SegMatte command line tools
//!
//! ## Available binaries
//!
//! - `segment`: run one or more segmentation networks over a directory of
//!   images and save original | composite panels
//! - `converter`: convert a torchvision checkpoint to a Burn record
//!
//! ## Usage
//!
//! ```bash
//! # Segment every image in photos/ with two networks
//! cargo run --release --bin segment -- photos \
//!     --model fcn101=models/fcn_resnet101.pth \
//!     --model deeplab101=models/deeplabv3_resnet101.pth
//!
//! # Convert a checkpoint once, load the .mpk afterwards
//! cargo run --release --bin converter -- deeplabv3_resnet101 \
//!     models/deeplabv3_resnet101.pth models/deeplabv3_resnet101.mpk
//! ```

pub mod common;
pub mod config;
pub mod runner;

pub use common::{create_device, get_backend_name, init_tracing, SelectedBackend, SelectedDevice};
pub use config::{ConverterConfig, ModelSpec, SegmentConfig};
pub use runner::{list_images, output_path, Runner};
