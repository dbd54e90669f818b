//! Configuration module for segmatte.
//!
//! - `core`: configuration structures for decoding and preprocessing
//! - `enums`: enumeration types used by those structures

pub mod core;
pub mod enums;

pub use self::core::{MatteConfig, PreprocessConfig, IMAGENET_MEAN, IMAGENET_STD};

pub use self::enums::{Architecture, MatteMode, ResizeFilter};
