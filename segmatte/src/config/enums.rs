//! Enumeration types for segmatte configuration.

use burn::prelude::*;
use image::imageops::FilterType;

/// How the color mask turns into an alpha matte.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum MatteMode {
    /// Each channel is thresholded on its own, so a class color with a zero
    /// channel lets the background through on that channel.
    PerChannel,
    /// A pixel is foreground when any channel of its class color is non-zero;
    /// all three channels share one alpha.
    Foreground,
}

/// Resampling filter used when resizing images.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ResizeFilter {
    /// Nearest neighbour.
    Nearest,
    /// Linear (bilinear) filter.
    Triangle,
    /// Cubic filter.
    CatmullRom,
    /// Gaussian filter.
    Gaussian,
    /// Lanczos with window 3.
    Lanczos3,
}

impl ResizeFilter {
    /// The matching `image` crate filter.
    pub const fn filter_type(&self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Segmentation head placed on top of the backbone.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Architecture {
    /// Fully convolutional head (torchvision `fcn_*`).
    Fcn,
    /// Atrous spatial pyramid pooling head (torchvision `deeplabv3_*`).
    DeepLabV3,
}

impl Architecture {
    /// Prefix used in torchvision model names.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Fcn => "fcn",
            Self::DeepLabV3 => "deeplabv3",
        }
    }
}
