//! torchvision-compatible semantic segmentation networks.
//!
//! - `fcn`: FCN head on a dilated ResNet
//! - `deeplab`: DeepLabV3 (ASPP) head on a dilated ResNet

pub mod deeplab;
pub mod fcn;

use burn::prelude::*;
pub use deeplab::{Aspp, AsppConfig, DeepLabHead, DeepLabHeadConfig, DeepLabV3};
pub use fcn::{Fcn, FcnHead, FcnHeadConfig};
pub use resnet::{ResNetConfig, ResNetDepth};

use crate::{
    config::Architecture,
    error::{SegMatteError, SegMatteResult},
    filters::index_tensor,
    inference::SegmentationModel,
};

/// Names accepted by [`SegmentationNetConfig::from_name`] in canonical form.
pub const MODEL_NAMES: [&str; 4] = [
    "fcn_resnet50",
    "fcn_resnet101",
    "deeplabv3_resnet50",
    "deeplabv3_resnet101",
];

/// Source neighbours and blend weight of every output position of one axis,
/// sampling pixel centers (`align_corners = false`).
fn linear_taps(input: usize, output: usize) -> (Vec<i64>, Vec<i64>, Vec<f32>) {
    let scale = input as f64 / output as f64;
    let last = input.saturating_sub(1);

    let mut lower = Vec::with_capacity(output);
    let mut upper = Vec::with_capacity(output);
    let mut weights = Vec::with_capacity(output);
    for dst in 0..output {
        let src = ((dst as f64 + 0.5) * scale - 0.5).max(0.0);
        let lo = (src.floor() as usize).min(last);
        let hi = (lo + 1).min(last);
        lower.push(lo as i64);
        upper.push(hi as i64);
        weights.push((src - lo as f64) as f32);
    }
    (lower, upper, weights)
}

/// Linear interpolation of `x` along `dim` (2 or 3) to `output` samples.
fn resize_axis<B: Backend>(x: Tensor<B, 4>, dim: usize, output: usize) -> Tensor<B, 4> {
    let input = x.dims()[dim];
    if input == output {
        return x;
    }

    let device = x.device();
    let (lower, upper, weights) = linear_taps(input, output);
    let mut shape = [1, 1, 1, 1];
    shape[dim] = output;
    let weights = Tensor::<B, 1>::from_floats(weights.as_slice(), &device).reshape(shape);

    let low = x.clone().select(dim, index_tensor::<B>(lower, &device));
    let high = x.select(dim, index_tensor::<B>(upper, &device));
    low.clone() + (high - low) * weights
}

/// Bilinear resize of a feature map to `size`, matching PyTorch's
/// `interpolate(mode="bilinear", align_corners=False)`.
pub(crate) fn upsample_to<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let x = resize_axis(x, 2, size[0]);
    resize_axis(x, 3, size[1])
}

/// Which network to build.
#[derive(Config, Debug)]
pub struct SegmentationNetConfig {
    #[config(default = "Architecture::DeepLabV3")]
    pub architecture: Architecture,
    #[config(default = "ResNetDepth::ResNet101")]
    pub depth: ResNetDepth,
    /// PASCAL VOC has 20 object classes plus background.
    #[config(default = "21")]
    pub num_classes: usize,
}

impl SegmentationNetConfig {
    /// Parse a model name such as `deeplabv3_resnet101`.
    ///
    /// Short forms (`fcn101`, `deeplab50`, `deeplabv3-resnet50`) are accepted
    /// too; matching ignores case.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the name does not describe a supported network.
    pub fn from_name(name: &str) -> SegMatteResult<Self> {
        let unknown = || SegMatteError::UnknownModel {
            name: name.to_string(),
            available: MODEL_NAMES.join(", "),
        };

        let normalized: String = name
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .collect();

        let (architecture, rest) = if let Some(rest) = normalized.strip_prefix("deeplabv3") {
            (Architecture::DeepLabV3, rest)
        } else if let Some(rest) = normalized.strip_prefix("deeplab") {
            (Architecture::DeepLabV3, rest)
        } else if let Some(rest) = normalized.strip_prefix("fcn") {
            (Architecture::Fcn, rest)
        } else {
            return Err(unknown());
        };

        let depth = match rest.strip_prefix("resnet").unwrap_or(rest) {
            "50" => ResNetDepth::ResNet50,
            "101" => ResNetDepth::ResNet101,
            _ => return Err(unknown()),
        };

        Ok(Self::new()
            .with_architecture(architecture)
            .with_depth(depth))
    }

    /// Canonical torchvision name, e.g. `fcn_resnet101`.
    pub fn name(&self) -> String {
        let depth = match self.depth {
            ResNetDepth::ResNet50 => 50,
            ResNetDepth::ResNet101 => 101,
        };
        format!("{}_resnet{depth}", self.architecture.prefix())
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when `num_classes` is zero.
    pub fn validate(&self) -> SegMatteResult<()> {
        if self.num_classes == 0 {
            return Err(SegMatteError::InvalidConfiguration {
                reason: "a segmentation network needs at least one class".to_string(),
            });
        }
        Ok(())
    }

    /// Build a randomly initialized network.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the configuration does not validate.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegMatteResult<SegmentationNet<B>> {
        self.validate()?;
        let backbone = ResNetConfig::new().with_depth(self.depth.clone()).init(device);

        Ok(match self.architecture {
            Architecture::Fcn => {
                SegmentationNet::Fcn(Fcn::new(backbone, self.num_classes, device))
            }
            Architecture::DeepLabV3 => {
                SegmentationNet::DeepLabV3(DeepLabV3::new(backbone, self.num_classes, device))
            }
        })
    }
}

/// Either supported network.
#[derive(Debug)]
pub enum SegmentationNet<B: Backend> {
    Fcn(Fcn<B>),
    DeepLabV3(DeepLabV3<B>),
}

impl<B: Backend> SegmentationNet<B> {
    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Fcn(_) => Architecture::Fcn,
            Self::DeepLabV3(_) => Architecture::DeepLabV3,
        }
    }
}

impl<B: Backend> SegmentationModel<B> for SegmentationNet<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Fcn(net) => net.forward(input),
            Self::DeepLabV3(net) => net.forward(input),
        }
    }

    fn num_classes(&self) -> usize {
        match self {
            Self::Fcn(net) => net.num_classes(),
            Self::DeepLabV3(net) => net.num_classes(),
        }
    }
}

impl<B: Backend> SegmentationModel<B> for Fcn<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        Fcn::forward(self, input)
    }

    fn num_classes(&self) -> usize {
        Fcn::num_classes(self)
    }
}

impl<B: Backend> SegmentationModel<B> for DeepLabV3<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        DeepLabV3::forward(self, input)
    }

    fn num_classes(&self) -> usize {
        DeepLabV3::num_classes(self)
    }
}
