//! Dilated ResNet backbone for semantic segmentation.
//!
//! The implementation follows torchvision's ResNet, including the
//! `replace_stride_with_dilation` option the segmentation models use to keep
//! an output stride of 8. Module field names line up with torchvision's
//! state dict after a handful of key remaps (`bn1`/`conv1` live under `stem`,
//! layer blocks under `blocks`, shortcut layers under `downsample.conv/bn`).

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use core::f64::consts::SQRT_2;

mod blocks;
pub use blocks::*;

// ResNet residual layer block configs
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];

/// Output of every residual stage.
#[derive(Debug, Clone)]
pub struct ResNetOutput<B: Backend> {
    /// Layer1 output (1/4 scale)
    pub layer1: Tensor<B, 4>,
    /// Layer2 output (1/8 scale)
    pub layer2: Tensor<B, 4>,
    /// Layer3 output (1/8 or 1/16 scale, depending on dilation)
    pub layer3: Tensor<B, 4>,
    /// Layer4 output (1/8, 1/16 or 1/32 scale, depending on dilation)
    pub layer4: Tensor<B, 4>,
}

/// ResNet backbone.
/// Derived from torchvision.models.resnet.ResNet
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    pub stem: Stem<B>,
    pub layer1: LayerBlock<B>,
    pub layer2: LayerBlock<B>,
    pub layer3: LayerBlock<B>,
    pub layer4: LayerBlock<B>,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Forward pass returning the output of each residual stage.
    pub fn forward(&self, input: Tensor<B, 4>) -> ResNetOutput<B> {
        let x = self.stem.forward(input);
        let layer1 = self.layer1.forward(x);
        let layer2 = self.layer2.forward(layer1.clone());
        let layer3 = self.layer3.forward(layer2.clone());
        let layer4 = self.layer4.forward(layer3.clone());

        ResNetOutput {
            layer1,
            layer2,
            layer3,
            layer4,
        }
    }

    /// Number of channels produced by `layer4`.
    pub const fn out_channels() -> usize {
        512 * EXPANSION
    }

    fn new(blocks: [usize; 4], replace_stride_with_dilation: [bool; 3], device: &Device<B>) -> Self {
        let stem = Stem::new(3, 64, device);

        let layer1 = LayerBlock::new(blocks[0], 64, 64 * EXPANSION, 1, 1, 1, device);

        // torchvision tracks a running dilation: a dilated layer trades its
        // stride for a larger dilation, and its first block keeps the
        // previous one.
        let mut dilation = 1;
        let mut make_layer = |num_blocks: usize, in_channels: usize, dilate: bool| {
            let previous_dilation = dilation;
            let stride = if dilate {
                dilation *= 2;
                1
            } else {
                2
            };
            LayerBlock::new(
                num_blocks,
                in_channels,
                in_channels * 2,
                stride,
                previous_dilation,
                dilation,
                device,
            )
        };

        let layer2 = make_layer(blocks[1], 64 * EXPANSION, replace_stride_with_dilation[0]);
        let layer3 = make_layer(blocks[2], 128 * EXPANSION, replace_stride_with_dilation[1]);
        let layer4 = make_layer(blocks[3], 256 * EXPANSION, replace_stride_with_dilation[2]);

        Self {
            stem,
            layer1,
            layer2,
            layer3,
            layer4,
        }
    }
}

/// First conv block: conv1 + bn1 + relu + maxpool
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        self.maxpool.forward(out)
    }

    /// Create a new Stem.
    pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // 7x7 conv, stride=2, padding=3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        let bn1 = BatchNormConfig::new(out_channels).init(device);

        // 3x3 maxpool, stride=2, padding=1
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            maxpool,
        }
    }
}

/// Supported backbone depths.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ResNetDepth {
    /// 3-4-6-3 bottleneck layout.
    ResNet50,
    /// 3-4-23-3 bottleneck layout.
    ResNet101,
}

impl ResNetDepth {
    /// Blocks per residual stage.
    pub const fn blocks(&self) -> [usize; 4] {
        match self {
            Self::ResNet50 => RESNET50_BLOCKS,
            Self::ResNet101 => RESNET101_BLOCKS,
        }
    }
}

/// ResNet configuration
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Backbone depth.
    #[config(default = "ResNetDepth::ResNet101")]
    pub depth: ResNetDepth,
    /// Trade the stride of layer2..layer4 for dilation.
    /// Segmentation models use `[false, true, true]` (output stride 8).
    #[config(default = "[false, true, true]")]
    pub replace_stride_with_dilation: [bool; 3],
}

impl ResNetConfig {
    /// ResNet-50 configured for segmentation.
    pub fn resnet50() -> Self {
        Self::new().with_depth(ResNetDepth::ResNet50)
    }

    /// ResNet-101 configured for segmentation.
    pub fn resnet101() -> Self {
        Self::new().with_depth(ResNetDepth::ResNet101)
    }

    /// Ratio between input resolution and `layer4` resolution.
    pub fn output_stride(&self) -> usize {
        self.replace_stride_with_dilation
            .iter()
            .fold(4, |stride, &dilate| if dilate { stride } else { stride * 2 })
    }

    /// Initialize ResNet model
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetBackbone<B> {
        ResNetBackbone::new(self.depth.blocks(), self.replace_stride_with_dilation, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet_config() {
        let config = ResNetConfig::resnet50();
        assert_eq!(config.depth.blocks(), [3, 4, 6, 3]);
        assert_eq!(config.replace_stride_with_dilation, [false, true, true]);
        assert_eq!(config.output_stride(), 8);

        let undilated = ResNetConfig::resnet101().with_replace_stride_with_dilation([false; 3]);
        assert_eq!(undilated.output_stride(), 32);
    }

    #[test]
    fn test_dilation_schedule_matches_torchvision() {
        let device = Default::default();
        let model = ResNetConfig::resnet50().init::<TestBackend>(&device);

        assert_eq!(model.layer1.dilations(), vec![1, 1, 1]);
        assert_eq!(model.layer2.dilations(), vec![1, 1, 1, 1]);
        assert_eq!(model.layer3.dilations(), vec![1, 2, 2, 2, 2, 2]);
        assert_eq!(model.layer4.dilations(), vec![2, 4, 4]);
    }

    #[test]
    fn test_resnet101_depth() {
        let device = Default::default();
        let model = ResNetConfig::resnet101().init::<TestBackend>(&device);
        assert_eq!(model.layer3.len(), 23);
    }

    #[test]
    fn test_resnet_forward_output_stride_8() {
        let device = Default::default();
        let model = ResNetConfig::resnet50().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input);

        assert_eq!(output.layer1.dims(), [1, 256, 16, 16]);
        assert_eq!(output.layer2.dims(), [1, 512, 8, 8]);
        assert_eq!(output.layer3.dims(), [1, 1024, 8, 8]);
        assert_eq!(output.layer4.dims(), [1, 2048, 8, 8]);
        assert_eq!(ResNetBackbone::<TestBackend>::out_channels(), 2048);
    }

    #[test]
    fn test_resnet_forward_without_dilation() {
        let device = Default::default();
        let model = ResNetConfig::resnet50()
            .with_replace_stride_with_dilation([false; 3])
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input);

        assert_eq!(output.layer4.dims(), [1, 2048, 2, 2]); // 64 / 32
    }
}
