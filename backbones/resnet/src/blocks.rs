//! ResNet block implementations.
//!
//! Segmentation networks only use the bottleneck variant, so this module holds
//! the dilated `Bottleneck`, its `Downsample` shortcut, and the `LayerBlock`
//! that stacks them.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Channel expansion of the bottleneck's last 1x1 convolution.
pub const EXPANSION: usize = 4;

fn kaiming() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// ResNet bottleneck residual block.
/// Derived from torchvision.models.resnet.Bottleneck
///
/// The stride sits on the 3x3 convolution (ResNet V1.5), and that convolution
/// is dilated with `padding == dilation` so the spatial size only depends on
/// the stride.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.relu.forward(out)
    }

    /// Create a new Bottleneck.
    ///
    /// `out_channels` is the expanded width; the inner width is
    /// `out_channels / EXPANSION`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        dilation: usize,
        device: &Device<B>,
    ) -> Self {
        let width = out_channels / EXPANSION;

        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, width], [1, 1])
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn1 = BatchNormConfig::new(width).init(device);

        // conv3x3, dilated
        let conv2 = Conv2dConfig::new([width, width], [3, 3])
            .with_stride([stride, stride])
            .with_dilation([dilation, dilation])
            .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn2 = BatchNormConfig::new(width).init(device);

        // conv1x1
        let conv3 = Conv2dConfig::new([width, out_channels], [1, 1])
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn3 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
        }
    }

    /// Dilation of the 3x3 convolution.
    pub fn dilation(&self) -> usize {
        self.conv2.dilation[0]
    }
}

/// 1x1 conv + BN shortcut used when the block changes resolution or width.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

/// Collection of sequential bottleneck blocks.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<Bottleneck<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }

    /// Create a new LayerBlock.
    ///
    /// Mirrors torchvision's `_make_layer`: the first block runs with
    /// `previous_dilation` and the layer's stride, every later block with
    /// `dilation` and stride 1.
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        previous_dilation: usize,
        dilation: usize,
        device: &Device<B>,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                if b == 0 {
                    Bottleneck::new(in_channels, out_channels, stride, previous_dilation, device)
                } else {
                    Bottleneck::new(out_channels, out_channels, 1, dilation, device)
                }
            })
            .collect();

        Self { blocks }
    }

    /// Number of bottleneck blocks in this layer.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the layer holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Dilations of each block, in order.
    pub fn dilations(&self) -> Vec<usize> {
        self.blocks.iter().map(Bottleneck::dilation).collect()
    }
}
