//! DeepLabV3 segmentation network and its Atrous Spatial Pyramid Pooling head.
//! Derived from torchvision.models.segmentation.deeplabv3

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use resnet::ResNetBackbone;

use super::upsample_to;

/// Channels of every ASPP branch and of the head's hidden layer.
pub const ASPP_CHANNELS: usize = 256;

/// Atrous rates of the three dilated ASPP branches at output stride 8.
pub const ATROUS_RATES: [usize; 3] = [12, 24, 36];

/// One ASPP branch: conv, BN, ReLU.
///
/// The first branch is a 1x1 convolution, the others are 3x3 atrous
/// convolutions with `padding == dilation`.
#[derive(Module, Debug)]
pub struct AsppConv<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> AsppConv<B> {
    fn pointwise(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    fn atrous(in_channels: usize, out_channels: usize, rate: usize, device: &Device<B>) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(rate, rate))
                .with_dilation([rate, rate])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }

    pub fn dilation(&self) -> usize {
        self.conv.dilation[0]
    }
}

/// Image-level branch: global average pool, 1x1 conv, BN, ReLU, then
/// broadcast back to the feature size.
#[derive(Module, Debug)]
pub struct AsppPooling<B: Backend> {
    pool: AdaptiveAvgPool2d,
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> AsppPooling<B> {
    fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let x = self.pool.forward(x);
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        upsample_to(x, [height, width])
    }
}

/// Configuration for [`Aspp`].
#[derive(Config, Debug)]
pub struct AsppConfig {
    pub in_channels: usize,
    #[config(default = "ATROUS_RATES")]
    pub atrous_rates: [usize; 3],
    #[config(default = "ASPP_CHANNELS")]
    pub out_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl AsppConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Aspp<B> {
        let mut convs = vec![AsppConv::pointwise(
            self.in_channels,
            self.out_channels,
            device,
        )];
        convs.extend(
            self.atrous_rates
                .iter()
                .map(|&rate| AsppConv::atrous(self.in_channels, self.out_channels, rate, device)),
        );

        let branches = convs.len() + 1;

        Aspp {
            convs,
            pooling: AsppPooling::new(self.in_channels, self.out_channels, device),
            project: Conv2dConfig::new([branches * self.out_channels, self.out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            project_bn: BatchNormConfig::new(self.out_channels).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Atrous Spatial Pyramid Pooling.
///
/// Four convolutional branches and one pooling branch run in parallel; their
/// outputs are concatenated and projected back to `out_channels`.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height, width]`
#[derive(Module, Debug)]
pub struct Aspp<B: Backend> {
    convs: Vec<AsppConv<B>>,
    pooling: AsppPooling<B>,
    project: Conv2d<B>,
    project_bn: BatchNorm<B, 2>,
    relu: Relu,
    dropout: Dropout,
}

impl<B: Backend> Aspp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut branches: Vec<_> = self
            .convs
            .iter()
            .map(|branch| branch.forward(x.clone()))
            .collect();
        branches.push(self.pooling.forward(x));

        let x = Tensor::cat(branches, 1);
        let x = self.project.forward(x);
        let x = self.project_bn.forward(x);
        let x = self.relu.forward(x);
        self.dropout.forward(x)
    }

    /// Dilation of every convolutional branch, in order.
    pub fn dilations(&self) -> Vec<usize> {
        self.convs.iter().map(AsppConv::dilation).collect()
    }
}

/// Configuration for [`DeepLabHead`].
#[derive(Config, Debug)]
pub struct DeepLabHeadConfig {
    pub in_channels: usize,
    pub num_classes: usize,
}

impl DeepLabHeadConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DeepLabHead<B> {
        DeepLabHead {
            aspp: AsppConfig::new(self.in_channels).init(device),
            conv: Conv2dConfig::new([ASPP_CHANNELS, ASPP_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(ASPP_CHANNELS).init(device),
            relu: Relu::new(),
            out: Conv2dConfig::new([ASPP_CHANNELS, self.num_classes], [1, 1]).init(device),
        }
    }
}

/// ASPP, then 3x3 conv, BN, ReLU and a 1x1 conv to class logits.
#[derive(Module, Debug)]
pub struct DeepLabHead<B: Backend> {
    pub aspp: Aspp<B>,
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    out: Conv2d<B>,
}

impl<B: Backend> DeepLabHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.aspp.forward(x);
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.out.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.out.weight.val().dims()[0]
    }
}

/// Dilated ResNet followed by a [`DeepLabHead`] on the last stage.
#[derive(Module, Debug)]
pub struct DeepLabV3<B: Backend> {
    pub backbone: ResNetBackbone<B>,
    pub classifier: DeepLabHead<B>,
}

impl<B: Backend> DeepLabV3<B> {
    pub fn new(backbone: ResNetBackbone<B>, num_classes: usize, device: &Device<B>) -> Self {
        let classifier =
            DeepLabHeadConfig::new(ResNetBackbone::<B>::out_channels(), num_classes).init(device);
        Self {
            backbone,
            classifier,
        }
    }

    /// Logits at the input resolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let features = self.backbone.forward(input).layer4;
        upsample_to(self.classifier.forward(features), [height, width])
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }
}
