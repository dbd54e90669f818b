//! Fully convolutional segmentation network.
//! Derived from torchvision.models.segmentation.fcn

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use resnet::ResNetBackbone;

use super::upsample_to;

/// Configuration for [`FcnHead`].
#[derive(Config, Debug)]
pub struct FcnHeadConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    #[config(default = "0.1")]
    pub dropout: f64,
}

impl FcnHeadConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> FcnHead<B> {
        let inter_channels = self.in_channels / 4;

        FcnHead {
            conv: Conv2dConfig::new([self.in_channels, inter_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(inter_channels).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            out: Conv2dConfig::new([inter_channels, self.num_classes], [1, 1]).init(device),
        }
    }
}

/// 3x3 conv, BN, ReLU, dropout, then a 1x1 conv to class logits.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, num_classes, height, width]`
#[derive(Module, Debug)]
pub struct FcnHead<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    dropout: Dropout,
    out: Conv2d<B>,
}

impl<B: Backend> FcnHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout.forward(x);
        self.out.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.out.weight.val().dims()[0]
    }
}

/// Dilated ResNet followed by an [`FcnHead`] on the last stage.
#[derive(Module, Debug)]
pub struct Fcn<B: Backend> {
    pub backbone: ResNetBackbone<B>,
    pub classifier: FcnHead<B>,
}

impl<B: Backend> Fcn<B> {
    pub fn new(backbone: ResNetBackbone<B>, num_classes: usize, device: &Device<B>) -> Self {
        let classifier =
            FcnHeadConfig::new(ResNetBackbone::<B>::out_channels(), num_classes).init(device);
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

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn head_reduces_channels_by_four() {
        let device = Default::default();
        let head = FcnHeadConfig::new(64, 21).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 64, 5, 7], &device);

        assert_eq!(head.conv.weight.val().dims(), [16, 64, 3, 3]);
        assert_eq!(head.forward(x).dims(), [1, 21, 5, 7]);
        assert_eq!(head.num_classes(), 21);
    }
}
