//! SqueezeNet 1.0 and 1.1.
//!
//! The classifier is convolutional: dropout, a 1x1 convolution to the class
//! count (`classifier.1`), ReLU and global average pooling.

use burn::{
    module::Module,
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d},
        Dropout, DropoutConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{conv2d, max_pool, IMAGENET_CLASSES};

/// Squeeze (1x1) then expand (1x1 and 3x3, concatenated)
#[derive(Module, Debug)]
pub struct Fire<B: Backend> {
    pub squeeze: Conv2d<B>,
    pub expand1x1: Conv2d<B>,
    pub expand3x3: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> Fire<B> {
    fn new(
        in_channels: usize,
        squeeze: usize,
        expand1x1: usize,
        expand3x3: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            squeeze: conv2d([in_channels, squeeze], 1, 1, 0, true, device),
            expand1x1: conv2d([squeeze, expand1x1], 1, 1, 0, true, device),
            expand3x3: conv2d([squeeze, expand3x3], 3, 1, 1, true, device),
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.squeeze.forward(x));
        let a = self.relu.forward(self.expand1x1.forward(x.clone()));
        let b = self.relu.forward(self.expand3x3.forward(x));
        Tensor::cat(vec![a, b], 1)
    }
}

#[derive(Module, Debug)]
pub enum SqueezeLayer<B: Backend> {
    Fire(Fire<B>),
    Pool(MaxPool2d),
}

/// SqueezeNet revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqueezeNetVersion {
    V1_0,
    V1_1,
}

#[derive(Module, Debug)]
pub struct SqueezeNet<B: Backend> {
    pub stem: Conv2d<B>,
    pub features: Vec<SqueezeLayer<B>>,
    dropout: Dropout,
    /// `classifier.1`
    pub final_conv: Conv2d<B>,
    avgpool: AdaptiveAvgPool2d,
    relu: Relu,
}

impl<B: Backend> SqueezeNet<B> {
    pub fn new(version: SqueezeNetVersion, device: &B::Device) -> Self {
        let fire = |i, s, e1, e3| SqueezeLayer::Fire(Fire::new(i, s, e1, e3, device));
        let pool = || SqueezeLayer::Pool(max_pool(3, 2, 0));

        let (stem, features) = match version {
            SqueezeNetVersion::V1_0 => (
                conv2d([3, 96], 7, 2, 0, true, device),
                vec![
                    pool(),
                    fire(96, 16, 64, 64),
                    fire(128, 16, 64, 64),
                    fire(128, 32, 128, 128),
                    pool(),
                    fire(256, 32, 128, 128),
                    fire(256, 48, 192, 192),
                    fire(384, 48, 192, 192),
                    fire(384, 64, 256, 256),
                    pool(),
                    fire(512, 64, 256, 256),
                ],
            ),
            SqueezeNetVersion::V1_1 => (
                conv2d([3, 64], 3, 2, 0, true, device),
                vec![
                    pool(),
                    fire(64, 16, 64, 64),
                    fire(128, 16, 64, 64),
                    pool(),
                    fire(128, 32, 128, 128),
                    fire(256, 32, 128, 128),
                    pool(),
                    fire(256, 48, 192, 192),
                    fire(384, 48, 192, 192),
                    fire(384, 64, 256, 256),
                    fire(512, 64, 256, 256),
                ],
            ),
        };

        Self {
            stem,
            features,
            dropout: DropoutConfig::new(0.5).init(),
            final_conv: conv2d([512, IMAGENET_CLASSES], 1, 1, 0, true, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.relu.forward(self.stem.forward(input));
        for layer in &self.features {
            x = match layer {
                SqueezeLayer::Fire(fire) => fire.forward(x),
                SqueezeLayer::Pool(pool) => pool.forward(x),
            };
        }

        let x = self.final_conv.forward(self.dropout.forward(x));
        let x = self.avgpool.forward(self.relu.forward(x));
        x.flatten(1, 3)
    }

    /// Replaces `classifier.1` with a fresh `Conv2d(512 -> num_classes, 1x1)`
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        let in_channels = self.final_conv.weight.dims()[1];
        self.final_conv = conv2d([in_channels, num_classes], 1, 1, 0, true, device);
        self
    }
}
