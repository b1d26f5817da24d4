//! ImageNet backbones in their reference layouts.
//!
//! Every constructor builds the 1000-class ImageNet variant; heads are swapped
//! afterwards by [`ModelAdapter`](super::ModelAdapter).

pub mod alexnet;
pub mod densenet;
pub mod resnet;
pub mod squeezenet;
pub mod vgg;

pub use alexnet::AlexNet;
pub use densenet::DenseNet;
pub use resnet::ResNet;
pub use squeezenet::SqueezeNet;
pub use vgg::Vgg;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Number of ImageNet classes
pub const IMAGENET_CLASSES: usize = 1000;

pub(crate) fn conv2d<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: usize,
    bias: bool,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(bias)
        .init(device)
}

pub(crate) fn max_pool(kernel: usize, stride: usize, padding: usize) -> MaxPool2d {
    MaxPool2dConfig::new([kernel, kernel])
        .with_strides([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .init()
}

/// A convolution with optional batch norm, followed by ReLU
#[derive(Module, Debug)]
pub struct ConvUnit<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: Option<BatchNorm<B>>,
    relu: Relu,
}

impl<B: Backend> ConvUnit<B> {
    pub fn new(conv: Conv2d<B>, out_channels: Option<usize>, device: &B::Device) -> Self {
        Self {
            conv,
            bn: out_channels.map(|c| BatchNormConfig::new(c).init(device)),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        self.relu.forward(x)
    }
}

/// One entry of a plain feature extractor
#[derive(Module, Debug)]
pub enum FeatureLayer<B: Backend> {
    Conv(ConvUnit<B>),
    Pool(MaxPool2d),
}

impl<B: Backend> FeatureLayer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            FeatureLayer::Conv(unit) => unit.forward(x),
            FeatureLayer::Pool(pool) => pool.forward(x),
        }
    }
}

/// The three-layer fully-connected head shared by AlexNet and VGG.
///
/// In the reference layout its last projection sits at `classifier.6`.
#[derive(Module, Debug)]
pub struct DenseHead<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    /// `classifier.6`
    pub fc3: Linear<B>,
    dropout: Dropout,
    relu: Relu,
    /// AlexNet applies dropout before each hidden projection, VGG after
    dropout_first: bool,
}

impl<B: Backend> DenseHead<B> {
    pub fn new(in_features: usize, dropout_first: bool, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, 4096).init(device),
            fc2: LinearConfig::new(4096, 4096).init(device),
            fc3: LinearConfig::new(4096, IMAGENET_CLASSES).init(device),
            dropout: DropoutConfig::new(0.5).init(),
            relu: Relu::new(),
            dropout_first,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for fc in [&self.fc1, &self.fc2] {
            if self.dropout_first {
                x = self.relu.forward(fc.forward(self.dropout.forward(x)));
            } else {
                x = self.dropout.forward(self.relu.forward(fc.forward(x)));
            }
        }
        self.fc3.forward(x)
    }

    /// Replaces `fc3` with a fresh projection to `num_classes`
    pub fn replace_last(mut self, num_classes: usize, device: &B::Device) -> Self {
        let in_features = self.fc3.weight.dims()[0];
        self.fc3 = LinearConfig::new(in_features, num_classes).init(device);
        self
    }
}
