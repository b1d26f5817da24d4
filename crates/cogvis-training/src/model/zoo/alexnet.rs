//! AlexNet (the single-tower variant).

use burn::{
    module::Module,
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    tensor::{backend::Backend, Tensor},
};

use super::{conv2d, max_pool, ConvUnit, DenseHead, FeatureLayer};

#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    pub features: Vec<FeatureLayer<B>>,
    avgpool: AdaptiveAvgPool2d,
    pub classifier: DenseHead<B>,
}

impl<B: Backend> AlexNet<B> {
    pub fn new(device: &B::Device) -> Self {
        let conv = |channels: [usize; 2], kernel, stride, padding| {
            FeatureLayer::Conv(ConvUnit::new(
                conv2d(channels, kernel, stride, padding, true, device),
                None,
                device,
            ))
        };

        let features = vec![
            conv([3, 64], 11, 4, 2),
            FeatureLayer::Pool(max_pool(3, 2, 0)),
            conv([64, 192], 5, 1, 2),
            FeatureLayer::Pool(max_pool(3, 2, 0)),
            conv([192, 384], 3, 1, 1),
            conv([384, 256], 3, 1, 1),
            conv([256, 256], 3, 1, 1),
            FeatureLayer::Pool(max_pool(3, 2, 0)),
        ];

        Self {
            features,
            avgpool: AdaptiveAvgPool2dConfig::new([6, 6]).init(),
            classifier: DenseHead::new(256 * 6 * 6, true, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.features {
            x = layer.forward(x);
        }

        let x: Tensor<B, 2> = self.avgpool.forward(x).flatten(1, 3);
        self.classifier.forward(x)
    }

    /// Replaces `classifier.6`
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.classifier = self.classifier.replace_last(num_classes, device);
        self
    }
}
