//! VGG-11/13/16/19, with or without batch normalization.

use burn::{
    module::Module,
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    tensor::{backend::Backend, Tensor},
};

use super::{conv2d, max_pool, ConvUnit, DenseHead, FeatureLayer};

/// `M` marks a max-pool, any other entry a 3x3 convolution with that many channels
const M: usize = 0;

const VGG11: &[usize] = &[64, M, 128, M, 256, 256, M, 512, 512, M, 512, 512, M];
const VGG13: &[usize] = &[64, 64, M, 128, 128, M, 256, 256, M, 512, 512, M, 512, 512, M];
const VGG16: &[usize] = &[
    64, 64, M, 128, 128, M, 256, 256, 256, M, 512, 512, 512, M, 512, 512, 512, M,
];
const VGG19: &[usize] = &[
    64, 64, M, 128, 128, M, 256, 256, 256, 256, M, 512, 512, 512, 512, M, 512, 512, 512, 512, M,
];

/// Depth of a VGG network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggDepth {
    D11,
    D13,
    D16,
    D19,
}

impl VggDepth {
    fn layout(self) -> &'static [usize] {
        match self {
            VggDepth::D11 => VGG11,
            VggDepth::D13 => VGG13,
            VggDepth::D16 => VGG16,
            VggDepth::D19 => VGG19,
        }
    }

    /// Number of convolution layers
    pub fn conv_layers(self) -> usize {
        self.layout().iter().filter(|c| **c != M).count()
    }
}

#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    pub features: Vec<FeatureLayer<B>>,
    avgpool: AdaptiveAvgPool2d,
    pub classifier: DenseHead<B>,
}

impl<B: Backend> Vgg<B> {
    pub fn new(depth: VggDepth, batch_norm: bool, device: &B::Device) -> Self {
        let mut in_channels = 3;
        let features = depth
            .layout()
            .iter()
            .map(|&channels| {
                if channels == M {
                    return FeatureLayer::Pool(max_pool(2, 2, 0));
                }
                let conv = conv2d([in_channels, channels], 3, 1, 1, true, device);
                in_channels = channels;
                FeatureLayer::Conv(ConvUnit::new(conv, batch_norm.then_some(channels), device))
            })
            .collect();

        Self {
            features,
            avgpool: AdaptiveAvgPool2dConfig::new([7, 7]).init(),
            classifier: DenseHead::new(512 * 7 * 7, false, device),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_layer_counts() {
        assert_eq!(VggDepth::D11.conv_layers(), 8);
        assert_eq!(VggDepth::D13.conv_layers(), 10);
        assert_eq!(VggDepth::D16.conv_layers(), 13);
        assert_eq!(VggDepth::D19.conv_layers(), 16);
    }

    #[test]
    fn test_every_layout_has_five_pools() {
        for depth in [VggDepth::D11, VggDepth::D13, VggDepth::D16, VggDepth::D19] {
            assert_eq!(depth.layout().iter().filter(|c| **c == M).count(), 5);
        }
    }
}
