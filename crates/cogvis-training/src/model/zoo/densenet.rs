//! DenseNet-121/161/169/201.

use burn::{
    module::Module,
    nn::{
        conv::Conv2d,
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
        },
        BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{conv2d, max_pool, IMAGENET_CLASSES};

/// Channel multiplier of the 1x1 bottleneck inside each dense layer
const BN_SIZE: usize = 4;

/// Growth rate, stem width and per-block layer counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseNetLayout {
    pub growth_rate: usize,
    pub init_features: usize,
    pub blocks: [usize; 4],
}

impl DenseNetLayout {
    pub const D121: Self = Self::new(32, 64, [6, 12, 24, 16]);
    pub const D161: Self = Self::new(48, 96, [6, 12, 36, 24]);
    pub const D169: Self = Self::new(32, 64, [6, 12, 32, 32]);
    pub const D201: Self = Self::new(32, 64, [6, 12, 48, 32]);

    const fn new(growth_rate: usize, init_features: usize, blocks: [usize; 4]) -> Self {
        Self {
            growth_rate,
            init_features,
            blocks,
        }
    }

    /// Channels entering the classifier
    pub fn num_features(&self) -> usize {
        let mut features = self.init_features;
        for (i, layers) in self.blocks.iter().enumerate() {
            features += layers * self.growth_rate;
            if i + 1 < self.blocks.len() {
                features /= 2;
            }
        }
        features
    }
}

/// BN-ReLU-Conv1x1-BN-ReLU-Conv3x3, output concatenated to its input
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    pub norm1: BatchNorm<B>,
    pub conv1: Conv2d<B>,
    pub norm2: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> DenseLayer<B> {
    fn new(in_channels: usize, growth_rate: usize, device: &B::Device) -> Self {
        let inner = BN_SIZE * growth_rate;
        Self {
            norm1: BatchNormConfig::new(in_channels).init(device),
            conv1: conv2d([in_channels, inner], 1, 1, 0, false, device),
            norm2: BatchNormConfig::new(inner).init(device),
            conv2: conv2d([inner, growth_rate], 3, 1, 1, false, device),
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(self.relu.forward(self.norm1.forward(x.clone())));
        let out = self.conv2.forward(self.relu.forward(self.norm2.forward(out)));
        Tensor::cat(vec![x, out], 1)
    }
}

/// BN-ReLU-Conv1x1 halving the channels, then 2x2 average pooling
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    pub norm: BatchNorm<B>,
    pub conv: Conv2d<B>,
    pool: AvgPool2d,
    relu: Relu,
}

impl<B: Backend> Transition<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(in_channels).init(device),
            conv: conv2d([in_channels, out_channels], 1, 1, 0, false, device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(self.relu.forward(self.norm.forward(x)));
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub layers: Vec<DenseLayer<B>>,
    pub transition: Option<Transition<B>>,
}

impl<B: Backend> DenseBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for layer in &self.layers {
            x = layer.forward(x);
        }
        match &self.transition {
            Some(transition) => transition.forward(x),
            None => x,
        }
    }
}

#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    pub conv0: Conv2d<B>,
    pub norm0: BatchNorm<B>,
    pool0: MaxPool2d,
    pub blocks: Vec<DenseBlock<B>>,
    pub norm5: BatchNorm<B>,
    avgpool: AdaptiveAvgPool2d,
    /// Classification head
    pub classifier: Linear<B>,
    relu: Relu,
}

impl<B: Backend> DenseNet<B> {
    pub fn new(layout: DenseNetLayout, device: &B::Device) -> Self {
        let mut channels = layout.init_features;
        let mut blocks = Vec::with_capacity(layout.blocks.len());

        for (i, &num_layers) in layout.blocks.iter().enumerate() {
            let layers = (0..num_layers)
                .map(|j| DenseLayer::new(channels + j * layout.growth_rate, layout.growth_rate, device))
                .collect();
            channels += num_layers * layout.growth_rate;

            let transition = (i + 1 < layout.blocks.len()).then(|| {
                let block = Transition::new(channels, channels / 2, device);
                channels /= 2;
                block
            });
            blocks.push(DenseBlock { layers, transition });
        }

        Self {
            conv0: conv2d([3, layout.init_features], 7, 2, 3, false, device),
            norm0: BatchNormConfig::new(layout.init_features).init(device),
            pool0: max_pool(3, 2, 1),
            blocks,
            norm5: BatchNormConfig::new(channels).init(device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(channels, IMAGENET_CLASSES).init(device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.norm0.forward(self.conv0.forward(input)));
        let mut x = self.pool0.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.relu.forward(self.norm5.forward(x));
        let x: Tensor<B, 2> = self.avgpool.forward(x).flatten(1, 3);
        self.classifier.forward(x)
    }

    /// Replaces `classifier` with a fresh `Linear(in_features -> num_classes)`
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        let in_features = self.classifier.weight.dims()[0];
        self.classifier = LinearConfig::new(in_features, num_classes).init(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_num_features_matches_reference() {
        assert_eq!(DenseNetLayout::D121.num_features(), 1024);
        assert_eq!(DenseNetLayout::D161.num_features(), 2208);
        assert_eq!(DenseNetLayout::D169.num_features(), 1664);
        assert_eq!(DenseNetLayout::D201.num_features(), 1920);
    }

    #[test]
    fn test_densenet121_head_swap() {
        let device = Default::default();
        let model = DenseNet::<TestBackend>::new(DenseNetLayout::D121, &device);
        assert_eq!(model.classifier.weight.dims(), [1024, IMAGENET_CLASSES]);
        assert!(model.blocks[3].transition.is_none());

        let model = model.replace_head(3, &device);
        let output = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(output.dims(), [1, 3]);
    }
}
