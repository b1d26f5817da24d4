//! ResNet-18/34/50/101/152.
//!
//! Architecture:
//! - Stem: Conv 7x7 stride 2, BatchNorm, ReLU, MaxPool 3x3 stride 2
//! - 4 residual stages (basic blocks for 18/34, bottlenecks for 50+)
//! - Global average pooling
//! - `fc` classification layer

use burn::{
    module::Module,
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{conv2d, max_pool, IMAGENET_CLASSES};

/// 1x1 projection on the shortcut when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv2d([in_channels, out_channels], 1, stride, 0, false, device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with a residual connection
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    const EXPANSION: usize = 1;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != planes * Self::EXPANSION)
            .then(|| Downsample::new(in_channels, planes * Self::EXPANSION, stride, device));

        Self {
            conv1: conv2d([in_channels, planes], 3, stride, 1, false, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv2d([planes, planes], 3, 1, 1, false, device),
            bn2: BatchNormConfig::new(planes).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        self.relu.forward(out.add(identity))
    }
}

/// 1x1 reduce, 3x3, 1x1 expand (x4) with a residual connection
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    const EXPANSION: usize = 4;

    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * Self::EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv2d([in_channels, planes], 1, 1, 0, false, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv2d([planes, planes], 3, stride, 1, false, device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: conv2d([planes, out_channels], 1, 1, 0, false, device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.relu.forward(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));
        self.relu.forward(out.add(identity))
    }
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    Basic(BasicBlock<B>),
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            ResidualBlock::Basic(block) => block.forward(x),
            ResidualBlock::Bottleneck(block) => block.forward(x),
        }
    }
}

/// Residual network
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    pub layer1: Vec<ResidualBlock<B>>,
    pub layer2: Vec<ResidualBlock<B>>,
    pub layer3: Vec<ResidualBlock<B>>,
    pub layer4: Vec<ResidualBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    /// Classification head
    pub fc: Linear<B>,
    relu: Relu,
}

impl<B: Backend> ResNet<B> {
    /// Builds a ResNet with `blocks[i]` blocks in stage `i`
    pub fn new(blocks: [usize; 4], bottleneck: bool, device: &B::Device) -> Self {
        let expansion = if bottleneck {
            Bottleneck::<B>::EXPANSION
        } else {
            BasicBlock::<B>::EXPANSION
        };

        let mut in_channels = 64;
        let mut make_layer = |planes: usize, count: usize, stride: usize| {
            let mut layer = Vec::with_capacity(count);
            for i in 0..count {
                let stride = if i == 0 { stride } else { 1 };
                layer.push(if bottleneck {
                    ResidualBlock::Bottleneck(Bottleneck::new(in_channels, planes, stride, device))
                } else {
                    ResidualBlock::Basic(BasicBlock::new(in_channels, planes, stride, device))
                });
                in_channels = planes * expansion;
            }
            layer
        };

        let layer1 = make_layer(64, blocks[0], 1);
        let layer2 = make_layer(128, blocks[1], 2);
        let layer3 = make_layer(256, blocks[2], 2);
        let layer4 = make_layer(512, blocks[3], 2);

        Self {
            conv1: conv2d([3, 64], 7, 2, 3, false, device),
            bn1: BatchNormConfig::new(64).init(device),
            maxpool: max_pool(3, 2, 1),
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(512 * expansion, IMAGENET_CLASSES).init(device),
            relu: Relu::new(),
        }
    }

    pub fn resnet18(device: &B::Device) -> Self {
        Self::new([2, 2, 2, 2], false, device)
    }

    pub fn resnet34(device: &B::Device) -> Self {
        Self::new([3, 4, 6, 3], false, device)
    }

    pub fn resnet50(device: &B::Device) -> Self {
        Self::new([3, 4, 6, 3], true, device)
    }

    pub fn resnet101(device: &B::Device) -> Self {
        Self::new([3, 4, 23, 3], true, device)
    }

    pub fn resnet152(device: &B::Device) -> Self {
        Self::new([3, 8, 36, 3], true, device)
    }

    /// Forward pass
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let x = self.avgpool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch, channels]))
    }

    /// Replaces `fc` with a fresh `Linear(in_features -> num_classes)`
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        let in_features = self.fc.weight.dims()[0];
        self.fc = LinearConfig::new(in_features, num_classes).init(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_resnet18_layout() {
        let device = Default::default();
        let model = ResNet::<TestBackend>::resnet18(&device);

        assert_eq!(model.layer1.len(), 2);
        assert!(model.layer1.iter().all(|b| matches!(b, ResidualBlock::Basic(_))));
        assert_eq!(model.fc.weight.dims(), [512, IMAGENET_CLASSES]);

        let output = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
        assert_eq!(output.dims(), [1, IMAGENET_CLASSES]);
    }

    #[test]
    fn test_resnet50_uses_bottlenecks() {
        let device = Default::default();
        let model = ResNet::<TestBackend>::resnet50(&device);

        assert_eq!(model.layer3.len(), 6);
        assert!(matches!(model.layer1[0], ResidualBlock::Bottleneck(_)));
        assert_eq!(model.fc.weight.dims()[0], 2048);
    }

    #[test]
    fn test_replace_head() {
        let device = Default::default();
        let model = ResNet::<TestBackend>::resnet18(&device).replace_head(7, &device);

        assert_eq!(model.fc.weight.dims(), [512, 7]);
        let output = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(output.dims(), [2, 7]);
    }
}
