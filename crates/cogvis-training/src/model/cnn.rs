//! Convolutional classifier.
//!
//! Each convolution is unpadded and followed by a max-pool whose kernel and
//! stride are both `pool_kernel`. The pooled feature map is flattened and fed
//! to the same linear stack as [`Mlp`](super::Mlp).

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use cogvis_core::Error;

use super::mlp::{forward_linear_stack, linear_stack};
use super::ImageClassifier;

/// Configuration for [`Cnn`]
#[derive(Config, Debug)]
pub struct CnnConfig {
    /// Channels, from the input channels through each convolution's output
    pub conv_dims: Vec<usize>,
    /// Widths of the linear stack, starting at the flattened feature size
    pub linear_dims: Vec<usize>,
    #[config(default = "5")]
    pub conv_kernel: usize,
    #[config(default = "2")]
    pub pool_kernel: usize,
}

impl CnnConfig {
    /// Size of the flattened feature map for an input of `height x width`
    pub fn flattened_features(&self, height: usize, width: usize) -> Option<usize> {
        if self.conv_kernel == 0 || self.pool_kernel == 0 {
            return None;
        }

        let (mut h, mut w) = (height, width);
        for _ in 1..self.conv_dims.len() {
            h = h.checked_sub(self.conv_kernel - 1)? / self.pool_kernel;
            w = w.checked_sub(self.conv_kernel - 1)? / self.pool_kernel;
            if h == 0 || w == 0 {
                return None;
            }
        }
        self.conv_dims.last().map(|c| c * h * w)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> cogvis_core::Result<Cnn<B>> {
        if self.conv_dims.len() < 2 {
            return Err(Error::Config(format!(
                "conv_dims needs the input channels and at least one convolution, got {:?}",
                self.conv_dims
            )));
        }
        if self.conv_kernel == 0 || self.pool_kernel == 0 {
            return Err(Error::Config(
                "conv_kernel and pool_kernel must be positive".to_string(),
            ));
        }

        let convs = self
            .conv_dims
            .windows(2)
            .map(|pair| {
                Conv2dConfig::new([pair[0], pair[1]], [self.conv_kernel, self.conv_kernel])
                    .init(device)
            })
            .collect();

        let pool = MaxPool2dConfig::new([self.pool_kernel, self.pool_kernel])
            .with_strides([self.pool_kernel, self.pool_kernel])
            .init();

        Ok(Cnn {
            convs,
            pool,
            linears: linear_stack(&self.linear_dims, device)?,
            activation: Relu::new(),
        })
    }
}

/// Convolution and pooling stages followed by a linear stack
#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    pub linears: Vec<Linear<B>>,
    activation: Relu,
}

impl<B: Backend> Cnn<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for conv in &self.convs {
            x = self.pool.forward(conv.forward(x));
        }

        let x: Tensor<B, 2> = x.flatten(1, 3);
        forward_linear_stack(&self.linears, &self.activation, x)
    }
}

impl<B: Backend> ImageClassifier<B> for Cnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        Cnn::forward(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_flattened_features() {
        // 64 -> conv5 -> 60 -> pool2 -> 30 -> conv5 -> 26 -> pool2 -> 13
        let config = CnnConfig::new(vec![3, 6, 16], vec![0, 2]);
        assert_eq!(config.flattened_features(64, 64), Some(16 * 13 * 13));
        // the 224-pixel layout: 16 * 53 * 53
        assert_eq!(config.flattened_features(224, 224), Some(16 * 53 * 53));
        assert_eq!(config.flattened_features(4, 4), None);
    }

    #[test]
    fn test_cnn_output_shape() {
        let device = Default::default();
        let config = CnnConfig::new(vec![3, 4, 8], vec![8 * 4 * 4, 12, 3])
            .with_conv_kernel(3)
            .with_pool_kernel(2);
        assert_eq!(config.flattened_features(22, 22), Some(8 * 4 * 4));

        let model = config.init::<TestBackend>(&device).unwrap();
        let output = model.forward(Tensor::ones([2, 3, 22, 22], &device));
        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_config_file_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cnn.json");

        let config = CnnConfig::new(vec![3, 6, 16], vec![16 * 13 * 13, 2]).with_pool_kernel(3);
        config.save(&path).unwrap();

        let loaded = CnnConfig::load(&path).unwrap();
        assert_eq!(loaded.conv_dims, config.conv_dims);
        assert_eq!(loaded.linear_dims, config.linear_dims);
        assert_eq!(loaded.conv_kernel, 5);
        assert_eq!(loaded.pool_kernel, 3);
    }

    #[test]
    fn test_cnn_rejects_missing_convolutions() {
        let device = Default::default();
        let config = CnnConfig::new(vec![3], vec![12, 2]);
        assert!(config.init::<TestBackend>(&device).is_err());
    }
}
