//! Fully-connected classifier.

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};
use cogvis_core::Error;

use super::ImageClassifier;

/// Configuration for [`Mlp`]
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Layer widths, from the flattened input size to the number of classes
    pub dims: Vec<usize>,
}

impl MlpConfig {
    /// Builds one `Linear` per consecutive pair of `dims`
    pub fn init<B: Backend>(&self, device: &B::Device) -> cogvis_core::Result<Mlp<B>> {
        Ok(Mlp {
            linears: linear_stack(&self.dims, device)?,
            activation: Relu::new(),
        })
    }
}

pub(crate) fn linear_stack<B: Backend>(
    dims: &[usize],
    device: &B::Device,
) -> cogvis_core::Result<Vec<Linear<B>>> {
    if dims.len() < 2 {
        return Err(Error::Config(format!(
            "a linear stack needs at least an input and an output width, got {dims:?}"
        )));
    }
    if dims.contains(&0) {
        return Err(Error::Config(format!("layer widths must be positive, got {dims:?}")));
    }

    Ok(dims
        .windows(2)
        .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
        .collect())
}

/// Runs `x` through the stack with ReLU between layers but not after the last one
pub(crate) fn forward_linear_stack<B: Backend>(
    linears: &[Linear<B>],
    activation: &Relu,
    mut x: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let last = linears.len().saturating_sub(1);
    for (i, linear) in linears.iter().enumerate() {
        x = linear.forward(x);
        if i < last {
            x = activation.forward(x);
        }
    }
    x
}

/// Multi-layer perceptron over flattened images
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub linears: Vec<Linear<B>>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    /// Flattens `[N, C, H, W]` to `[N, C*H*W]` and returns logits
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = input.flatten(1, 3);
        forward_linear_stack(&self.linears, &self.activation, x)
    }

    pub fn num_classes(&self) -> usize {
        self.linears
            .last()
            .map(|linear| linear.weight.dims()[1])
            .unwrap_or(0)
    }
}

impl<B: Backend> ImageClassifier<B> for Mlp<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        Mlp::forward(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_mlp_output_shape() {
        let device = Default::default();
        let model = MlpConfig::new(vec![3 * 8 * 8, 16, 4, 2])
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(model.linears.len(), 3);
        assert_eq!(model.num_classes(), 2);

        let output = model.forward(Tensor::zeros([5, 3, 8, 8], &device));
        assert_eq!(output.dims(), [5, 2]);
    }

    #[test]
    fn test_mlp_rejects_short_dims() {
        let device = Default::default();
        assert!(MlpConfig::new(vec![10]).init::<TestBackend>(&device).is_err());
        assert!(MlpConfig::new(vec![10, 0, 2]).init::<TestBackend>(&device).is_err());
    }
}
