//! Loss functions for the training loop.

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, Int, Tensor},
};
use cogvis_core::{Error, Result};

/// Maps class scores and integer targets to a scalar batch loss.
///
/// The loop calls it on both the autodiff backend (training) and the inner
/// backend (validation), so implementations are usually generic over `B`.
pub trait Criterion<B: Backend> {
    /// Mean loss over the batch, shape `[1]`
    fn loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

/// Cross-entropy over logits, with optional class weights and label smoothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossEntropy {
    weights: Option<Vec<f32>>,
    smoothing: Option<f32>,
}

impl CrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-class weights, all strictly positive
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.is_empty() || weights.iter().any(|w| w.is_nan() || *w <= 0.0) {
            return Err(Error::Config(
                "class weights must be non-empty and positive".to_string(),
            ));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Label smoothing factor in `[0, 1]`
    pub fn with_smoothing(mut self, smoothing: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(Error::Config(format!(
                "label smoothing must be in [0, 1], got {smoothing}"
            )));
        }
        self.smoothing = Some(smoothing);
        Ok(self)
    }

    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    pub fn smoothing(&self) -> Option<f32> {
        self.smoothing
    }
}

impl<B: Backend> Criterion<B> for CrossEntropy {
    fn loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        // Built on the logits' device so the criterion follows the model
        CrossEntropyLossConfig::new()
            .with_weights(self.weights.clone())
            .with_smoothing(self.smoothing)
            .init(&logits.device())
            .forward(logits, targets)
    }
}
