//! Image classifiers.
//!
//! Implements:
//! - `Mlp` and `Cnn`, small networks trained from scratch
//! - a zoo of ImageNet backbones (ResNet, AlexNet, VGG, SqueezeNet, DenseNet)
//! - `ModelAdapter`, which swaps a backbone's head for a new label set

pub mod adapter;
pub mod cnn;
pub mod mlp;
pub mod zoo;

pub use adapter::{adapt, AdaptedModel, Architecture, ArchitectureFamily, ModelAdapter};
pub use cnn::{Cnn, CnnConfig};
pub use mlp::{Mlp, MlpConfig};

use burn::module::Module;
use burn::tensor::activation::softmax;
use burn::tensor::{backend::Backend, Tensor};

/// Maps an image batch `[N, C, H, W]` to class scores `[N, num_classes]`
pub trait ImageClassifier<B: Backend> {
    /// Unnormalized class scores (logits)
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Class probabilities
    fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// Any classifier the workspace can build, as a single module type
#[derive(Module, Debug)]
pub enum ClassifierModel<B: Backend> {
    Mlp(Mlp<B>),
    Cnn(Cnn<B>),
    Adapted(AdaptedModel<B>),
}

impl<B: Backend> ImageClassifier<B> for ClassifierModel<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            ClassifierModel::Mlp(model) => model.forward(images),
            ClassifierModel::Cnn(model) => model.forward(images),
            ClassifierModel::Adapted(model) => model.forward(images),
        }
    }
}

impl<B: Backend> From<Mlp<B>> for ClassifierModel<B> {
    fn from(model: Mlp<B>) -> Self {
        ClassifierModel::Mlp(model)
    }
}

impl<B: Backend> From<Cnn<B>> for ClassifierModel<B> {
    fn from(model: Cnn<B>) -> Self {
        ClassifierModel::Cnn(model)
    }
}

impl<B: Backend> From<AdaptedModel<B>> for ClassifierModel<B> {
    fn from(model: AdaptedModel<B>) -> Self {
        ClassifierModel::Adapted(model)
    }
}
