//! Models and the supervised training loop for cogvis.
//!
//! This crate provides:
//! - MLP and CNN classifiers, and a zoo of ImageNet backbones
//! - `ModelAdapter`, which fits a backbone head to a new label set
//! - Cross-entropy criterion, optimizer setup and epoch LR schedules
//! - The training loop that restores the best validation snapshot
//! - Model checkpointing

pub mod checkpoint;
pub mod criterion;
pub mod lr_schedule;
pub mod model;
pub mod optim;
pub mod trainer;

pub use checkpoint::{load_model, save_model, CheckpointMetadata};
pub use criterion::{Criterion, CrossEntropy};
pub use lr_schedule::LearningRateScheduler;
pub use model::{
    adapt, AdaptedModel, Architecture, ArchitectureFamily, ClassifierModel, Cnn, CnnConfig,
    ImageClassifier, Mlp, MlpConfig, ModelAdapter,
};
pub use optim::OptimizerSetup;
pub use trainer::{run, BestModelTracker, EpochData, TrainingListener, TrainingLoop};

/// Re-export commonly used types
pub mod prelude {
    pub use super::checkpoint::{load_model, save_model, CheckpointMetadata};
    pub use super::criterion::{Criterion, CrossEntropy};
    pub use super::lr_schedule::LearningRateScheduler;
    pub use super::model::{ClassifierModel, ImageClassifier, ModelAdapter};
    pub use super::optim::OptimizerSetup;
    pub use super::trainer::{EpochData, TrainingListener, TrainingLoop};
}
