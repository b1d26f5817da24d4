//! Configuration structures for cogvis training experiments.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::DeviceKind;
use crate::error::{Error, Result};

/// Top-level configuration of one training experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset locations and preprocessing sizes
    pub data: DataConfig,
    /// Model selection and hyperparameters
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Where results are written
    pub output: OutputConfig,
}

impl ExperimentConfig {
    /// Checks the values that cannot be expressed through types alone
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.model.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the training split, laid out as `<root>/<class>/<image>`
    pub train_dir: PathBuf,
    /// Root of the validation split
    pub val_dir: PathBuf,
    /// Shorter-edge resize applied before cropping
    pub resize: u32,
    /// Square center crop size
    pub crop: u32,
    /// Batch size of the un-normalized pass used to estimate channel statistics
    pub stats_batch_size: usize,
    /// Fixed normalization; estimated from the training set when absent
    pub normalize: Option<NormalizeConfig>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data/train"),
            val_dir: PathBuf::from("data/val"),
            resize: 70,
            crop: 64,
            stats_batch_size: 1000,
            normalize: None,
        }
    }
}

impl DataConfig {
    fn validate(&self) -> Result<()> {
        if self.crop == 0 || self.resize == 0 {
            return Err(Error::Config("resize and crop must be positive".to_string()));
        }
        if self.crop > self.resize {
            return Err(Error::Config(format!(
                "crop ({}) must not exceed resize ({})",
                self.crop, self.resize
            )));
        }
        if self.stats_batch_size == 0 {
            return Err(Error::Config("stats_batch_size must be positive".to_string()));
        }
        if let Some(normalize) = &self.normalize {
            if normalize.mean.len() != normalize.std.len() {
                return Err(Error::Config(
                    "normalize.mean and normalize.std must have the same length".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Explicit per-channel normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizeConfig {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Which kind of classifier to build
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// A zoo backbone adapted to the label set
    Pretrained,
    /// Fully-connected network
    Mlp,
    /// Convolutional network
    Cnn,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Pretrained => write!(f, "pretrained"),
            ModelKind::Mlp => write!(f, "mlp"),
            ModelKind::Cnn => write!(f, "cnn"),
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Zoo architecture name, e.g. `resnet18`
    pub architecture: String,
    /// Number of output classes
    pub num_classes: usize,
    /// Whether to load ImageNet weights from `weights_dir`
    pub pretrained: bool,
    /// Directory holding `<architecture>.mpk` records
    pub weights_dir: PathBuf,
    /// Freeze every backbone parameter before swapping the head
    pub freeze_backbone: bool,
    /// Hidden widths of the MLP
    pub hidden_dims: Vec<usize>,
    /// Output channels of each CNN convolution
    pub conv_channels: Vec<usize>,
    pub conv_kernel: usize,
    pub pool_kernel: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Pretrained,
            architecture: "resnet18".to_string(),
            num_classes: 5,
            pretrained: true,
            weights_dir: PathBuf::from("weights"),
            freeze_backbone: true,
            hidden_dims: vec![512, 128],
            conv_channels: vec![16, 32],
            conv_kernel: 3,
            pool_kernel: 2,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(Error::Config("num_classes must be positive".to_string()));
        }
        match self.kind {
            ModelKind::Pretrained if self.architecture.trim().is_empty() => Err(Error::Config(
                "architecture is required for pretrained models".to_string(),
            )),
            ModelKind::Cnn if self.conv_channels.is_empty() => Err(Error::Config(
                "conv_channels must name at least one layer".to_string(),
            )),
            ModelKind::Cnn if self.conv_kernel == 0 || self.pool_kernel == 0 => Err(
                Error::Config("conv_kernel and pool_kernel must be positive".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Optimizer selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// SGD with momentum
    Sgd { momentum: f64, weight_decay: f64 },
    /// Adam optimizer
    Adam { weight_decay: f64 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Sgd {
            momentum: 0.9,
            weight_decay: 0.0,
        }
    }
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Sgd { .. } => write!(f, "sgd"),
            OptimizerKind::Adam { .. } => write!(f, "adam"),
        }
    }
}

/// Learning rate schedule, stepped once per epoch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Constant,
    /// Multiply by `gamma` every `step_size` epochs
    Step { step_size: usize, gamma: f64 },
    /// Multiply by `gamma` every epoch
    Exponential { gamma: f64 },
    /// Cosine decay to `eta_min` over `t_max` epochs
    CosineAnnealing { t_max: usize, eta_min: f64 },
}

impl Default for ScheduleKind {
    fn default() -> Self {
        ScheduleKind::Step {
            step_size: 7,
            gamma: 0.1,
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Number of training epochs
    pub num_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub schedule: ScheduleKind,
    /// Label smoothing factor for the cross-entropy criterion
    pub label_smoothing: Option<f32>,
    /// Device selector, `accelerator` or `host`
    pub device: String,
    /// Shuffle seed of the data loaders
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_epochs: 25,
            batch_size: 4,
            learning_rate: 0.001,
            optimizer: OptimizerKind::default(),
            schedule: ScheduleKind::default(),
            label_smoothing: None,
            device: "accelerator".to_string(),
            seed: 42,
        }
    }
}

impl TrainingParams {
    fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            return Err(Error::Config("num_epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::Config("learning_rate must be positive".to_string()));
        }
        if let Some(smoothing) = self.label_smoothing {
            if !(0.0..1.0).contains(&smoothing) {
                return Err(Error::Config(
                    "label_smoothing must be in [0, 1)".to_string(),
                ));
            }
        }
        if let ScheduleKind::Step { step_size: 0, .. } = self.schedule {
            return Err(Error::Config("step_size must be positive".to_string()));
        }
        DeviceKind::from_str(&self.device)?;
        Ok(())
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for the model record and the report
    pub output_dir: PathBuf,
    /// File stem of the saved model
    pub model_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            model_name: "best_model".to_string(),
        }
    }
}
