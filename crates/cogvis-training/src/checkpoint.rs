//! Saving and loading trained classifiers.
//!
//! A checkpoint is a full-precision MessagePack Burn record plus a small JSON
//! sidecar describing what produced it.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use chrono::Utc;
use cogvis_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Description of a saved model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    /// Architecture or model kind, e.g. `resnet18` or `mlp`
    pub model: String,
    pub num_classes: usize,
    /// Class names in label order
    pub classes: Vec<String>,
    /// Zero-based epoch whose parameters were saved, if any improved
    pub best_epoch: Option<usize>,
    pub best_accuracy: f64,
    /// Per-channel normalization applied to the inputs
    pub normalize: Option<(Vec<f64>, Vec<f64>)>,
    /// RFC 3339 creation time
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn new(model: impl Into<String>, classes: Vec<String>) -> Self {
        Self {
            model: model.into(),
            num_classes: classes.len(),
            classes,
            best_epoch: None,
            best_accuracy: 0.0,
            normalize: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_best(mut self, best_epoch: Option<usize>, best_accuracy: f64) -> Self {
        self.best_epoch = best_epoch;
        self.best_accuracy = best_accuracy;
        self
    }

    pub fn with_normalize(mut self, mean: Vec<f64>, std: Vec<f64>) -> Self {
        self.normalize = Some((mean, std));
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Recorder for checkpoints and pretrained weights; keeps `f32` parameters
/// exact instead of rounding them to half precision
pub type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Path of the record file written for `stem`
pub fn record_path(stem: &Path) -> PathBuf {
    stem.with_extension("mpk")
}

/// Path of the metadata sidecar written for `stem`
pub fn metadata_path(stem: &Path) -> PathBuf {
    stem.with_extension("json")
}

/// Writes `<stem>.mpk` and, when given, `<stem>.json`
pub fn save_model<B: Backend, M: Module<B>>(
    model: M,
    stem: &Path,
    metadata: Option<&CheckpointMetadata>,
) -> Result<PathBuf> {
    if let Some(parent) = stem.parent() {
        fs::create_dir_all(parent)?;
    }

    model
        .save_file(stem.to_path_buf(), &ModelRecorder::new())
        .map_err(|e| Error::Record(format!("failed to save {:?}: {:?}", stem, e)))?;

    if let Some(metadata) = metadata {
        metadata.save(&metadata_path(stem))?;
    }

    let path = record_path(stem);
    info!("Model saved to {:?}", path);
    Ok(path)
}

/// Loads `<stem>.mpk` into `model`, which must have the same structure
pub fn load_model<B: Backend, M: Module<B>>(model: M, stem: &Path, device: &B::Device) -> Result<M> {
    let path = record_path(stem);
    if !path.is_file() {
        return Err(Error::Record(format!("no model record at {:?}", path)));
    }

    let model = model
        .load_file(stem.to_path_buf(), &ModelRecorder::new(), device)
        .map_err(|e| Error::Record(format!("failed to load {:?}: {:?}", path, e)))?;
    info!("Model loaded from {:?}", path);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mlp, MlpConfig};
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::tensor::Tensor;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn mlp() -> Mlp<TestBackend> {
        MlpConfig::new(vec![4, 3, 2]).init(&Default::default()).unwrap()
    }

    #[test]
    fn test_save_and_load_model() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let stem = temp_dir.path().join("models").join("best_model");
        let device = Default::default();

        let saved = mlp();
        let expected = saved.linears[0].weight.val().into_data();
        let path = save_model(saved, &stem, None)?;
        assert_eq!(path, record_path(&stem));
        assert!(path.exists());
        assert!(!metadata_path(&stem).exists());

        let loaded = load_model(mlp(), &stem, &device)?;
        loaded.linears[0].weight.val().into_data().assert_eq(&expected, true);
        Ok(())
    }

    #[test]
    fn test_saved_weights_are_not_rounded() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let stem = temp_dir.path().join("precise");
        let device = Default::default();

        // 1 + 1e-6 has no half-precision representation
        let mut model = mlp();
        model.linears[0].weight = Param::from_tensor(Tensor::full([4, 3], 1.000_001, &device));
        let expected = model.linears[0].weight.val().into_data();
        save_model(model, &stem, None)?;

        let loaded = load_model(mlp(), &stem, &device)?;
        loaded.linears[0].weight.val().into_data().assert_eq(&expected, true);
        Ok(())
    }

    #[test]
    fn test_metadata_sidecar() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let stem = temp_dir.path().join("best_model");

        let metadata = CheckpointMetadata::new("mlp", vec!["ants".into(), "bees".into()])
            .with_best(Some(3), 0.875)
            .with_normalize(vec![0.5; 3], vec![0.25; 3]);
        save_model(mlp(), &stem, Some(&metadata))?;

        let loaded = CheckpointMetadata::load(&metadata_path(&stem))?;
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.num_classes, 2);
        Ok(())
    }

    #[test]
    fn test_load_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let result = load_model(mlp(), &temp_dir.path().join("absent"), &device);
        assert!(matches!(result, Err(Error::Record(_))));
    }
}
