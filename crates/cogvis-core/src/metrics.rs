//! Per-pass and per-run metrics for supervised classification.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Phase;

/// Loss and accuracy of a single pass over a split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EpochStats {
    /// Mean per-sample loss
    pub loss: f64,
    /// Fraction of correctly classified samples
    pub accuracy: f64,
}

/// Running sums accumulated while iterating over the batches of one pass.
///
/// The loss reported by a criterion is a batch mean, so it is re-weighted by
/// the batch length before being summed.
#[derive(Debug, Clone, Default)]
pub struct PassAccumulator {
    running_loss: f64,
    running_corrects: usize,
    samples_seen: usize,
    batches: usize,
}

impl PassAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one batch worth of results
    pub fn record_batch(&mut self, mean_loss: f64, batch_len: usize, corrects: usize) {
        self.running_loss += mean_loss * batch_len as f64;
        self.running_corrects += corrects;
        self.samples_seen += batch_len;
        self.batches += 1;
    }

    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Divides the running sums by the declared pass size.
    ///
    /// Fails with [`Error::EmptyPass`] when `size` is zero.
    pub fn finish(&self, phase: Phase, size: usize) -> Result<EpochStats> {
        if size == 0 {
            return Err(Error::EmptyPass(phase));
        }

        Ok(EpochStats {
            loss: self.running_loss / size as f64,
            accuracy: self.running_corrects as f64 / size as f64,
        })
    }
}

/// Results of one epoch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochRecord {
    /// Zero-based epoch index
    pub epoch: usize,
    /// Learning rate used during the training pass
    pub learning_rate: f64,
    pub train: EpochStats,
    pub valid: EpochStats,
    /// Whether this epoch produced a new best validation accuracy
    pub improved: bool,
}

/// History of a complete training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochRecord>,
    /// Epoch whose parameters were restored, `None` if no epoch beat 0.0
    pub best_epoch: Option<usize>,
    pub best_accuracy: f64,
}

impl TrainingReport {
    /// Appends an epoch record
    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    /// Validation accuracy per epoch
    pub fn val_accuracies(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.valid.accuracy).collect()
    }

    /// Training loss per epoch
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.train.loss).collect()
    }

    /// Writes the report as pretty JSON
    pub fn save_json(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
