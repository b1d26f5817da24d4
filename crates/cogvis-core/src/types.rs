//! Core type definitions shared by the cogvis crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Represents an image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label (index into the sorted class directories)
    pub label: usize,
    /// Name of the class directory the image was found in
    pub class_name: String,
}

impl ImageSample {
    /// Creates a new image sample
    pub fn new(path: PathBuf, label: usize, class_name: impl Into<String>) -> Self {
        Self {
            path,
            label,
            class_name: class_name.into(),
        }
    }
}

/// A pass over one of the two data splits within an epoch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Gradient-tracked pass over the training split
    Train,
    /// Gradient-free pass over the validation split
    Valid,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Train => write!(f, "training"),
            Phase::Valid => write!(f, "validation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_sample_creation() {
        let sample = ImageSample::new(PathBuf::from("train/apple/0001.jpg"), 2, "apple");
        assert_eq!(sample.label, 2);
        assert_eq!(sample.class_name, "apple");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Train.to_string(), "training");
        assert_eq!(Phase::Valid.to_string(), "validation");
    }
}
