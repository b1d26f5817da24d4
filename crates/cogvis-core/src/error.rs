//! Error types for the cogvis training pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Phase;

/// Main error type for the cogvis crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Architecture name does not belong to a supported family
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// Transform name is not in the catalog
    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    /// Transform arguments have the wrong arity or type
    #[error("Invalid arguments for transform '{transform}': {reason}")]
    InvalidTransformArgs { transform: String, reason: String },

    /// Transform cannot consume the output of the previous step
    #[error("Transform '{transform}' expects {expected} input but receives {found}")]
    IncompatibleTransform {
        transform: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Dataset root does not exist or is not a directory
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Dataset root contains no labelled images
    #[error("No labelled images found in {0}")]
    EmptyDataset(PathBuf),

    /// Device selector is not recognized
    #[error("Unsupported device '{0}', expected one of: accelerator, host")]
    UnsupportedDevice(String),

    /// A pass was asked to average over zero samples
    #[error("Cannot compute {0} statistics over a pass of size zero")]
    EmptyPass(Phase),

    /// A loader produced a different number of samples than its split declares
    #[error("{phase} pass saw {seen} samples but the split declares {declared}")]
    IncompletePass {
        phase: Phase,
        seen: usize,
        declared: usize,
    },

    /// Pretrained weights could not be loaded
    #[error("Pretrained weights error: {0}")]
    PretrainedWeights(String),

    /// Model record could not be saved or loaded
    #[error("Record error: {0}")]
    Record(String),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl Error {
    /// Shorthand for [`Error::InvalidTransformArgs`].
    pub fn invalid_args(transform: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidTransformArgs {
            transform: transform.into(),
            reason: reason.into(),
        }
    }
}

/// Specialized Result type for cogvis operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedArchitecture("inception_v3".to_string());
        assert_eq!(err.to_string(), "Unsupported architecture: inception_v3");

        let err = Error::invalid_args("Resize", "expected 1 or 2 arguments, got 0");
        assert_eq!(
            err.to_string(),
            "Invalid arguments for transform 'Resize': expected 1 or 2 arguments, got 0"
        );
    }

    #[test]
    fn test_empty_pass_names_phase() {
        let err = Error::EmptyPass(Phase::Valid);
        assert!(err.to_string().contains("validation"));
    }

    #[test]
    fn test_incomplete_pass_reports_counts() {
        let err = Error::IncompletePass {
            phase: Phase::Train,
            seen: 0,
            declared: 7,
        };
        let message = err.to_string();
        assert!(message.contains("saw 0 samples"));
        assert!(message.contains("declares 7"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_directory_not_found_shows_path() {
        let err = Error::DirectoryNotFound(PathBuf::from("orchard_data/train"));
        assert!(err.to_string().contains("orchard_data/train"));
    }
}
