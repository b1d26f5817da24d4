//! Image-folder dataset loading and preprocessing for cogvis.
//!
//! This crate turns a `<root>/<class>/<image>` directory into shuffled,
//! batched Burn tensors, applying a declarative transform pipeline to every
//! sample on the loader's worker threads.

pub mod augmentation;
pub mod dataset;
pub mod loader;
pub mod statistics;
pub mod transforms;

pub use dataset::{ImageBatch, ImageBatcher, ImageFolder, ImageFolderDataset, ImageItem};
pub use loader::{default_num_workers, load, DatasetLoader, ImageDataLoader};
pub use statistics::ChannelStatistics;
pub use transforms::{TensorSample, TransformArg, TransformPipeline, TransformSpec};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::*;
    pub use crate::loader::*;
    pub use crate::statistics::*;
    pub use crate::transforms::*;
}
