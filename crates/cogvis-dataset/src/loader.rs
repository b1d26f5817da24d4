//! Batched, shuffled, multi-worker loaders over image folders.

use std::path::Path;
use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::prelude::*;
use cogvis_core::{Error, Result};
use tracing::info;

use crate::dataset::{ImageBatch, ImageBatcher, ImageFolder, ImageFolderDataset};
use crate::transforms::TransformPipeline;

/// Loader yielding [`ImageBatch`]es on backend `B`
pub type ImageDataLoader<B> = Arc<dyn DataLoader<B, ImageBatch<B>>>;

/// `max(1, cores - 1)`, leaving one core to the training loop
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Builder for image-folder data loaders
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    batch_size: usize,
    pipeline: TransformPipeline,
    num_workers: usize,
    shuffle: bool,
    seed: u64,
}

impl DatasetLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            pipeline: TransformPipeline::identity(),
            num_workers: default_num_workers(),
            shuffle: true,
            seed: 42,
        }
    }

    pub fn with_pipeline(mut self, pipeline: TransformPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Seed of the per-epoch shuffle
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Keeps the directory order instead of shuffling
    pub fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Scans `directory` and returns the number of samples with a loader over them
    pub fn load<B: Backend>(
        &self,
        directory: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<(usize, ImageDataLoader<B>)> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }

        let folder = ImageFolder::new(directory)?;
        let size = folder.len();
        info!(
            "Loading {} images in batches of {} with {} workers [{}]",
            size, self.batch_size, self.num_workers, self.pipeline
        );

        let dataset = ImageFolderDataset::new(folder, self.pipeline.clone());
        let mut builder = DataLoaderBuilder::new(ImageBatcher)
            .batch_size(self.batch_size)
            .num_workers(self.num_workers)
            .set_device(device.clone());
        if self.shuffle {
            builder = builder.shuffle(self.seed);
        }

        Ok((size, builder.build(dataset)))
    }
}

/// Shorthand for a shuffled loader with the default worker count
pub fn load<B: Backend>(
    directory: impl AsRef<Path>,
    batch_size: usize,
    pipeline: Option<TransformPipeline>,
    device: &B::Device,
) -> Result<(usize, ImageDataLoader<B>)> {
    let mut loader = DatasetLoader::new(batch_size);
    if let Some(pipeline) = pipeline {
        loader = loader.with_pipeline(pipeline);
    }
    loader.load::<B>(directory, device)
}
