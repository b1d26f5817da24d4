//! Labelled image-folder datasets and their Burn integration.
//!
//! The expected layout is `<root>/<class_label>/<image_file>`. Labels are the
//! sorted class directory names mapped to `0..k`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use cogvis_core::{Error, ImageSample, Result};
use image::DynamicImage;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::transforms::TransformPipeline;

/// File extensions recognized as images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Reads the image header so unreadable files fail the scan instead of a pass
fn check_readable(path: &Path) -> Result<()> {
    image::image_dimensions(path)
        .map(|_| ())
        .map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))
}

/// Index of the labelled images found under a root directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scans `root` for class directories and the images inside them.
    ///
    /// Fails with [`Error::DirectoryNotFound`] when `root` is not a directory,
    /// with [`Error::EmptyDataset`] when no image was found and with
    /// [`Error::Image`] when a file cannot be read as an image.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Scanning image folder {:?}", root);

        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(root));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let before = samples.len();

            for entry in WalkDir::new(root.join(class_name))
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && has_image_extension(entry.path()) {
                    check_readable(entry.path())?;
                    samples.push(ImageSample::new(entry.into_path(), label, class_name.as_str()));
                }
            }

            debug!("Class {} '{}': {} images", label, class_name, samples.len() - before);
        }

        if samples.is_empty() {
            return Err(Error::EmptyDataset(root));
        }

        info!("Found {} images in {} classes", samples.len(), classes.len());

        Ok(Self {
            root,
            classes,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names, indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of images per label
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

/// A single preprocessed sample ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Flattened CHW floats
    pub image: Vec<f32>,
    /// `[C, H, W]`
    pub shape: [usize; 3],
    pub label: usize,
}

/// Image folder whose samples are decoded and transformed on access
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    folder: Arc<ImageFolder>,
    pipeline: Arc<TransformPipeline>,
}

impl ImageFolderDataset {
    pub fn new(folder: ImageFolder, pipeline: TransformPipeline) -> Self {
        Self {
            folder: Arc::new(folder),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    /// Decodes one sample as RGB and runs it through the pipeline
    pub fn load(&self, sample: &ImageSample) -> Result<ImageItem> {
        let image = image::open(&sample.path)?;
        let image = DynamicImage::ImageRgb8(image.into_rgb8());
        let tensor = self.pipeline.apply(image, &mut rand::thread_rng())?;

        Ok(ImageItem {
            image: tensor.data,
            shape: tensor.shape,
            label: sample.label,
        })
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.folder.samples.get(index)?;

        // Burn's loader ends the pass at the first `None`; the training loop
        // then fails on the sample count
        match self.load(sample) {
            Ok(item) => Some(item),
            Err(err) => {
                error!("Failed to load {:?}: {}", sample.path, err);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.folder.len()
    }
}

/// A batch of images and their labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// `[N, C, H, W]`
    pub images: Tensor<B, 4>,
    /// `[N]`
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            images: self.images.to_device(device),
            targets: self.targets.to_device(device),
        }
    }
}

/// Stacks image items into an [`ImageBatch`]
#[derive(Clone, Debug, Default)]
pub struct ImageBatcher;

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = items.first().map(|item| item.shape).unwrap_or([0, 0, 0]);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}
