//! Per-channel statistics for deriving normalization parameters.

use burn::prelude::*;
use cogvis_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::loader::ImageDataLoader;
use crate::transforms::{TransformArg, TransformSpec};

/// Floor applied to a measured standard deviation before it divides a channel
pub const MIN_STD: f64 = 1e-6;

/// Mean and unbiased standard deviation of each image channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ChannelStatistics {
    /// Computes the statistics of an `[N, C, H, W]` batch over `N`, `H` and `W`
    pub fn from_batch<B: Backend>(images: Tensor<B, 4>) -> Result<Self> {
        let [n, c, h, w] = images.dims();
        let count = n * h * w;
        if count < 2 {
            return Err(Error::Image(format!(
                "channel statistics need at least two values per channel, got {count}"
            )));
        }

        let flat = images.swap_dims(0, 1).reshape([c, count]);
        let mean = flat.clone().mean_dim(1);
        let std = flat.var(1).sqrt();

        Ok(Self {
            mean: to_vec(mean)?,
            std: to_vec(std)?,
        })
    }

    /// Statistics of the first batch produced by `loader`
    pub fn from_loader<B: Backend>(loader: &ImageDataLoader<B>) -> Result<Self> {
        let batch = loader
            .iter()
            .next()
            .ok_or_else(|| Error::Image("loader produced no batch".to_string()))?;
        let batch_len = batch.len();

        let stats = Self::from_batch(batch.images)?;
        info!(
            "Channel statistics over {} images: mean={:?} std={:?}",
            batch_len, stats.mean, stats.std
        );
        Ok(stats)
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Deviations used for normalization.
    ///
    /// A constant channel has a deviation of zero; it is raised to [`MIN_STD`]
    /// so the channel is only centred.
    pub fn normalize_std(&self) -> Vec<f64> {
        self.std
            .iter()
            .enumerate()
            .map(|(channel, &s)| {
                if s.is_finite() && s >= MIN_STD {
                    s
                } else {
                    warn!("Channel {} has standard deviation {}, using {}", channel, s, MIN_STD);
                    MIN_STD
                }
            })
            .collect()
    }

    /// The `Normalize(means, stds)` step for these statistics
    pub fn to_normalize_spec(&self) -> TransformSpec {
        let std = self.normalize_std();

        TransformSpec::new(
            "Normalize",
            vec![TransformArg::Seq(self.mean.clone()), TransformArg::Seq(std)],
        )
    }
}

fn to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| Error::Serialization(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::TransformPipeline;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_channel_statistics() {
        let device = Default::default();
        // two images, two channels, 1x2 pixels
        let images = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![0.0f32, 1.0, 2.0, 2.0, 2.0, 3.0, 2.0, 2.0],
                [2, 2, 1, 2],
            ),
            &device,
        );

        let stats = ChannelStatistics::from_batch(images).unwrap();
        assert_eq!(stats.channels(), 2);
        // channel 0 holds 0, 1, 2, 3 and channel 1 is constant
        assert!((stats.mean[0] - 1.5).abs() < 1e-6);
        assert!((stats.mean[1] - 2.0).abs() < 1e-6);
        // unbiased: sum of squared deviations / (n - 1)
        let var0: f64 = 5.0 / 3.0;
        assert!((stats.std[0] - var0.sqrt()).abs() < 1e-5);
        assert!(stats.std[1].abs() < 1e-6);
    }

    #[test]
    fn test_single_value_is_rejected() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 1, 1], &device);
        assert!(ChannelStatistics::from_batch(images).is_err());
    }

    #[test]
    fn test_normalize_spec_builds() {
        let stats = ChannelStatistics {
            mean: vec![0.4, 0.5, 0.6],
            std: vec![0.2, 0.2, 0.3],
        };
        let pipeline = TransformPipeline::build(&[
            TransformSpec::new("ToTensor", vec![]),
            stats.to_normalize_spec(),
        ])
        .unwrap();
        assert_eq!(pipeline.step_names(), vec!["ToTensor", "Normalize"]);
    }

    #[test]
    fn test_constant_channel_still_normalizes() {
        let device = Default::default();
        // channel 1 is constant across the batch
        let images = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![0.0f32, 1.0, 0.5, 0.5, 2.0, 3.0, 0.5, 0.5],
                [2, 2, 1, 2],
            ),
            &device,
        );
        let stats = ChannelStatistics::from_batch(images).unwrap();
        assert!(stats.std[1].abs() < 1e-6);

        let spec = stats.to_normalize_spec();
        let TransformArg::Seq(ref std) = spec.args[1] else {
            panic!("expected a sequence of deviations");
        };
        assert!(std.iter().all(|s| *s >= MIN_STD));
        assert_eq!(std[0], stats.std[0]);

        let pipeline =
            TransformPipeline::build(&[TransformSpec::new("ToTensor", vec![]), spec]).unwrap();
        assert_eq!(pipeline.len(), 2);
    }
}
