//! Optimizer construction from [`OptimizerKind`].
//!
//! SGD and Adam adaptors are different types, so the factory returns their
//! configs and the caller instantiates the one it gets for its model type.

use burn::optim::{
    decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, SgdConfig,
};
use cogvis_core::OptimizerKind;

/// An optimizer config ready to be `init()`ed for a model
#[derive(Debug, Clone)]
pub enum OptimizerSetup {
    Sgd(SgdConfig),
    Adam(AdamConfig),
}

impl OptimizerSetup {
    pub fn from_kind(kind: &OptimizerKind) -> Self {
        match *kind {
            OptimizerKind::Sgd {
                momentum,
                weight_decay,
            } => OptimizerSetup::Sgd(sgd(momentum, weight_decay)),
            OptimizerKind::Adam { weight_decay } => OptimizerSetup::Adam(adam(weight_decay)),
        }
    }
}

fn weight_decay(penalty: f64) -> Option<WeightDecayConfig> {
    (penalty > 0.0).then(|| WeightDecayConfig::new(penalty as f32))
}

fn classical_momentum(momentum: f64) -> Option<MomentumConfig> {
    (momentum > 0.0).then(|| {
        MomentumConfig::new()
            .with_momentum(momentum)
            .with_dampening(0.0)
    })
}

/// Plain SGD with classical (undampened) momentum
pub fn sgd(momentum: f64, penalty: f64) -> SgdConfig {
    SgdConfig::new()
        .with_momentum(classical_momentum(momentum))
        .with_weight_decay(weight_decay(penalty))
}

pub fn adam(penalty: f64) -> AdamConfig {
    AdamConfig::new().with_weight_decay(weight_decay(penalty))
}
