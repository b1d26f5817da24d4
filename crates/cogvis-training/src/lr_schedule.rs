//! Epoch-level learning rate schedules.
//!
//! The scheduler owns the current learning rate; the training loop reads it
//! for every optimizer step and calls [`LearningRateScheduler::step`] once
//! after each training pass.

use std::f64::consts::PI;

use cogvis_core::ScheduleKind;
use tracing::debug;

/// Learning rate scheduler
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    kind: ScheduleKind,
    base_lr: f64,
    current_lr: f64,
    current_epoch: usize,
}

impl LearningRateScheduler {
    /// Create a new learning rate scheduler
    pub fn new(kind: ScheduleKind, base_lr: f64) -> Self {
        Self {
            kind,
            base_lr,
            current_lr: base_lr,
            current_epoch: 0,
        }
    }

    /// A schedule that never changes the learning rate
    pub fn constant(lr: f64) -> Self {
        Self::new(ScheduleKind::Constant, lr)
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    /// Number of completed steps
    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    /// Step the scheduler (call at the end of each training pass)
    pub fn step(&mut self) {
        self.current_epoch += 1;

        match self.kind {
            ScheduleKind::Constant => {}

            ScheduleKind::Step { step_size, gamma } => {
                if step_size > 0 && self.current_epoch % step_size == 0 {
                    self.current_lr *= gamma;
                }
            }

            ScheduleKind::Exponential { gamma } => {
                self.current_lr *= gamma;
            }

            ScheduleKind::CosineAnnealing { t_max, eta_min } => {
                let progress = (self.current_epoch as f64 / t_max.max(1) as f64).min(1.0);
                self.current_lr =
                    eta_min + (self.base_lr - eta_min) * (1.0 + (progress * PI).cos()) / 2.0;
            }
        }

        debug!("LR schedule step {} -> lr={:.6}", self.current_epoch, self.current_lr);
    }

    /// Reset the scheduler
    pub fn reset(&mut self) {
        self.current_lr = self.base_lr;
        self.current_epoch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let mut scheduler = LearningRateScheduler::constant(0.001);
        assert_eq!(scheduler.get_lr(), 0.001);

        scheduler.step();
        scheduler.step();
        assert_eq!(scheduler.get_lr(), 0.001);
        assert_eq!(scheduler.current_epoch(), 2);
    }

    #[test]
    fn test_step_lr_matches_demo_schedule() {
        let mut scheduler = LearningRateScheduler::new(
            ScheduleKind::Step {
                step_size: 7,
                gamma: 0.1,
            },
            0.001,
        );

        for _ in 0..6 {
            scheduler.step();
        }
        assert_eq!(scheduler.get_lr(), 0.001);

        scheduler.step(); // epoch 7
        assert!((scheduler.get_lr() - 0.0001).abs() < 1e-12);

        for _ in 0..7 {
            scheduler.step();
        }
        assert!((scheduler.get_lr() - 0.00001).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_lr() {
        let mut scheduler =
            LearningRateScheduler::new(ScheduleKind::Exponential { gamma: 0.9 }, 0.001);

        scheduler.step();
        assert!((scheduler.get_lr() - 0.0009).abs() < 1e-9);

        scheduler.step();
        assert!((scheduler.get_lr() - 0.00081).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_annealing() {
        let mut scheduler = LearningRateScheduler::new(
            ScheduleKind::CosineAnnealing {
                t_max: 10,
                eta_min: 0.0001,
            },
            0.001,
        );

        for _ in 0..5 {
            scheduler.step();
        }
        let halfway = scheduler.get_lr();
        assert!((halfway - 0.00055).abs() < 1e-9);

        for _ in 0..10 {
            scheduler.step();
        }
        assert!((scheduler.get_lr() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_reset() {
        let mut scheduler =
            LearningRateScheduler::new(ScheduleKind::Exponential { gamma: 0.5 }, 0.1);

        scheduler.step();
        scheduler.step();
        assert_ne!(scheduler.get_lr(), 0.1);

        scheduler.reset();
        assert_eq!(scheduler.get_lr(), 0.1);
        assert_eq!(scheduler.current_epoch(), 0);
    }
}
