//! Supervised training loop with best-snapshot restoration.
//!
//! Every epoch runs one gradient-tracked pass over the training loader and one
//! pass over the validation loader with the model's `valid()` projection. The
//! parameters of the epoch with the highest validation accuracy are kept and
//! restored once all epochs are done.

use std::marker::PhantomData;
use std::time::Instant;

use burn::{
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use cogvis_core::{
    select_device, DevicePlacement, EpochRecord, EpochStats, Error, PassAccumulator, Phase,
    Result, TrainingReport,
};
use cogvis_dataset::ImageDataLoader;
use tracing::{debug, info, warn};

use crate::criterion::Criterion;
use crate::lr_schedule::LearningRateScheduler;
use crate::model::ImageClassifier;

/// Observer of the training loop.
///
/// All callbacks default to no-ops; `()` is the listener that ignores everything.
pub trait TrainingListener<M> {
    fn on_phase_start(&mut self, _epoch: usize, _phase: Phase) {}

    fn on_phase_end(&mut self, _epoch: usize, _phase: Phase, _stats: &EpochStats) {}

    /// Called after best tracking, with the model as it was evaluated
    fn on_epoch_end(&mut self, _record: &EpochRecord, _model: &M) {}
}

impl<M> TrainingListener<M> for () {}

/// Keeps the record of the model with the highest validation accuracy.
///
/// Starts from the initial parameters with a best accuracy of 0.0; only a
/// strictly greater accuracy replaces the snapshot, so ties keep the earlier epoch.
pub struct BestModelTracker<B: Backend, M: Module<B>> {
    best_accuracy: f64,
    best_epoch: Option<usize>,
    snapshot: M::Record,
    _backend: PhantomData<B>,
}

impl<B: Backend, M: Module<B>> BestModelTracker<B, M> {
    pub fn new(initial: &M) -> Self {
        Self {
            best_accuracy: 0.0,
            best_epoch: None,
            snapshot: initial.clone().into_record(),
            _backend: PhantomData,
        }
    }

    /// Records `model` if `accuracy` beats the best so far; returns whether it did
    pub fn observe(&mut self, epoch: usize, accuracy: f64, model: &M) -> bool {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.best_epoch = Some(epoch);
            self.snapshot = model.clone().into_record();
            true
        } else {
            false
        }
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    /// `None` while no epoch has beaten 0.0
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Loads the best snapshot into `model`
    pub fn restore(self, model: M) -> M {
        model.load_record(self.snapshot)
    }
}

/// Training and validation loaders with their declared sizes.
///
/// The sizes are the divisors of the epoch statistics, as reported by the
/// dataset loader alongside each loader.
pub struct EpochData<B: AutodiffBackend> {
    pub train: ImageDataLoader<B>,
    pub train_size: usize,
    pub valid: ImageDataLoader<B::InnerBackend>,
    pub val_size: usize,
}

/// Epoch loop configuration
#[derive(Debug, Clone)]
pub struct TrainingLoop {
    num_epochs: usize,
    device: String,
}

impl TrainingLoop {
    pub fn new(num_epochs: usize) -> Self {
        Self {
            num_epochs,
            device: "accelerator".to_string(),
        }
    }

    /// Device selector, `accelerator` or `host` (`gpu` / `cpu` are aliases)
    pub fn with_device(mut self, selector: impl Into<String>) -> Self {
        self.device = selector.into();
        self
    }

    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Trains `model` and returns it restored to its best validation epoch.
    ///
    /// `optimizer` and `scheduler` must already be set up for this model.
    pub fn run<B, M, C, O>(
        &self,
        model: M,
        data: &EpochData<B>,
        criterion: &C,
        optimizer: &mut O,
        scheduler: &mut LearningRateScheduler,
    ) -> Result<M>
    where
        B: AutodiffBackend + DevicePlacement,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        C: Criterion<B> + Criterion<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        self.run_with_report(model, data, criterion, optimizer, scheduler, &mut ())
            .map(|(model, _)| model)
    }

    /// [`run`](Self::run), also returning the per-epoch history
    pub fn run_with_report<B, M, C, O, L>(
        &self,
        model: M,
        data: &EpochData<B>,
        criterion: &C,
        optimizer: &mut O,
        scheduler: &mut LearningRateScheduler,
        listener: &mut L,
    ) -> Result<(M, TrainingReport)>
    where
        B: AutodiffBackend + DevicePlacement,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        C: Criterion<B> + Criterion<B::InnerBackend>,
        O: Optimizer<M, B>,
        L: TrainingListener<M>,
    {
        let device = select_device::<B>(&self.device)?;
        if data.train_size == 0 {
            return Err(Error::EmptyPass(Phase::Train));
        }
        if data.val_size == 0 {
            return Err(Error::EmptyPass(Phase::Valid));
        }

        let start = Instant::now();
        let mut model = model.to_device(&device);
        let mut tracker = BestModelTracker::<B, M>::new(&model);
        let mut report = TrainingReport::default();

        for epoch in 0..self.num_epochs {
            info!("Epoch {}/{}", epoch + 1, self.num_epochs);

            let learning_rate = scheduler.get_lr();
            listener.on_phase_start(epoch, Phase::Train);
            let (trained, train) = train_pass(
                model,
                &data.train,
                data.train_size,
                criterion,
                optimizer,
                learning_rate,
                &device,
            )?;
            model = trained;
            scheduler.step();
            listener.on_phase_end(epoch, Phase::Train, &train);
            info!(
                "{} Loss: {:.4} Acc: {:.4}",
                Phase::Train,
                train.loss,
                train.accuracy
            );

            listener.on_phase_start(epoch, Phase::Valid);
            let valid =
                valid_pass::<B, M, C>(&model, &data.valid, data.val_size, criterion, &device)?;
            listener.on_phase_end(epoch, Phase::Valid, &valid);
            info!(
                "{} Loss: {:.4} Acc: {:.4}",
                Phase::Valid,
                valid.loss,
                valid.accuracy
            );

            let improved = tracker.observe(epoch, valid.accuracy, &model);
            if improved {
                debug!("New best validation accuracy {:.4}", valid.accuracy);
            }

            let record = EpochRecord {
                epoch,
                learning_rate,
                train,
                valid,
                improved,
            };
            listener.on_epoch_end(&record, &model);
            report.push(record);
        }

        let elapsed = start.elapsed().as_secs();
        info!(
            "Training complete in {}m {}s",
            elapsed / 60,
            elapsed % 60
        );
        info!("Best val Acc: {:.4}", tracker.best_accuracy());
        if tracker.best_epoch().is_none() {
            warn!("No epoch improved on zero validation accuracy, returning the initial parameters");
        }

        report.best_epoch = tracker.best_epoch();
        report.best_accuracy = tracker.best_accuracy();

        let model = tracker.restore(model).to_device(&B::host_device());
        Ok((model, report))
    }
}

/// Free-function form of [`TrainingLoop::run`]
#[allow(clippy::too_many_arguments)]
pub fn run<B, M, C, O>(
    model: M,
    train: ImageDataLoader<B>,
    valid: ImageDataLoader<B::InnerBackend>,
    train_size: usize,
    val_size: usize,
    criterion: &C,
    optimizer: &mut O,
    scheduler: &mut LearningRateScheduler,
    num_epochs: usize,
    device: &str,
) -> Result<M>
where
    B: AutodiffBackend + DevicePlacement,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    C: Criterion<B> + Criterion<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let data = EpochData {
        train,
        train_size,
        valid,
        val_size,
    };
    TrainingLoop::new(num_epochs)
        .with_device(device)
        .run(model, &data, criterion, optimizer, scheduler)
}

/// Number of rows whose highest score is at the target index
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// A loader stops at the first sample it cannot produce, so a short count
/// means part of the split was never seen
fn check_pass_complete(phase: Phase, acc: &PassAccumulator, size: usize) -> Result<()> {
    if acc.samples_seen() != size {
        return Err(Error::IncompletePass {
            phase,
            seen: acc.samples_seen(),
            declared: size,
        });
    }
    Ok(())
}

fn train_pass<B, M, C, O>(
    mut model: M,
    loader: &ImageDataLoader<B>,
    size: usize,
    criterion: &C,
    optimizer: &mut O,
    learning_rate: f64,
    device: &B::Device,
) -> Result<(M, EpochStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    C: Criterion<B>,
    O: Optimizer<M, B>,
{
    let mut acc = PassAccumulator::new();

    for batch in loader.iter() {
        let batch = batch.to_device(device);
        let batch_len = batch.len();

        let logits = model.forward(batch.images);
        let loss = criterion.loss(logits.clone(), batch.targets.clone());
        let corrects = count_correct(logits.detach(), batch.targets);
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(learning_rate, model, grads);

        acc.record_batch(loss_value, batch_len, corrects);
    }

    check_pass_complete(Phase::Train, &acc, size)?;
    Ok((model, acc.finish(Phase::Train, size)?))
}

fn valid_pass<B, M, C>(
    model: &M,
    loader: &ImageDataLoader<B::InnerBackend>,
    size: usize,
    criterion: &C,
    device: &B::Device,
) -> Result<EpochStats>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    C: Criterion<B::InnerBackend>,
{
    // No graph is recorded on the inner backend and dropout is inactive
    let model = model.valid();
    let mut acc = PassAccumulator::new();

    for batch in loader.iter() {
        let batch = batch.to_device(device);
        let batch_len = batch.len();

        let logits = model.forward(batch.images);
        let loss = criterion.loss(logits.clone(), batch.targets.clone());
        let corrects = count_correct(logits, batch.targets);
        let loss_value: f64 = loss.into_scalar().elem();

        acc.record_batch(loss_value, batch_len, corrects);
    }

    check_pass_complete(Phase::Valid, &acc, size)?;
    acc.finish(Phase::Valid, size)
}
