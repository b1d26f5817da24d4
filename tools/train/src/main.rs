//! Training CLI Tool
//!
//! Trains an image classifier on `<root>/<class>/<image>` folders:
//! 1. derives per-channel normalization from a first pass over the training set,
//! 2. builds the configured model (adapted backbone, MLP or CNN),
//! 3. runs the epoch loop and saves the best model with its report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    backend::Autodiff,
    optim::Optimizer,
    tensor::backend::{AutodiffBackend, Backend},
};
use clap::Parser;
use colored::Colorize;
use cogvis_core::{
    load_toml_config, select_device, setup_cli_logging, EpochRecord, ExperimentConfig, ModelKind,
    TrainingReport,
};
use cogvis_dataset::{
    ChannelStatistics, DatasetLoader, ImageFolder, TransformArg, TransformPipeline, TransformSpec,
};
use cogvis_training::{
    save_model, CheckpointMetadata, ClassifierModel, CnnConfig, CrossEntropy, EpochData,
    LearningRateScheduler, MlpConfig, ModelAdapter, OptimizerSetup, TrainingListener,
    TrainingLoop,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[cfg(not(feature = "wgpu"))]
type TrainBackend = Autodiff<burn::backend::NdArray>;
#[cfg(feature = "wgpu")]
type TrainBackend = Autodiff<burn::backend::Wgpu>;

type ValidBackend = <TrainBackend as AutodiffBackend>::InnerBackend;

/// Image classification training tool
#[derive(Parser, Debug)]
#[command(
    name = "cogvis-train",
    about = "Train an image classifier on an image-folder dataset",
    long_about = "Train an MLP, a CNN or an adapted ImageNet backbone on \
                  <root>/<class>/<image> folders, keeping the epoch with the best \
                  validation accuracy."
)]
struct Args {
    /// Path to the experiment configuration file (TOML); defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override learning rate
    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    /// Override batch size
    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Override device (accelerator, host)
    #[arg(short, long, value_name = "DEVICE")]
    device: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate the configuration without training
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    println!("{}", "cogvis - image classifier training".green().bold());

    let mut config = match &args.config {
        Some(path) => load_toml_config::<ExperimentConfig>(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    print_config_summary(&config);
    if args.dry_run {
        info!("Configuration validated successfully (dry run)");
        return Ok(());
    }

    run_training(&config)
}

fn apply_overrides(config: &mut ExperimentConfig, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.training.learning_rate = lr;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(ref device) = args.device {
        config.training.device = device.clone();
    }
    if let Some(ref output) = args.output {
        config.output.output_dir = output.clone();
    }
}

fn print_config_summary(config: &ExperimentConfig) {
    println!();
    println!("{}", "Configuration:".cyan().bold());
    match config.model.kind {
        ModelKind::Pretrained => println!(
            "  Model:         {} (pretrained: {}, frozen backbone: {})",
            config.model.architecture, config.model.pretrained, config.model.freeze_backbone
        ),
        kind => println!("  Model:         {}", kind),
    }
    println!("  Classes:       {}", config.model.num_classes);
    println!("  Epochs:        {}", config.training.num_epochs);
    println!("  Batch size:    {}", config.training.batch_size);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Optimizer:     {}", config.training.optimizer);
    println!("  Schedule:      {:?}", config.training.schedule);
    println!("  Device:        {}", config.training.device);
    println!("  Train dir:     {}", config.data.train_dir.display());
    println!("  Val dir:       {}", config.data.val_dir.display());
    println!("  Output dir:    {}", config.output.output_dir.display());
    println!();
}

fn geometry_specs(config: &ExperimentConfig) -> Vec<TransformSpec> {
    vec![
        TransformSpec::new("Resize", vec![TransformArg::from(config.data.resize)]),
        TransformSpec::new("CenterCrop", vec![TransformArg::from(config.data.crop)]),
        TransformSpec::new("ToTensor", vec![]),
    ]
}

/// Normalization from the config, or measured on the first training batch
fn channel_statistics(
    config: &ExperimentConfig,
    device: &<ValidBackend as Backend>::Device,
) -> Result<ChannelStatistics> {
    if let Some(ref normalize) = config.data.normalize {
        info!("Using configured normalization");
        return Ok(ChannelStatistics {
            mean: normalize.mean.clone(),
            std: normalize.std.clone(),
        });
    }

    println!("{}", "Computing channel statistics...".cyan());
    let pipeline = TransformPipeline::build(&geometry_specs(config))?;
    let (_, loader) = DatasetLoader::new(config.data.stats_batch_size)
        .with_pipeline(pipeline)
        .with_seed(config.training.seed)
        .load::<ValidBackend>(&config.data.train_dir, device)?;

    let stats = ChannelStatistics::from_loader(&loader)?;
    println!("  Mean: {:?}", stats.mean);
    println!("  Std:  {:?}", stats.std);
    Ok(stats)
}

fn build_model<B: Backend>(
    config: &ExperimentConfig,
    channels: usize,
    device: &B::Device,
) -> Result<ClassifierModel<B>> {
    let model = &config.model;
    let side = config.data.crop as usize;

    let classifier = match model.kind {
        ModelKind::Pretrained => ModelAdapter::new(&model.weights_dir)
            .adapt::<B>(
                &model.architecture,
                model.num_classes,
                model.pretrained,
                model.freeze_backbone,
                device,
            )?
            .into(),
        ModelKind::Mlp => {
            let mut dims = vec![channels * side * side];
            dims.extend(&model.hidden_dims);
            dims.push(model.num_classes);
            MlpConfig::new(dims).init::<B>(device)?.into()
        }
        ModelKind::Cnn => {
            let mut conv_dims = vec![channels];
            conv_dims.extend(&model.conv_channels);

            let mut cnn = CnnConfig::new(conv_dims, Vec::new())
                .with_conv_kernel(model.conv_kernel)
                .with_pool_kernel(model.pool_kernel);
            let flattened = cnn.flattened_features(side, side).with_context(|| {
                format!("{}x{} inputs are too small for the configured CNN", side, side)
            })?;

            let mut linear_dims = vec![flattened];
            linear_dims.extend(&model.hidden_dims);
            linear_dims.push(model.num_classes);
            cnn.linear_dims = linear_dims;
            cnn.init::<B>(device)?.into()
        }
    };

    Ok(classifier)
}

/// Drives an epoch progress bar from the training loop
struct ProgressListener {
    bar: ProgressBar,
}

impl ProgressListener {
    fn new(num_epochs: usize) -> Result<Self> {
        let bar = ProgressBar::new(num_epochs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }
}

impl<M> TrainingListener<M> for ProgressListener {
    fn on_epoch_end(&mut self, record: &EpochRecord, _model: &M) {
        let marker = if record.improved { " (best)" } else { "" };
        self.bar.set_message(format!(
            "val acc {:.4}{}",
            record.valid.accuracy, marker
        ));
        self.bar.inc(1);
    }
}

fn train_with<O>(
    config: &ExperimentConfig,
    model: ClassifierModel<TrainBackend>,
    data: &EpochData<TrainBackend>,
    mut optimizer: O,
) -> Result<(ClassifierModel<TrainBackend>, TrainingReport)>
where
    O: Optimizer<ClassifierModel<TrainBackend>, TrainBackend>,
{
    let training = &config.training;

    let mut criterion = CrossEntropy::new();
    if let Some(smoothing) = training.label_smoothing {
        criterion = criterion.with_smoothing(smoothing)?;
    }
    let mut scheduler = LearningRateScheduler::new(training.schedule, training.learning_rate);
    let mut listener = ProgressListener::new(training.num_epochs)?;

    let result = TrainingLoop::new(training.num_epochs)
        .with_device(training.device.as_str())
        .run_with_report(
            model,
            data,
            &criterion,
            &mut optimizer,
            &mut scheduler,
            &mut listener,
        );
    listener.bar.finish_and_clear();

    Ok(result?)
}

fn run_training(config: &ExperimentConfig) -> Result<()> {
    let device = select_device::<TrainBackend>(&config.training.device)?;

    let stats = channel_statistics(config, &device)?;
    let mut specs = geometry_specs(config);
    specs.push(stats.to_normalize_spec());
    let pipeline = TransformPipeline::build(&specs)?;
    let channels = pipeline.output_channels();
    info!("Pipeline: {}", pipeline);

    println!("{}", "Loading datasets...".cyan());
    let classes = ImageFolder::new(&config.data.train_dir)?.classes().to_vec();
    if classes.len() != config.model.num_classes {
        warn!(
            "Training set has {} classes but the model is configured for {}",
            classes.len(),
            config.model.num_classes
        );
    }

    let loader = DatasetLoader::new(config.training.batch_size)
        .with_pipeline(pipeline)
        .with_seed(config.training.seed);
    let (train_size, train) = loader.load::<TrainBackend>(&config.data.train_dir, &device)?;
    let (val_size, valid) = loader.load::<ValidBackend>(&config.data.val_dir, &device)?;
    println!("  Training samples:   {}", train_size);
    println!("  Validation samples: {}", val_size);
    println!("  Classes:            {}", classes.join(", "));

    let data = EpochData {
        train,
        train_size,
        valid,
        val_size,
    };

    println!("{}", "Creating model...".cyan());
    let model = build_model::<TrainBackend>(config, channels, &device)?;

    println!();
    println!("{}", "Starting training...".green().bold());
    let (model, report) = match OptimizerSetup::from_kind(&config.training.optimizer) {
        OptimizerSetup::Sgd(sgd) => train_with(
            config,
            model,
            &data,
            sgd.init::<TrainBackend, ClassifierModel<TrainBackend>>(),
        )?,
        OptimizerSetup::Adam(adam) => train_with(
            config,
            model,
            &data,
            adam.init::<TrainBackend, ClassifierModel<TrainBackend>>(),
        )?,
    };

    let output_dir = &config.output.output_dir;
    let stem = output_dir.join(&config.output.model_name);
    let model_name = match config.model.kind {
        ModelKind::Pretrained => config.model.architecture.clone(),
        kind => kind.to_string(),
    };

    let normalize_std = stats.normalize_std();
    let metadata = CheckpointMetadata::new(model_name, classes)
        .with_best(report.best_epoch, report.best_accuracy)
        .with_normalize(stats.mean, normalize_std);

    let record_path = save_model(model, &stem, Some(&metadata))?;
    let report_path = output_dir.join("report.json");
    report.save_json(&report_path)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    match report.best_epoch {
        Some(epoch) => println!(
            "  Best validation accuracy: {:.4} (epoch {})",
            report.best_accuracy,
            epoch + 1
        ),
        None => println!(
            "  {} no epoch improved on the initial parameters",
            "Warning:".yellow()
        ),
    }
    println!("  Model:  {}", record_path.display());
    println!("  Report: {}", report_path.display());

    Ok(())
}
