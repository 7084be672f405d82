//! Training runner built on Burn's learner.

use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use burn::{
    config::Config,
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::Module,
    optim::AdamConfig,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{metric::LossMetric, LearnerBuilder},
};
use unet_seg::{
    shuffle_map_data, DiceMetric, SegmentationBatch, SegmentationBatcher, SegmentationDataset,
};

use crate::{
    backend::{create_device, get_backend_name, TrainingBackend},
    config::{TrainingConfig, CONFIG_FILE, MODEL_FILE, SPLIT_FILE},
    split::{save_manifest, split_directories, SplitManifest},
};

/// Trains on `device` and writes the config, split manifest, checkpoints and
/// final model into `config.artifact_dir`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the dataset cannot be
/// split, or an artifact cannot be written.
pub fn run_training_on_device<B: AutodiffBackend>(
    device: B::Device,
    config: TrainingConfig,
) -> Result<()> {
    config.validate()?;
    tracing::info!(?device, "initializing U-Net training");

    fs::create_dir_all(&config.artifact_dir).with_context(|| {
        format!(
            "Failed to create artifact directory at {}",
            config.artifact_dir.display()
        )
    })?;
    config
        .save(config.artifact_dir.join(CONFIG_FILE))
        .context("Failed to save training config")?;

    B::seed(config.seed);

    let split = split_directories(&config.image_dir, &config.mask_dir, &config.split)?;
    save_manifest(&split, config.artifact_dir.join(SPLIT_FILE))?;

    let (train_loader, valid_loader) = create_dataloaders::<B>(&config, split)?;

    let model = config.model.init::<B>(&device)?;
    let optimizer = AdamConfig::new().init();

    let learner = LearnerBuilder::new(&config.artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(DiceMetric::new())
        .metric_valid_numeric(DiceMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_application_logger(None)
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, optimizer, config.learning_rate);

    tracing::info!(
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );
    let trained_model = learner.fit(train_loader, valid_loader);

    let model_path = config.artifact_dir.join(MODEL_FILE);
    trained_model
        .save_file(&model_path, &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("failed to save final model: {e}"))?;

    tracing::info!(path = %model_path.display(), "training completed successfully");
    Ok(())
}

type Loader<B> = Arc<dyn DataLoader<B, SegmentationBatch<B>>>;

/// The training set is shuffled once up front and again by the loader every
/// epoch; validation pairs are visited in order.
fn create_dataloaders<B: AutodiffBackend>(
    config: &TrainingConfig,
    split: SplitManifest,
) -> Result<(Loader<B>, Loader<B::InnerBackend>)> {
    let train_dataset = shuffle_map_data(
        split.train_images,
        split.train_masks,
        config.preprocess.clone(),
        config.seed,
    )
    .context("Failed to create training dataset")?;
    let valid_dataset = SegmentationDataset::new(
        split.val_images,
        split.val_masks,
        config.preprocess.clone(),
    )
    .context("Failed to create validation dataset")?;

    tracing::info!(
        train = train_dataset.len(),
        valid = valid_dataset.len(),
        "datasets ready"
    );

    let train_loader = DataLoaderBuilder::new(SegmentationBatcher::<B>::new())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(train_dataset);

    let valid_loader = DataLoaderBuilder::new(SegmentationBatcher::<B::InnerBackend>::new())
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(valid_dataset);

    Ok((train_loader, valid_loader))
}

/// Trains on the backend selected by cargo features.
///
/// # Errors
///
/// See [`run_training_on_device`].
pub fn run_training(config: TrainingConfig) -> Result<()> {
    tracing::info!(
        images = %config.image_dir.display(),
        masks = %config.mask_dir.display(),
        artifacts = %config.artifact_dir.display(),
        classes = config.model.output_channels,
        filters = config.model.filters,
        "configuration loaded"
    );
    tracing::info!(backend = get_backend_name(), "starting training on backend");

    run_training_on_device::<TrainingBackend>(create_device(), config)
}
