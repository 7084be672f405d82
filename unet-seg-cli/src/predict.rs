//! Prediction figures from a trained artifact directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::Module,
    prelude::*,
    record::CompactRecorder,
};
use clap::ValueEnum;
use unet_seg::{display, predictions, SegmentationBatcher, SegmentationDataset, UNet};

use crate::{
    backend::{create_device, get_backend_name, SelectedBackend},
    config::{TrainingConfig, MODEL_FILE, SPLIT_FILE},
    split::load_manifest,
};

/// Which subset of the saved split to draw samples from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum Subset {
    Train,
    Val,
    #[default]
    Test,
}

#[derive(Debug)]
pub struct PredictArgs {
    pub artifact_dir: PathBuf,
    pub output_dir: PathBuf,
    pub subset: Subset,
    /// Number of samples in the predictions figure.
    pub num: usize,
}

/// Rebuilds the model saved in `artifact_dir` and loads its weights.
///
/// # Errors
///
/// Returns an error if the config or the model record cannot be loaded.
pub fn load_model<B: Backend>(
    artifact_dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(TrainingConfig, UNet<B>)> {
    let artifact_dir = artifact_dir.as_ref();
    let config = TrainingConfig::load_from_artifacts(artifact_dir)?;
    let model_path = artifact_dir.join(MODEL_FILE);

    let model = config
        .model
        .init::<B>(device)?
        .load_file(&model_path, &CompactRecorder::new(), device)
        .map_err(|e| anyhow::anyhow!("failed to load model {}: {e}", model_path.display()))?;

    tracing::info!(path = %model_path.display(), "loaded model");
    Ok((config, model))
}

/// Writes `predictions.png` for the first `num` samples of the chosen subset
/// and `display.png` comparing the first sample's true and predicted mask.
///
/// # Errors
///
/// Returns an error if the artifacts are missing, the subset is too small or
/// a figure cannot be written.
pub fn run_prediction_on_device<B: Backend>(device: &B::Device, args: &PredictArgs) -> Result<()> {
    let (config, model) = load_model::<B>(&args.artifact_dir, device)?;
    let split = load_manifest(args.artifact_dir.join(SPLIT_FILE))?;

    let (images, masks) = match args.subset {
        Subset::Train => (split.train_images, split.train_masks),
        Subset::Val => (split.val_images, split.val_masks),
        Subset::Test => (split.test_images, split.test_masks),
    };
    if images.is_empty() {
        bail!("The {:?} subset of the saved split is empty", args.subset);
    }

    let dataset = SegmentationDataset::new(images, masks, config.preprocess)?;
    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let num = args.num.min(dataset.len());
    if num < args.num {
        tracing::warn!(requested = args.num, available = num, "subset has fewer samples");
    }
    predictions(
        &dataset,
        &model,
        num,
        device,
        args.output_dir.join("predictions.png"),
    )?;

    let Some(item) = dataset.get(0) else {
        bail!("Failed to load the first sample of the {:?} subset", args.subset);
    };
    let batch = SegmentationBatcher::<B>::new().batch(vec![item], device);
    let image = batch.images.clone().squeeze::<3>(0);
    let true_mask = batch.masks.argmax(1).float().squeeze::<3>(0);
    let predicted = model.predict_mask(batch.images).float().squeeze::<3>(0);
    display(
        vec![image, true_mask, predicted],
        args.output_dir.join("display.png"),
    )?;

    Ok(())
}

/// Runs [`run_prediction_on_device`] on the backend selected by cargo features.
///
/// # Errors
///
/// See [`run_prediction_on_device`].
pub fn run_prediction(args: PredictArgs) -> Result<()> {
    tracing::info!(backend = get_backend_name(), "starting prediction on backend");
    run_prediction_on_device::<SelectedBackend>(&create_device(), &args)
}
