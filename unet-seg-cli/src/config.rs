//! Configuration of a training run.
//!
//! A run is fully described by a [`TrainingConfig`], stored as JSON next to
//! the artifacts so that `predict` can rebuild the same model and split.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use burn::config::Config;
use unet_seg::{models::SIZE_DIVISOR, PreprocessConfig, UNetConfig};

/// File name of the saved training configuration inside the artifact directory.
pub const CONFIG_FILE: &str = "config.json";
/// File name of the split manifest inside the artifact directory.
pub const SPLIT_FILE: &str = "split.json";
/// File stem of the final model record inside the artifact directory.
pub const MODEL_FILE: &str = "model";

/// Fractions used by `split_data`.
#[derive(Config, Debug)]
pub struct SplitConfig {
    /// Fraction of all pairs set aside for validation and testing.
    #[config(default = 0.2)]
    pub ratio1: f64,
    /// Fraction of the validation+test pool used for testing.
    #[config(default = 0.5)]
    pub ratio2: f64,
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: UNetConfig,

    #[config(default = "PreprocessConfig::new()")]
    pub preprocess: PreprocessConfig,

    #[config(default = "SplitConfig::new()")]
    pub split: SplitConfig,

    /// Directory holding the input images.
    pub image_dir: PathBuf,

    /// Directory holding the masks, paired with images by sorted order.
    pub mask_dir: PathBuf,

    #[config(default = "PathBuf::from(\"artifacts\")")]
    pub artifact_dir: PathBuf,

    #[config(default = 10)]
    pub num_epochs: usize,

    #[config(default = 4)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Random seed for the backend, the dataset shuffle and the data loaders.
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Checks the values that would otherwise fail deep inside training.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "Batch size must be greater than 0");
        ensure!(self.num_epochs > 0, "Number of epochs must be greater than 0");
        ensure!(self.learning_rate > 0.0, "Learning rate must be positive");
        ensure!(
            self.model.output_channels == self.preprocess.mask_channels(),
            "Model predicts {} classes but masks have {} channels",
            self.model.output_channels,
            self.preprocess.mask_channels()
        );
        ensure!(
            self.model.input_channels == 3,
            "Images are decoded as RGB, so the model needs 3 input channels"
        );
        self.model.validate()?;
        self.preprocess.validate()?;
        ensure!(
            self.preprocess.image_size % SIZE_DIVISOR as u32 == 0,
            "Image size {} must be divisible by {}",
            self.preprocess.image_size,
            SIZE_DIVISOR
        );
        Ok(())
    }

    /// Loads the configuration saved in an artifact directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load_from_artifacts(artifact_dir: impl AsRef<Path>) -> Result<Self> {
        let path = artifact_dir.as_ref().join(CONFIG_FILE);
        Self::load(&path)
            .with_context(|| format!("Failed to load training config from {}", path.display()))
    }
}
