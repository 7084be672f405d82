use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use unet_seg::{PreprocessConfig, UNetConfig};
use unet_seg_cli::{
    backend::{create_device, get_backend_name},
    predict::{run_prediction, PredictArgs, Subset},
    split::{save_manifest, split_directories},
    training::run_training,
    SplitConfig, TrainingConfig,
};

#[derive(Parser)]
#[command(name = "unet-seg")]
#[command(author, version, about = "U-Net image segmentation: split, train and predict")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split image/mask directories into train, validation and test lists
    Split {
        #[arg(long)]
        images: PathBuf,

        #[arg(long)]
        masks: PathBuf,

        /// Fraction of all pairs used for validation and testing
        #[arg(long, default_value_t = 0.2)]
        ratio1: f64,

        /// Fraction of the validation+test pool used for testing
        #[arg(long, default_value_t = 0.5)]
        ratio2: f64,

        /// Where to write the JSON manifest
        #[arg(short, long, default_value = "split.json")]
        output: PathBuf,
    },

    /// Train a U-Net
    Train {
        /// Training configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Image directory (required without --config)
        #[arg(long)]
        images: Option<PathBuf>,

        /// Mask directory (required without --config)
        #[arg(long)]
        masks: Option<PathBuf>,

        /// Override the artifact directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Override number of epochs
        #[arg(long)]
        num_epochs: Option<usize>,

        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Override image size
        #[arg(long)]
        image_size: Option<u32>,

        /// Override base number of filters
        #[arg(long)]
        filters: Option<usize>,
    },

    /// Render predictions of a trained model
    Predict {
        /// Artifact directory written by `train`
        #[arg(short, long, default_value = "artifacts")]
        artifact_dir: PathBuf,

        /// Directory for the PNG figures
        #[arg(short, long, default_value = "figures")]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = Subset::Test)]
        subset: Subset,

        /// Number of samples to plot
        #[arg(short, long, default_value_t = 4)]
        num: usize,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            images,
            masks,
            ratio1,
            ratio2,
            output,
        } => {
            let config = SplitConfig::new().with_ratio1(ratio1).with_ratio2(ratio2);
            let split = split_directories(&images, &masks, &config)?;
            save_manifest(&split, &output)
        }

        Commands::Train {
            config,
            images,
            masks,
            artifact_dir,
            num_epochs,
            batch_size,
            learning_rate,
            image_size,
            filters,
        } => {
            let mut config = match config {
                Some(path) => TrainingConfig::load(&path).with_context(|| {
                    format!("Failed to load config file: {}", path.display())
                })?,
                None => {
                    let images = images
                        .clone()
                        .context("--images is required without --config")?;
                    let masks = masks
                        .clone()
                        .context("--masks is required without --config")?;
                    let preprocess = PreprocessConfig::new();
                    TrainingConfig::new(
                        UNetConfig::new(preprocess.mask_channels()),
                        images,
                        masks,
                    )
                    .with_preprocess(preprocess)
                }
            };

            // Apply command line overrides
            if let Some(images) = images {
                config.image_dir = images;
            }
            if let Some(masks) = masks {
                config.mask_dir = masks;
            }
            if let Some(artifact_dir) = artifact_dir {
                config.artifact_dir = artifact_dir;
            }
            if let Some(num_epochs) = num_epochs {
                config.num_epochs = num_epochs;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.learning_rate = learning_rate;
            }
            if let Some(image_size) = image_size {
                config.preprocess.image_size = image_size;
            }
            if let Some(filters) = filters {
                config.model.filters = filters;
            }

            run_training(config)
        }

        Commands::Predict {
            artifact_dir,
            output,
            subset,
            num,
        } => run_prediction(PredictArgs {
            artifact_dir,
            output_dir: output,
            subset,
            num,
        }),

        Commands::Info => {
            println!("unet-seg information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {:?}", create_device());
            Ok(())
        }
    }
}
