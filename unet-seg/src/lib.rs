//! # unet-seg
//!
//! Helpers for training a U-Net image-segmentation model with the Burn deep
//! learning framework.
//!
//! ## Modules
//!
//! - `split`: positional train/validation/test splitting of paired file lists.
//! - `dataset`: image/mask decoding, resizing, normalization, one-hot mask
//!   thresholding, shuffling and batching.
//! - `models`: the five-level U-Net encoder-decoder.
//! - `losses`: categorical cross-entropy with an optional Dice term.
//! - `metrics`: the Dice overlap coefficient and its training metric.
//! - `training`: step outputs wired into Burn's learner.
//! - `visualize`: PNG figures of inputs, masks and predictions.

mod config;
pub mod dataset;
mod error;
pub mod losses;
pub mod metrics;
pub mod models;
pub mod split;
pub mod training;
pub mod visualize;

#[doc(inline)]
pub use config::{PreprocessConfig, ResizeFilter};
#[doc(inline)]
pub use dataset::{
    load_image, load_mask, load_pair, shuffle_map_data, SegmentationBatch, SegmentationBatcher,
    SegmentationDataset, SegmentationItem, ShuffledSegmentationDataset,
};
#[doc(inline)]
pub use error::{
    DatasetError, DatasetResult, SplitError, UNetError, UNetResult, VisualizeError,
    VisualizeResult,
};
#[doc(inline)]
pub use losses::{SegmentationLoss, SegmentationLossConfig};
#[doc(inline)]
pub use metrics::{dice_coefficient, dice_score, DiceInput, DiceMetric, DiceMetricConfig};
#[doc(inline)]
pub use models::{UNet, UNetConfig, UNetRecord};
#[doc(inline)]
pub use split::{collect_pairs, collect_paths, split_data, DatasetSplit};
#[doc(inline)]
pub use training::SegmentationOutput;
#[doc(inline)]
pub use visualize::{display, predictions};

#[cfg(test)]
mod tests {
    use burn::backend::{ndarray::NdArray, Autodiff};

    pub type TestBackend = NdArray;

    pub type TestAutodiffBackend = Autodiff<TestBackend>;
}
