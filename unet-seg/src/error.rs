//! Error types for the `unet-seg` crate.
//!
//! Each concern of the crate (model construction, dataset splitting,
//! image loading and figure rendering) has its own error enum so callers
//! can match on the failures that are relevant to them.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running the U-Net model.
#[derive(Error, Debug)]
pub enum UNetError {
    /// The model configuration is logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// An input tensor does not have the shape the model expects.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for model operations.
pub type UNetResult<T> = Result<T, UNetError>;

/// Errors raised by [`split_data`](crate::split_data).
#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    /// The image and mask lists are not paired one to one.
    #[error("Image/mask count mismatch: {images} images, {masks} masks")]
    LengthMismatch {
        /// Number of image entries.
        images: usize,
        /// Number of mask entries.
        masks: usize,
    },

    /// A split ratio is not a finite number in `[0, 1]`.
    #[error("Invalid split ratio {name}={value}: must be within [0, 1]")]
    InvalidRatio {
        /// Which ratio was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Errors raised while collecting, decoding or preprocessing samples.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The directory does not exist.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// Walking a directory failed.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory being walked.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// The image and mask directories hold a different number of files.
    #[error("Found {images} images in {image_dir} but {masks} masks in {mask_dir}")]
    CountMismatch {
        /// Image directory.
        image_dir: PathBuf,
        /// Mask directory.
        mask_dir: PathBuf,
        /// Number of images found.
        images: usize,
        /// Number of masks found.
        masks: usize,
    },

    /// No usable files were found.
    #[error("No image files found in: {path}")]
    Empty {
        /// The directory that was searched.
        path: PathBuf,
    },

    /// Opening or decoding an image failed.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file that failed to open.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: image::ImageError,
    },

    /// The preprocessing configuration cannot be applied.
    #[error("Invalid preprocessing configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors raised while rendering or saving figures.
#[derive(Error, Debug)]
pub enum VisualizeError {
    /// Nothing was given to draw.
    #[error("Nothing to display")]
    EmptyDisplayList,

    /// A tensor cannot be drawn as an image.
    #[error("Cannot render tensor with shape {shape:?}: {reason}")]
    UnsupportedShape {
        /// The offending tensor shape.
        shape: Vec<usize>,
        /// Why it cannot be rendered.
        reason: &'static str,
    },

    /// The dataset did not yield enough samples.
    #[error("Requested {requested} samples but only {available} could be loaded")]
    NotEnoughSamples {
        /// Samples requested.
        requested: usize,
        /// Samples available.
        available: usize,
    },

    /// Tensor data could not be read back as `f32`.
    #[error("Failed to read tensor data: {reason}")]
    TensorData {
        /// Description of the conversion failure.
        reason: String,
    },

    /// Writing the figure failed.
    #[error("Failed to save figure: {path}")]
    SaveFailed {
        /// Output path.
        path: PathBuf,
        /// The underlying encode error.
        #[source]
        source: image::ImageError,
    },
}

/// A specialized `Result` type for visualization.
pub type VisualizeResult<T> = Result<T, VisualizeError>;
