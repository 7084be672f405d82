//! Train/validation/test splitting of pre-paired image and mask lists.
//!
//! The split is positional: inputs are expected to already be paired and
//! ordered (for example by [`collect_pairs`]). The first part of the list
//! becomes the validation+test pool and the rest is used for training.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{DatasetError, DatasetResult, SplitError};

/// File extensions accepted when collecting images and masks.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// The six lists produced by [`split_data`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit<T> {
    pub train_images: Vec<T>,
    pub train_masks: Vec<T>,
    pub val_images: Vec<T>,
    pub val_masks: Vec<T>,
    pub test_images: Vec<T>,
    pub test_masks: Vec<T>,
}

/// Legacy ordering of the split lists:
/// `(train_images, train_masks, val_masks, val_images, test_masks, test_images)`.
pub type SplitTuple<T> = (Vec<T>, Vec<T>, Vec<T>, Vec<T>, Vec<T>, Vec<T>);

impl<T> DatasetSplit<T> {
    /// Returns the lists in the order existing training scripts unpack them.
    ///
    /// Masks and images are interleaved non-uniformly:
    /// `(train_images, train_masks, val_masks, val_images, test_masks, test_images)`.
    pub fn into_tuple(self) -> SplitTuple<T> {
        (
            self.train_images,
            self.train_masks,
            self.val_masks,
            self.val_images,
            self.test_masks,
            self.test_images,
        )
    }

    /// Total number of pairs across the three subsets.
    pub fn len(&self) -> usize {
        self.train_images.len() + self.val_images.len() + self.test_images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_ratio(name: &'static str, value: f64) -> Result<(), SplitError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SplitError::InvalidRatio { name, value })
    }
}

/// Splits paired `files`/`masks` into train, validation and test subsets.
///
/// `ratio1` is the fraction of all pairs set aside for validation+test; it is
/// taken from the front of the lists. `ratio2` is the fraction of that pool
/// used for testing, again taken from the front. Both sizes are truncated
/// toward zero.
///
/// # Errors
///
/// Returns [`SplitError::LengthMismatch`] when the lists differ in length and
/// [`SplitError::InvalidRatio`] when a ratio is outside `[0, 1]`.
pub fn split_data<T: Clone>(
    files: &[T],
    masks: &[T],
    ratio1: f64,
    ratio2: f64,
) -> Result<DatasetSplit<T>, SplitError> {
    if files.len() != masks.len() {
        return Err(SplitError::LengthMismatch {
            images: files.len(),
            masks: masks.len(),
        });
    }
    check_ratio("ratio1", ratio1)?;
    check_ratio("ratio2", ratio2)?;

    let num_images = masks.len();
    let val_test_size = (num_images as f64 * ratio1) as usize;

    let (val_test_images, train_images) = files.split_at(val_test_size);
    let (val_test_masks, train_masks) = masks.split_at(val_test_size);

    let split = (val_test_masks.len() as f64 * ratio2) as usize;
    let (test_images, val_images) = val_test_images.split_at(split);
    let (test_masks, val_masks) = val_test_masks.split_at(split);

    tracing::debug!(
        total = num_images,
        train = train_images.len(),
        val = val_images.len(),
        test = test_images.len(),
        "split dataset"
    );

    Ok(DatasetSplit {
        train_images: train_images.to_vec(),
        train_masks: train_masks.to_vec(),
        val_images: val_images.to_vec(),
        val_masks: val_masks.to_vec(),
        test_images: test_images.to_vec(),
        test_masks: test_masks.to_vec(),
    })
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|valid| ext.eq_ignore_ascii_case(valid))
        })
        .unwrap_or(false)
}

/// Lists the image files directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Fails if the directory is missing or cannot be read.
pub fn collect_paths(dir: impl AsRef<Path>) -> DatasetResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && has_image_extension(path) {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Collects sorted image and mask paths and checks they pair up one to one.
///
/// Pairing is by sorted position, so images and masks are expected to share
/// a naming scheme.
///
/// # Errors
///
/// Fails if either directory cannot be read, is empty, or the counts differ.
pub fn collect_pairs(
    image_dir: impl AsRef<Path>,
    mask_dir: impl AsRef<Path>,
) -> DatasetResult<(Vec<PathBuf>, Vec<PathBuf>)> {
    let image_dir = image_dir.as_ref();
    let mask_dir = mask_dir.as_ref();

    let images = collect_paths(image_dir)?;
    let masks = collect_paths(mask_dir)?;

    if images.is_empty() {
        return Err(DatasetError::Empty {
            path: image_dir.to_path_buf(),
        });
    }
    if images.len() != masks.len() {
        return Err(DatasetError::CountMismatch {
            image_dir: image_dir.to_path_buf(),
            mask_dir: mask_dir.to_path_buf(),
            images: images.len(),
            masks: masks.len(),
        });
    }

    tracing::info!(
        pairs = images.len(),
        images = %image_dir.display(),
        masks = %mask_dir.display(),
        "collected image/mask pairs"
    );
    Ok((images, masks))
}
