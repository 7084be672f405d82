//! Split manifests.
//!
//! A manifest is the JSON form of a [`DatasetSplit`] over file paths. Training
//! writes one into its artifact directory so that later commands evaluate on
//! exactly the held-out pairs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use unet_seg::{collect_pairs, split_data, DatasetSplit};

use crate::config::SplitConfig;

pub type SplitManifest = DatasetSplit<PathBuf>;

/// Lists the pairs under both directories and splits them positionally.
///
/// # Errors
///
/// Returns an error if the directories cannot be listed, hold different
/// numbers of files, or a ratio is invalid.
pub fn split_directories(
    image_dir: impl AsRef<Path>,
    mask_dir: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<SplitManifest> {
    let (images, masks) = collect_pairs(image_dir.as_ref(), mask_dir.as_ref())?;
    let split = split_data(&images, &masks, config.ratio1, config.ratio2)?;

    tracing::info!(
        train = split.train_images.len(),
        val = split.val_images.len(),
        test = split.test_images.len(),
        "dataset split"
    );

    Ok(split)
}

/// Writes `split` as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_manifest(split: &SplitManifest, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(split)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write split manifest to {}", path.display()))?;

    tracing::info!(path = %path.display(), pairs = split.len(), "saved split manifest");
    Ok(())
}

/// Reads a manifest written by [`save_manifest`].
///
/// # Errors
///
/// Returns an error if the file is missing or is not a valid manifest.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<SplitManifest> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read split manifest {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse split manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_pairs(root: &Path, count: usize) -> (PathBuf, PathBuf) {
        let images = root.join("images");
        let masks = root.join("masks");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&masks).unwrap();
        for i in 0..count {
            fs::write(images.join(format!("{i:03}.jpg")), b"").unwrap();
            fs::write(masks.join(format!("{i:03}.png")), b"").unwrap();
        }
        (images, masks)
    }

    #[test]
    fn splits_directories_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let (images, masks) = touch_pairs(dir.path(), 10);

        let split = split_directories(&images, &masks, &SplitConfig::new()).unwrap();

        assert_eq!(split.train_images.len(), 8);
        assert_eq!(split.test_images, vec![images.join("000.jpg")]);
        assert_eq!(split.val_masks, vec![masks.join("001.png")]);
    }

    #[test]
    fn manifest_survives_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (images, masks) = touch_pairs(dir.path(), 5);
        let split = split_directories(&images, &masks, &SplitConfig::new()).unwrap();
        let path = dir.path().join("out").join("split.json");

        save_manifest(&split, &path).unwrap();

        assert_eq!(load_manifest(&path).unwrap(), split);
    }

    #[test]
    fn mismatched_directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (images, _) = touch_pairs(dir.path(), 3);
        fs::write(images.join("extra.png"), b"").unwrap();

        let masks = dir.path().join("masks");
        assert!(split_directories(&images, &masks, &SplitConfig::new()).is_err());
    }
}
