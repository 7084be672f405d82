//! Data loading and preprocessing for segmentation training.
//!
//! Following Burn's convention, the dataset returns raw decoded data and the
//! batcher is responsible for tensor creation and device placement.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{transform::ShuffledDataset, Dataset},
    },
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::{imageops, DynamicImage};

use crate::{
    config::PreprocessConfig,
    error::{DatasetError, DatasetResult},
};

/// A single decoded and preprocessed image/mask pair.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    /// RGB pixels in HWC order, scaled to `[0, 1]`.
    pub image: Vec<f32>,
    /// One-hot mask in HWC order, one channel per configured mask value.
    pub mask: Vec<f32>,
    pub height: usize,
    pub width: usize,
    pub mask_channels: usize,
}

/// A batch of images and masks in channels-first layout.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Images with shape `[N, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// One-hot masks with shape `[N, C, H, W]`.
    pub masks: Tensor<B, 4>,
}

impl<B: Backend> SegmentationBatch<B> {
    pub const fn new(images: Tensor<B, 4>, masks: Tensor<B, 4>) -> Self {
        Self { images, masks }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Stacks [`SegmentationItem`]s into a [`SegmentationBatch`].
#[derive(Clone, Default)]
pub struct SegmentationBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SegmentationItem>, device: &B::Device) -> SegmentationBatch<B> {
        let mut images = Vec::with_capacity(items.len());
        let mut masks = Vec::with_capacity(items.len());

        for item in items {
            let image = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [item.height, item.width, 3]),
                device,
            )
            .permute([2, 0, 1]);
            let mask = Tensor::<B, 3>::from_data(
                TensorData::new(item.mask, [item.height, item.width, item.mask_channels]),
                device,
            )
            .permute([2, 0, 1]);

            images.push(image);
            masks.push(mask);
        }

        SegmentationBatch::new(Tensor::stack(images, 0), Tensor::stack(masks, 0))
    }
}

/// Resizes an already decoded image and scales it to `[0, 1]`.
///
/// Returns HWC data of length `image_size * image_size * 3`.
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessConfig) -> Vec<f32> {
    let size = config.image_size;
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, config.image_filter.filter_type());
    DynamicImage::ImageRgb8(resized).into_rgb32f().into_raw()
}

/// Resizes an already decoded mask and thresholds it into one-hot channels.
///
/// Channel `k` is 1 where the resized intensity equals `mask_values[k]`.
/// Pixels matching no value (for example on interpolated edges) are 0 in
/// every channel.
pub fn preprocess_mask(mask: &DynamicImage, config: &PreprocessConfig) -> Vec<f32> {
    let size = config.image_size;
    let luma = mask.to_luma8();
    let resized = imageops::resize(&luma, size, size, config.mask_filter.filter_type());

    let channels = config.mask_channels();
    let mut out = Vec::with_capacity(resized.as_raw().len() * channels);
    for &pixel in resized.as_raw() {
        out.extend(
            config
                .mask_values
                .iter()
                .map(|&value| if pixel == value { 1.0 } else { 0.0 }),
        );
    }
    out
}

fn open_image(path: &Path) -> DatasetResult<DynamicImage> {
    image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads an image file as RGB, resizes it and scales it to `[0, 1]`.
///
/// # Errors
///
/// Fails if the file cannot be opened or decoded.
pub fn load_image(path: impl AsRef<Path>, config: &PreprocessConfig) -> DatasetResult<Vec<f32>> {
    Ok(preprocess_image(&open_image(path.as_ref())?, config))
}

/// Reads a mask file as single-channel luma, resizes it and thresholds it.
///
/// # Errors
///
/// Fails if the file cannot be opened or decoded.
pub fn load_mask(path: impl AsRef<Path>, config: &PreprocessConfig) -> DatasetResult<Vec<f32>> {
    Ok(preprocess_mask(&open_image(path.as_ref())?, config))
}

/// Reads and preprocesses one image/mask pair.
///
/// # Errors
///
/// Fails if either file cannot be opened or decoded.
pub fn load_pair(
    image_path: impl AsRef<Path>,
    mask_path: impl AsRef<Path>,
    config: &PreprocessConfig,
) -> DatasetResult<SegmentationItem> {
    let size = config.image_size as usize;
    Ok(SegmentationItem {
        image: load_image(image_path, config)?,
        mask: load_mask(mask_path, config)?,
        height: size,
        width: size,
        mask_channels: config.mask_channels(),
    })
}

/// Lazily decoded dataset over pre-paired image and mask paths.
pub struct SegmentationDataset {
    items: Vec<(PathBuf, PathBuf)>,
    config: PreprocessConfig,
}

impl SegmentationDataset {
    /// Pairs `images[i]` with `masks[i]`.
    ///
    /// # Errors
    ///
    /// Fails if the lists differ in length or the configuration is invalid.
    pub fn new(
        images: Vec<PathBuf>,
        masks: Vec<PathBuf>,
        config: PreprocessConfig,
    ) -> DatasetResult<Self> {
        config.validate()?;
        if images.len() != masks.len() {
            return Err(DatasetError::CountMismatch {
                image_dir: parent_dir(&images),
                mask_dir: parent_dir(&masks),
                images: images.len(),
                masks: masks.len(),
            });
        }

        Ok(Self {
            items: images.into_iter().zip(masks).collect(),
            config,
        })
    }
}

fn parent_dir(paths: &[PathBuf]) -> PathBuf {
    paths
        .first()
        .and_then(|path| path.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

impl Dataset<SegmentationItem> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationItem> {
        let (image_path, mask_path) = self.items.get(index)?;
        match load_pair(image_path, mask_path, &self.config) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping unreadable sample");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A segmentation dataset visited in a seeded random order.
pub type ShuffledSegmentationDataset = ShuffledDataset<SegmentationDataset, SegmentationItem>;

/// Builds a decoding dataset over the pairs and shuffles it with `seed`.
///
/// # Errors
///
/// Fails under the same conditions as [`SegmentationDataset::new`].
pub fn shuffle_map_data(
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
    config: PreprocessConfig,
    seed: u64,
) -> DatasetResult<ShuffledSegmentationDataset> {
    let dataset = SegmentationDataset::new(images, masks, config)?;
    Ok(ShuffledDataset::with_seed(dataset, seed))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;
    use crate::{config::ResizeFilter, tests::TestBackend};

    fn write_pair(dir: &Path, name: &str, width: u32, height: u32) -> (PathBuf, PathBuf) {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 255])
        });
        let mask = GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let image_path = dir.join(format!("{name}.png"));
        let mask_path = dir.join(format!("{name}_mask.png"));
        image.save(&image_path).unwrap();
        mask.save(&mask_path).unwrap();
        (image_path, mask_path)
    }

    #[test]
    fn preprocessing_always_emits_configured_size() {
        let config = PreprocessConfig::new();
        for (w, h) in [(37, 20), (600, 800), (512, 512)] {
            let image = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let mask = DynamicImage::ImageLuma8(GrayImage::new(w, h));
            assert_eq!(preprocess_image(&image, &config).len(), 512 * 512 * 3);
            assert_eq!(preprocess_mask(&mask, &config).len(), 512 * 512 * 2);
        }
    }

    #[test]
    fn image_values_are_scaled_to_unit_range() {
        let config = PreprocessConfig::new().with_image_size(4);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 51])));

        let data = preprocess_image(&image, &config);

        for pixel in data.chunks(3) {
            assert!((pixel[0] - 1.0).abs() < 1e-6);
            assert!(pixel[1].abs() < 1e-6);
            assert!((pixel[2] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn mask_is_thresholded_into_one_hot_channels() {
        let config = PreprocessConfig::new()
            .with_image_size(4)
            .with_mask_filter(ResizeFilter::Nearest);
        let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(4, 4, |x, _| match x {
            0 | 1 => Luma([0]),
            2 => Luma([255]),
            _ => Luma([128]),
        }));

        let data = preprocess_mask(&mask, &config);

        for (i, pixel) in data.chunks(2).enumerate() {
            match i % 4 {
                0 | 1 => assert_eq!(pixel, [1.0, 0.0]),
                2 => assert_eq!(pixel, [0.0, 1.0]),
                _ => assert_eq!(pixel, [0.0, 0.0]),
            }
        }
    }

    #[test]
    fn dataset_loads_pairs_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (image, mask) = write_pair(dir.path(), "sample", 40, 24);
        let config = PreprocessConfig::new().with_image_size(16);

        let dataset = SegmentationDataset::new(vec![image], vec![mask], config).unwrap();
        let item = dataset.get(0).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!((item.height, item.width, item.mask_channels), (16, 16, 2));
        assert_eq!(item.image.len(), 16 * 16 * 3);
        assert_eq!(item.mask.len(), 16 * 16 * 2);
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn unreadable_files_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let dataset =
            SegmentationDataset::new(vec![missing.clone()], vec![missing], PreprocessConfig::new())
                .unwrap();

        assert!(dataset.get(0).is_none());
        assert!(matches!(
            load_image(dir.path().join("missing.png"), &PreprocessConfig::new()),
            Err(DatasetError::ImageOpenFailed { .. })
        ));
    }

    #[test]
    fn dataset_rejects_unpaired_lists() {
        let result = SegmentationDataset::new(
            vec![PathBuf::from("images/a.jpg"), PathBuf::from("images/b.jpg")],
            vec![PathBuf::from("masks/a.png")],
            PreprocessConfig::new(),
        );

        match result {
            Err(DatasetError::CountMismatch {
                image_dir,
                mask_dir,
                images,
                masks,
            }) => {
                assert_eq!(image_dir, PathBuf::from("images"));
                assert_eq!(mask_dir, PathBuf::from("masks"));
                assert_eq!((images, masks), (2, 1));
            }
            Err(other) => panic!("Expected CountMismatch error, got {other:?}"),
            Ok(_) => panic!("Expected CountMismatch error"),
        }
    }

    #[test]
    fn shuffled_dataset_is_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let (images, masks): (Vec<_>, Vec<_>) = (0..6)
            .map(|i| write_pair(dir.path(), &format!("s{i}"), 8 + i, 8))
            .unzip();
        let config = PreprocessConfig::new().with_image_size(8);

        let shuffled = shuffle_map_data(images, masks, config, 7).unwrap();

        assert_eq!(shuffled.len(), 6);
        // Source widths differ, so the red channel sum identifies each item.
        let means: HashSet<u32> = (0..shuffled.len())
            .map(|i| {
                let item = shuffled.get(i).unwrap();
                let red: f32 = item.image.iter().step_by(3).sum();
                (red * 1000.0) as u32
            })
            .collect();
        assert_eq!(means.len(), 6);
    }

    #[test]
    fn batcher_stacks_channels_first() {
        let device = Default::default();
        let item = SegmentationItem {
            image: vec![0.5; 8 * 8 * 3],
            mask: vec![1.0; 8 * 8 * 2],
            height: 8,
            width: 8,
            mask_channels: 2,
        };

        let batch = SegmentationBatcher::<TestBackend>::new()
            .batch(vec![item.clone(), item], &device);

        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
        assert_eq!(batch.masks.dims(), [2, 2, 8, 8]);
        assert_eq!(batch.batch_size(), 2);
    }
}
