use burn::prelude::*;
use image::imageops::FilterType;

use crate::error::{DatasetError, DatasetResult};

/// Resampling filter used when resizing images and masks.
#[derive(Config, Debug, PartialEq)]
pub enum ResizeFilter {
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(&self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How raw image/mask files are turned into network inputs and targets.
#[derive(Config, Debug)]
pub struct PreprocessConfig {
    /// Side length of the square output, in pixels.
    #[config(default = 512)]
    pub image_size: u32,
    /// Mask intensities mapped to output channels, in channel order.
    ///
    /// With the default, channel 0 marks background (0) and channel 1
    /// marks foreground (255).
    #[config(default = "vec![0, 255]")]
    pub mask_values: Vec<u8>,
    #[config(default = "ResizeFilter::Triangle")]
    pub image_filter: ResizeFilter,
    #[config(default = "ResizeFilter::Triangle")]
    pub mask_filter: ResizeFilter,
}

impl PreprocessConfig {
    /// Number of channels produced by mask thresholding.
    pub fn mask_channels(&self) -> usize {
        self.mask_values.len()
    }

    /// Checks the configuration can produce non-empty tensors.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidConfiguration`] for a zero image size
    /// or an empty list of mask values.
    pub fn validate(&self) -> DatasetResult<()> {
        if self.image_size == 0 {
            return Err(DatasetError::InvalidConfiguration {
                reason: "image_size must be greater than 0".to_owned(),
            });
        }
        if self.mask_values.is_empty() {
            return Err(DatasetError::InvalidConfiguration {
                reason: "mask_values must name at least one intensity".to_owned(),
            });
        }
        Ok(())
    }
}
