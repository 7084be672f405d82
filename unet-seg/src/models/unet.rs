//! Five-level U-Net encoder-decoder for pixel-wise segmentation.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
    train::{TrainOutput, TrainStep, ValidStep},
};

use super::blocks::{ConvBlock, ConvBlockConfig, UpBlock, UpBlockConfig};
use crate::{
    dataset::SegmentationBatch,
    error::{UNetError, UNetResult},
    losses::{SegmentationLoss, SegmentationLossConfig},
    training::SegmentationOutput,
};

/// Number of encoder levels, including the bottleneck.
pub const DEPTH: usize = 5;

/// Input height and width must be divisible by this (one halving per pool).
pub const SIZE_DIVISOR: usize = 1 << (DEPTH - 1);

/// Configuration to create a [`UNet`].
#[derive(Config, Debug)]
pub struct UNetConfig {
    /// Number of classes predicted per pixel.
    pub output_channels: usize,
    /// Width of the first encoder level; level `i` uses `filters * 2^i`.
    #[config(default = 64)]
    pub filters: usize,
    #[config(default = 3)]
    pub input_channels: usize,
    #[config(default = "SegmentationLossConfig::new()")]
    pub loss: SegmentationLossConfig,
}

impl UNetConfig {
    /// Channel width of each encoder level, shallowest first.
    pub fn level_channels(&self) -> [usize; DEPTH] {
        core::array::from_fn(|level| self.filters << level)
    }

    /// Checks the configuration describes a buildable network.
    ///
    /// # Errors
    ///
    /// Returns [`UNetError::InvalidConfiguration`] if any channel count is zero.
    pub fn validate(&self) -> UNetResult<()> {
        for (name, value) in [
            ("output_channels", self.output_channels),
            ("filters", self.filters),
            ("input_channels", self.input_channels),
        ] {
            if value == 0 {
                return Err(UNetError::InvalidConfiguration {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }
        Ok(())
    }

    /// Initializes a model with randomly initialized weights.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UNetResult<UNet<B>> {
        self.validate()?;
        let channels = self.level_channels();

        let encoder = (0..DEPTH)
            .map(|level| {
                let in_channels = if level == 0 {
                    self.input_channels
                } else {
                    channels[level - 1]
                };
                ConvBlockConfig::new(in_channels, channels[level]).init(device)
            })
            .collect();

        // Deepest stage first, mirroring the order they run in.
        let decoder = (0..DEPTH - 1)
            .rev()
            .map(|level| {
                UpBlockConfig::new(channels[level + 1], channels[level], channels[level])
                    .init(device)
            })
            .collect();

        let head = Conv2dConfig::new([channels[0], self.output_channels], [1, 1]).init(device);

        Ok(UNet {
            encoder,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            decoder,
            head,
            loss: self.loss.init(),
            input_channels: self.input_channels,
        })
    }
}

/// U-Net with a fixed five-level encoder and four-level decoder.
///
/// `forward` returns per-pixel class logits with shape
/// `[batch, output_channels, height, width]`.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoder: Vec<ConvBlock<B>>,
    pool: MaxPool2d,
    decoder: Vec<UpBlock<B>>,
    head: Conv2d<B>,
    loss: SegmentationLoss,
    input_channels: usize,
}

impl<B: Backend> UNet<B> {
    /// Checks that `x` is `[N, input_channels, H, W]` with `H` and `W`
    /// divisible by [`SIZE_DIVISOR`].
    ///
    /// # Errors
    ///
    /// Returns [`UNetError::InvalidTensorShape`] otherwise.
    pub fn check_input(&self, x: &Tensor<B, 4>) -> UNetResult<()> {
        let [_, channels, height, width] = x.dims();
        if channels != self.input_channels
            || height % SIZE_DIVISOR != 0
            || width % SIZE_DIVISOR != 0
        {
            return Err(UNetError::InvalidTensorShape {
                expected: format!(
                    "[N, {}, H, W] with H and W divisible by {SIZE_DIVISOR}",
                    self.input_channels
                ),
                actual: format!("{:?}", x.dims()),
            });
        }
        Ok(())
    }

    /// Computes class logits without validating the input shape.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(DEPTH - 1);
        let mut x = x;
        for (level, block) in self.encoder.iter().enumerate() {
            if level > 0 {
                x = self.pool.forward(x);
            }
            x = block.forward(x);
            if level < DEPTH - 1 {
                skips.push(x.clone());
            }
        }

        for (block, skip) in self.decoder.iter().zip(skips.into_iter().rev()) {
            x = block.forward(x, skip);
        }

        self.head.forward(x)
    }

    /// Validates the input shape, then computes class logits.
    ///
    /// # Errors
    ///
    /// Fails if [`UNet::check_input`] rejects `x`.
    pub fn try_forward(&self, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        self.check_input(&x)?;
        Ok(self.forward(x))
    }

    /// Per-pixel class probabilities (softmax over the channel axis).
    pub fn forward_probabilities(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.forward(x), 1)
    }

    /// Most likely class per pixel, with shape `[N, 1, H, W]`.
    pub fn predict_mask(&self, x: Tensor<B, 4>) -> Tensor<B, 4, Int> {
        self.forward(x).argmax(1)
    }

    /// Runs the model on a batch and computes the segmentation loss.
    pub fn forward_segmentation(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let output = self.forward(batch.images);
        let loss = self.loss.forward(output.clone(), batch.masks.clone());
        SegmentationOutput::new(loss, output, batch.masks)
    }
}

impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::{TestAutodiffBackend, TestBackend};

    fn small_config() -> UNetConfig {
        UNetConfig::new(2).with_filters(2)
    }

    #[test]
    fn level_channels_double_per_level() {
        assert_eq!(UNetConfig::new(2).level_channels(), [64, 128, 256, 512, 1024]);
        assert_eq!(small_config().level_channels(), [2, 4, 8, 16, 32]);
    }

    #[test]
    fn forward_keeps_spatial_size() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random([2, 3, 32, 48], Distribution::Default, &device);

        assert_eq!(model.forward(x).dims(), [2, 2, 32, 48]);
    }

    #[test]
    fn probabilities_sum_to_one_per_pixel() {
        let device = Default::default();
        let model = UNetConfig::new(3)
            .with_filters(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);

        let sums = model.forward_probabilities(x).sum_dim(1);

        assert_eq!(sums.dims(), [1, 1, 16, 16]);
        let max_error = sums.sub_scalar(1.0).abs().max().into_scalar();
        assert!(max_error < 1e-5);
    }

    #[test]
    fn predict_mask_returns_class_indices() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);

        let mask = model.predict_mask(x);

        assert_eq!(mask.dims(), [1, 1, 16, 16]);
        let values = mask.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert!(values.iter().all(|&v| v == 0 || v == 1));
    }

    #[test]
    fn check_input_rejects_indivisible_sizes() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let bad = Tensor::<TestBackend, 4>::zeros([1, 3, 30, 32], &device);
        assert!(matches!(
            model.try_forward(bad),
            Err(UNetError::InvalidTensorShape { .. })
        ));

        let wrong_channels = Tensor::<TestBackend, 4>::zeros([1, 1, 32, 32], &device);
        assert!(model.check_input(&wrong_channels).is_err());

        let good = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert!(model.try_forward(good).is_ok());
    }

    #[test]
    fn zero_channels_are_rejected() {
        match UNetConfig::new(0).validate() {
            Err(UNetError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("output_channels"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
        assert!(UNetConfig::new(2).with_filters(0).validate().is_err());
    }

    #[test]
    fn train_step_produces_finite_loss() {
        let device = Default::default();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let images =
            Tensor::<TestAutodiffBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        let foreground = Tensor::<TestAutodiffBackend, 4>::random(
            [2, 1, 16, 16],
            Distribution::Bernoulli(0.5),
            &device,
        );
        let masks = Tensor::cat(vec![foreground.clone().neg().add_scalar(1.0), foreground], 1);

        let output = TrainStep::step(&model, SegmentationBatch::new(images, masks));

        assert!(output.item.loss.into_scalar().is_finite());
        assert_eq!(output.item.output.dims(), [2, 2, 16, 16]);
        assert_eq!(output.item.targets.dims(), [2, 2, 16, 16]);
    }

    #[test]
    fn valid_step_matches_forward_shape() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 16], &device);
        let masks = Tensor::<TestBackend, 4>::zeros([1, 2, 16, 16], &device);

        let output = ValidStep::step(&model, SegmentationBatch::new(images, masks));

        assert_eq!(output.output.dims(), [1, 2, 16, 16]);
        assert!(output.loss.into_scalar().is_finite());
    }
}
