use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Two 3x3 "same" convolutions, each followed by ReLU.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
}

impl ConvBlockConfig {
    /// Initializes a `ConvBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBlock<B> {
        let conv1 = Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let conv2 = Conv2dConfig::new([self.out_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        ConvBlock {
            conv1,
            conv2,
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(x));
        self.relu.forward(self.conv2.forward(x))
    }
}

/// Decoder stage: nearest-neighbour upsampling to the skip resolution,
/// channel concatenation with the skip, then a [`ConvBlock`].
#[derive(Config, Debug)]
pub struct UpBlockConfig {
    /// Channels coming up from the deeper stage.
    in_channels: usize,
    /// Channels of the encoder skip connection.
    skip_channels: usize,
    out_channels: usize,
}

impl UpBlockConfig {
    /// Initializes an `UpBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UpBlock<B> {
        UpBlock {
            convs: ConvBlockConfig::new(self.in_channels + self.skip_channels, self.out_channels)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    convs: ConvBlock<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, h, w] = skip.dims();
        let x = interpolate(x, [h, w], InterpolateOptions::new(InterpolateMode::Nearest));
        self.convs.forward(Tensor::cat(vec![x, skip], 1))
    }
}
