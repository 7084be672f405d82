pub mod blocks;
pub mod unet;

pub use blocks::{ConvBlock, ConvBlockConfig, UpBlock, UpBlockConfig};
pub use unet::{UNet, UNetConfig, UNetRecord, DEPTH, SIZE_DIVISOR};
