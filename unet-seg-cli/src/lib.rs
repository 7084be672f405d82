//! Command-line front end for `unet-seg`.
//!
//! The `unet-seg` binary splits a directory of image/mask pairs, trains a
//! U-Net on the chosen backend and renders prediction figures from the saved
//! artifacts.
//!
//! ## Features
//!
//! - `ndarray`: CPU backend using ndarray (default)
//! - `wgpu`: GPU backend using WGPU
//! - `cuda`: NVIDIA GPU backend using CUDA

pub mod backend;
pub mod config;
pub mod predict;
pub mod split;
pub mod training;

pub use config::{SplitConfig, TrainingConfig};
