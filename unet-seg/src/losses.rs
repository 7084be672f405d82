//! Training loss for one-hot segmentation targets.

use burn::{
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

use crate::metrics::{dice_score, DEFAULT_EPSILON};

/// Weights of the loss terms.
///
/// The default is plain categorical cross-entropy over the channel axis.
#[derive(Config, Debug)]
pub struct SegmentationLossConfig {
    #[config(default = 1.0)]
    pub cross_entropy_weight: f32,
    /// Weight of the soft Dice loss `1 - dice(softmax(logits), targets)`.
    #[config(default = 0.0)]
    pub dice_weight: f32,
    #[config(default = "DEFAULT_EPSILON")]
    pub epsilon: f32,
}

impl SegmentationLossConfig {
    pub fn init(&self) -> SegmentationLoss {
        SegmentationLoss {
            cross_entropy_weight: self.cross_entropy_weight,
            dice_weight: self.dice_weight,
            epsilon: self.epsilon,
        }
    }
}

#[derive(Module, Clone, Debug)]
pub struct SegmentationLoss {
    cross_entropy_weight: f32,
    dice_weight: f32,
    epsilon: f32,
}

impl SegmentationLoss {
    /// Computes the weighted loss.
    ///
    /// `logits` and `targets` are `[N, C, H, W]`; `targets` is one-hot over `C`.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let device = logits.device();
        let mut loss = Tensor::<B, 1>::zeros([1], &device);

        if self.cross_entropy_weight != 0.0 {
            let cross_entropy = (targets.clone() * log_softmax(logits.clone(), 1))
                .sum_dim(1)
                .neg()
                .mean();
            loss = loss + cross_entropy.mul_scalar(self.cross_entropy_weight);
        }

        if self.dice_weight != 0.0 {
            let dice = dice_score(targets, softmax(logits, 1), self.epsilon);
            loss = loss + dice.neg().add_scalar(1.0).mul_scalar(self.dice_weight);
        }

        loss
    }
}
