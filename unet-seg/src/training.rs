//! Training and validation step outputs.
//!
//! Implements the adaptors that let Burn's learner feed the step output into
//! the loss and Dice metrics.

use burn::{
    prelude::*,
    tensor::{backend::Backend, Transaction},
    train::metric::{Adaptor, ItemLazy, LossInput},
};

use crate::metrics::DiceInput;

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// Class logits with shape `[N, C, H, W]`.
    pub output: Tensor<B, 4>,
    /// One-hot targets with shape `[N, C, H, W]`.
    pub targets: Tensor<B, 4>,
}

impl<B: Backend> SegmentationOutput<B> {
    pub const fn new(loss: Tensor<B, 1>, output: Tensor<B, 4>, targets: Tensor<B, 4>) -> Self {
        Self {
            loss,
            output,
            targets,
        }
    }
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        let device = self.output.device();
        let [loss, output, targets] = Transaction::default()
            .register(self.loss)
            .register(self.output)
            .register(self.targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        Self {
            loss: Tensor::from_data(loss, &device),
            output: Tensor::from_data(output, &device),
            targets: Tensor::from_data(targets, &device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<DiceInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> DiceInput<B> {
        DiceInput::new(self.output.clone(), self.targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn adaptors_forward_the_step_tensors() {
        let device = Default::default();
        let output =
            Tensor::<TestBackend, 4>::random([2, 2, 8, 8], Distribution::Default, &device);
        let targets = Tensor::<TestBackend, 4>::zeros([2, 2, 8, 8], &device);
        let loss = Tensor::<TestBackend, 1>::from_floats([0.25], &device);

        let item = SegmentationOutput::new(loss, output, targets);

        let dice: DiceInput<TestBackend> = item.adapt();
        assert_eq!(dice.predictions.dims(), [2, 2, 8, 8]);
        assert_eq!(dice.targets.dims(), [2, 2, 8, 8]);

        let _loss: LossInput<TestBackend> = item.adapt();
    }

    #[test]
    fn sync_preserves_values() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 4>::ones([1, 2, 4, 4], &device);
        let targets = Tensor::<TestBackend, 4>::zeros([1, 2, 4, 4], &device);
        let loss = Tensor::<TestBackend, 1>::from_floats([1.5], &device);

        let synced = SegmentationOutput::new(loss, output, targets).sync();

        assert!((synced.loss.into_scalar() - 1.5).abs() < 1e-6);
        assert!((synced.output.sum().into_scalar() - 32.0).abs() < 1e-6);
        assert_eq!(synced.targets.dims(), [1, 2, 4, 4]);
    }
}
