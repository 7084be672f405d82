//! Dice overlap coefficient, as a tensor function and as a training metric.
//!
//! `dice = (2 * |A ∩ B| + eps) / (|A| + |B| + eps)` over flattened tensors.
//! For soft predictions the intersection is the sum of the elementwise
//! product.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{activation::softmax, backend::Backend, ElementConversion, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

/// Smoothing term used when none is given, matching the Keras backend epsilon.
pub const DEFAULT_EPSILON: f32 = 1e-7;

/// Differentiable Dice coefficient over all elements of two equal-shaped tensors.
pub fn dice_score<B: Backend, const D: usize>(
    y_true: Tensor<B, D>,
    y_pred: Tensor<B, D>,
    epsilon: f32,
) -> Tensor<B, 1> {
    let y_true = y_true.flatten::<1>(0, D - 1);
    let y_pred = y_pred.flatten::<1>(0, D - 1);

    let intersection = (y_true.clone() * y_pred.clone()).sum();
    let total = y_true.sum() + y_pred.sum();

    intersection.mul_scalar(2.0).add_scalar(epsilon) / total.add_scalar(epsilon)
}

/// Dice coefficient of two label tensors as a scalar in `[0, 1]`.
///
/// Identical non-empty binary masks score 1, disjoint masks score ~0 and two
/// empty masks score 1.
pub fn dice_coefficient<B: Backend, const D: usize>(
    y_true: Tensor<B, D>,
    y_pred: Tensor<B, D>,
    epsilon: f32,
) -> f32 {
    dice_score(y_true, y_pred, epsilon).into_scalar().elem::<f32>()
}

pub struct DiceInput<B: Backend> {
    /// Logits or probabilities with shape `[N, C, H, W]`.
    pub predictions: Tensor<B, 4>,
    /// One-hot targets with shape `[N, C, H, W]`.
    pub targets: Tensor<B, 4>,
}

impl<B: Backend> DiceInput<B> {
    pub const fn new(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Self {
        Self {
            predictions,
            targets,
        }
    }
}

#[derive(Config, Debug)]
pub struct DiceMetricConfig {
    /// Treat predictions as logits and apply a channel softmax first.
    #[config(default = true)]
    pub apply_softmax: bool,
    #[config(default = "DEFAULT_EPSILON")]
    pub epsilon: f32,
}

impl DiceMetricConfig {
    pub fn init<B: Backend>(&self) -> DiceMetric<B> {
        DiceMetric {
            state: NumericMetricState::default(),
            apply_softmax: self.apply_softmax,
            epsilon: self.epsilon,
            _b: PhantomData,
        }
    }
}

/// Dice coefficient of the latest batch.
pub struct DiceMetric<B: Backend> {
    state: NumericMetricState,
    apply_softmax: bool,
    epsilon: f32,
    _b: PhantomData<B>,
}

impl<B: Backend> Default for DiceMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DiceMetric<B> {
    pub fn new() -> Self {
        DiceMetricConfig::new().init()
    }
}

impl<B: Backend> Metric for DiceMetric<B> {
    type Input = DiceInput<B>;

    fn name(&self) -> String {
        "Dice".to_owned()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, ..] = item.predictions.dims();
        let predictions = if self.apply_softmax {
            softmax(item.predictions.clone(), 1)
        } else {
            item.predictions.clone()
        };
        let value = dice_coefficient(item.targets.clone(), predictions, self.epsilon);

        self.state.update(
            f64::from(value),
            batch_size,
            FormatOptions::new(self.name()).precision(5),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for DiceMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
