//! # Loss Functions
//!
//! Per-example losses between targets and model outputs, optionally
//! re-weighted by `ClassWeights`.

use crate::primitives::PROBABILITY_EPSILON;
use crate::{AddressedProblem, ClassWeights, GnnError};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Supported losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    /// `-Σ t·ln(p)` on probabilities clipped to `[ε, 1-ε]`.
    #[default]
    CategoricalCrossentropy,
    MeanSquaredError,
    MeanAbsoluteError,
}

impl LossFunction {
    /// One loss value per row.
    pub fn per_example(
        self,
        targets: &Array2<f32>,
        outputs: &Array2<f32>,
    ) -> Result<Array1<f32>, GnnError> {
        if targets.dim() != outputs.dim() {
            return Err(GnnError::ShapeMismatch {
                expected: targets.dim(),
                found: outputs.dim(),
            });
        }
        let losses = targets
            .outer_iter()
            .zip(outputs.outer_iter())
            .map(|(t, p)| self.row_loss(t, p))
            .collect();
        Ok(losses)
    }

    fn row_loss(self, target: ArrayView1<'_, f32>, output: ArrayView1<'_, f32>) -> f32 {
        let width = target.len().max(1) as f32;
        match self {
            Self::CategoricalCrossentropy => -target
                .iter()
                .zip(output)
                .map(|(&t, &p)| t * p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON).ln())
                .sum::<f32>(),
            Self::MeanSquaredError => {
                target
                    .iter()
                    .zip(output)
                    .map(|(&t, &p)| (t - p) * (t - p))
                    .sum::<f32>()
                    / width
            }
            Self::MeanAbsoluteError => {
                target
                    .iter()
                    .zip(output)
                    .map(|(&t, &p)| (t - p).abs())
                    .sum::<f32>()
                    / width
            }
        }
    }

    /// Per-example losses scaled by the class weights.
    pub fn weighted(
        self,
        targets: &Array2<f32>,
        outputs: &Array2<f32>,
        class_weights: &ClassWeights,
        addressed_problem: AddressedProblem,
    ) -> Result<Array1<f32>, GnnError> {
        let losses = self.per_example(targets, outputs)?;
        Ok(losses * &example_weights(targets, class_weights, addressed_problem)?)
    }
}

/// The weight of every target row.
pub fn example_weights(
    targets: &Array2<f32>,
    class_weights: &ClassWeights,
    addressed_problem: AddressedProblem,
) -> Result<Array1<f32>, GnnError> {
    match class_weights {
        ClassWeights::Uniform(w) => Ok(Array1::from_elem(targets.nrows(), *w)),
        ClassWeights::PerClass(_) if addressed_problem == AddressedProblem::Regression => Err(
            GnnError::invalid_argument("class_weights", "per-class weights need classification"),
        ),
        ClassWeights::PerClass(weights) => {
            if weights.len() != targets.ncols() {
                return Err(GnnError::invalid_argument(
                    "class_weights",
                    format!(
                        "{} weights for {} classes",
                        weights.len(),
                        targets.ncols()
                    ),
                ));
            }
            Ok(argmax_rows(targets).mapv(|c| weights[c]))
        }
    }
}

/// Index of the largest value of every row (first one on ties).
pub fn argmax_rows(values: &Array2<f32>) -> Array1<usize> {
    values
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cross_entropy_of_confident_correct_is_small() {
        let t = array![[1.0, 0.0], [0.0, 1.0]];
        let p = array![[0.999, 0.001], [0.5, 0.5]];
        let l = LossFunction::CategoricalCrossentropy
            .per_example(&t, &p)
            .expect("loss");
        assert!(l[0] < 0.01);
        assert!((l[1] - 2.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn cross_entropy_clips_zero_probability() {
        let l = LossFunction::CategoricalCrossentropy
            .per_example(&array![[1.0, 0.0]], &array![[0.0, 1.0]])
            .expect("loss");
        assert!(l[0].is_finite());
    }

    #[test]
    fn mse_and_mae_average_columns() {
        let t = array![[1.0, 3.0]];
        let p = array![[0.0, 1.0]];
        assert_eq!(
            LossFunction::MeanSquaredError.per_example(&t, &p).expect("mse")[0],
            2.5
        );
        assert_eq!(
            LossFunction::MeanAbsoluteError.per_example(&t, &p).expect("mae")[0],
            1.5
        );
    }

    #[test]
    fn shape_mismatch_rejected() {
        let result =
            LossFunction::MeanSquaredError.per_example(&array![[1.0]], &array![[1.0, 2.0]]);
        assert!(matches!(result, Err(GnnError::ShapeMismatch { .. })));
    }

    #[test]
    fn per_class_weights_follow_target_class() {
        let t = array![[1.0, 0.0], [0.0, 1.0]];
        let w = example_weights(
            &t,
            &ClassWeights::PerClass(vec![1.0, 3.0]),
            AddressedProblem::Classification,
        )
        .expect("weights");
        assert_eq!(w, array![1.0, 3.0]);
    }

    #[test]
    fn per_class_weights_checked() {
        let t = array![[1.0, 0.0]];
        assert!(example_weights(&t, &ClassWeights::PerClass(vec![1.0]), AddressedProblem::Classification).is_err());
        assert!(example_weights(&t, &ClassWeights::PerClass(vec![1.0, 1.0]), AddressedProblem::Regression).is_err());
    }

    #[test]
    fn argmax_takes_first_on_ties() {
        assert_eq!(argmax_rows(&array![[0.5, 0.5], [0.1, 0.9]]), array![0, 1]);
    }
}
