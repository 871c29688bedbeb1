//! # Model Interface
//!
//! The capability a trainable GNN variant exposes to the training engine:
//! state propagation + readout (the loop), weight access and copying.
//!
//! Weights are grouped per network. Each network is a flat list of tensors in
//! layer order, `[W0, b0, W1, b1, ...]`.

pub mod dense;
pub mod gnn;

pub use dense::{Activation, Dense, Mlp};
pub use gnn::{Gnn, GnnConfig};

use crate::graph::GraphObject;
use crate::primitives::DEFAULT_FD_EPSILON;
use crate::{GnnError, ProblemBased};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

// =============================================================================
// LOOP OUTPUT
// =============================================================================

/// Result of running the state propagation and readout on one graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutput {
    /// Number of state updates performed before convergence or the cap.
    pub iterations: usize,
    /// Converged node states (nodes × state dim).
    pub state: Array2<f32>,
    /// One output row per targeted entity of the graph's current split.
    pub output: Array2<f32>,
}

// =============================================================================
// WEIGHTS
// =============================================================================

/// Weights of the state network and the output network.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelWeights {
    pub state: Vec<Array2<f32>>,
    pub output: Vec<Array2<f32>>,
}

impl ModelWeights {
    /// Total number of scalar parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.tensors().map(Array2::len).sum()
    }

    /// Same shapes, all zeros.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        let zeros = |ts: &[Array2<f32>]| ts.iter().map(|t| Array2::zeros(t.dim())).collect();
        Self {
            state: zeros(&self.state),
            output: zeros(&self.output),
        }
    }

    /// Every tensor, state network first.
    pub fn tensors(&self) -> impl Iterator<Item = &Array2<f32>> {
        self.state.iter().chain(&self.output)
    }

    pub fn tensors_mut(&mut self) -> impl Iterator<Item = &mut Array2<f32>> {
        self.state.iter_mut().chain(self.output.iter_mut())
    }

    /// All parameters in tensor order, each tensor row-major.
    #[must_use]
    pub fn flatten(&self) -> Vec<f32> {
        self.tensors().flat_map(|t| t.iter().copied()).collect()
    }

    /// Overwrite every parameter from a flat vector produced by `flatten`.
    pub fn assign_flat(&mut self, values: &[f32]) -> Result<(), GnnError> {
        if values.len() != self.parameter_count() {
            return Err(GnnError::ShapeMismatch {
                expected: (self.parameter_count(), 1),
                found: (values.len(), 1),
            });
        }
        let mut cursor = 0;
        for tensor in self.tensors_mut() {
            for v in tensor.iter_mut() {
                *v = values[cursor];
                cursor += 1;
            }
        }
        Ok(())
    }

    /// Check that `other` has exactly the same tensor shapes.
    pub fn check_compatible(&self, other: &Self) -> Result<(), GnnError> {
        if self.state.len() != other.state.len() || self.output.len() != other.output.len() {
            return Err(GnnError::InvalidArgument {
                parameter: "weights",
                reason: format!(
                    "expected {}+{} tensors, found {}+{}",
                    self.state.len(),
                    self.output.len(),
                    other.state.len(),
                    other.output.len()
                ),
            });
        }
        for (a, b) in self.tensors().zip(other.tensors()) {
            if a.dim() != b.dim() {
                return Err(GnnError::ShapeMismatch {
                    expected: a.dim(),
                    found: b.dim(),
                });
            }
        }
        Ok(())
    }

    /// True when no parameter is NaN or infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.tensors().all(|t| t.iter().all(|v| v.is_finite()))
    }
}

/// Loss gradients for one training step.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weights: ModelWeights,
    /// Iterations the loop needed at the weights the gradients were taken at.
    pub iterations: usize,
}

// =============================================================================
// MODEL TRAIT
// =============================================================================

/// A trainable GNN variant.
///
/// The training engine only talks to models through this trait, so node-,
/// arc- and graph-based variants (or entirely different architectures) plug in
/// without changes to the engine.
pub trait GnnModel: std::fmt::Debug {
    /// Target granularity this model produces outputs for.
    fn problem_based(&self) -> ProblemBased;

    /// State propagation until convergence followed by the readout.
    fn propagate(&self, graph: &GraphObject) -> Result<LoopOutput, GnnError>;

    /// Snapshot of the current weights.
    fn weights(&self) -> ModelWeights;

    /// Replace the weights; shapes must match the current ones.
    fn set_weights(&mut self, weights: &ModelWeights) -> Result<(), GnnError>;

    fn parameter_count(&self) -> usize {
        self.weights().parameter_count()
    }

    /// Deep copy; with `copy_weights = false` the weights are re-initialised.
    fn copy_model(&self, copy_weights: bool) -> Result<Self, GnnError>
    where
        Self: Sized;

    /// Gradient of `objective` with respect to every weight.
    ///
    /// Computed by central finite differences around the current weights,
    /// which are restored before returning. Models with analytic gradients
    /// should override this.
    fn gradients(
        &mut self,
        graph: &GraphObject,
        objective: &dyn Fn(&LoopOutput) -> Result<f32, GnnError>,
    ) -> Result<Gradients, GnnError> {
        let base = self.weights();
        let iterations = self.propagate(graph)?.iterations;

        let mut flat = base.flatten();
        let mut grads = vec![0.0; flat.len()];
        let mut probe = base.clone();
        for i in 0..flat.len() {
            let original = flat[i];

            flat[i] = original + DEFAULT_FD_EPSILON;
            probe.assign_flat(&flat)?;
            self.set_weights(&probe)?;
            let up = objective(&self.propagate(graph)?)?;

            flat[i] = original - DEFAULT_FD_EPSILON;
            probe.assign_flat(&flat)?;
            self.set_weights(&probe)?;
            let down = objective(&self.propagate(graph)?)?;

            flat[i] = original;
            grads[i] = (up - down) / (2.0 * DEFAULT_FD_EPSILON);
        }
        self.set_weights(&base)?;

        let mut weights = base;
        weights.assign_flat(&grads)?;
        Ok(Gradients {
            weights,
            iterations,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn weights() -> ModelWeights {
        ModelWeights {
            state: vec![array![[1.0, 2.0]], array![[3.0]]],
            output: vec![array![[4.0], [5.0]]],
        }
    }

    #[test]
    fn flatten_then_assign_is_identity() {
        let w = weights();
        let mut copy = w.zeros_like();
        copy.assign_flat(&w.flatten()).expect("assign");
        assert_eq!(copy, w);
        assert_eq!(w.parameter_count(), 5);
    }

    #[test]
    fn assign_rejects_wrong_length() {
        let mut w = weights();
        assert!(w.assign_flat(&[1.0]).is_err());
    }

    #[test]
    fn incompatible_shapes_detected() {
        let w = weights();
        let mut other = w.clone();
        other.output[0] = Array2::zeros((1, 2));
        assert!(w.check_compatible(&other).is_err());
        assert!(w.check_compatible(&w.zeros_like()).is_ok());
    }

    #[test]
    fn non_finite_detected() {
        let mut w = weights();
        assert!(w.is_finite());
        w.state[1][[0, 0]] = f32::NAN;
        assert!(!w.is_finite());
    }
}
