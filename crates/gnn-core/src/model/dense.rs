//! Fully connected layers and small multi-layer perceptrons.

use crate::GnnError;
use ndarray::{Array2, Axis};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Element-wise (or row-wise, for `Softmax`) output non-linearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Tanh,
    Relu,
    Sigmoid,
    /// Row-wise softmax.
    Softmax,
}

impl Activation {
    pub fn apply(self, mut z: Array2<f32>) -> Array2<f32> {
        match self {
            Self::Linear => {}
            Self::Tanh => z.mapv_inplace(f32::tanh),
            Self::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Self::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Softmax => {
                for mut row in z.axis_iter_mut(Axis(0)) {
                    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    if sum > 0.0 {
                        row.mapv_inplace(|v| v / sum);
                    }
                }
            }
        }
        z
    }
}

/// `activation(x · W + b)`, with `W` of shape (in × out) and `b` of shape (1 × out).
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    weight: Array2<f32>,
    bias: Array2<f32>,
    activation: Activation,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn glorot<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs).max(1) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            weight: Array2::from_shape_fn((inputs, outputs), |_| dist.sample(rng)),
            bias: Array2::zeros((1, outputs)),
            activation,
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let z = x.dot(&self.weight) + &self.bias;
        self.activation.apply(z)
    }

    pub fn inputs(&self) -> usize {
        self.weight.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weight.ncols()
    }
}

/// A stack of dense layers: hidden layers share one activation, the last
/// layer has its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    /// `sizes = [input, hidden..., output]`.
    pub fn new<R: Rng>(
        sizes: &[usize],
        hidden: Activation,
        last: Activation,
        rng: &mut R,
    ) -> Result<Self, GnnError> {
        if sizes.len() < 2 {
            return Err(GnnError::invalid_argument(
                "layers",
                "a network needs an input and an output size",
            ));
        }
        if let Some(zero) = sizes[1..].iter().position(|&s| s == 0) {
            return Err(GnnError::invalid_argument(
                "layers",
                format!("layer {} has no units", zero),
            ));
        }
        let count = sizes.len() - 1;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i + 1 == count { last } else { hidden };
                Dense::glorot(pair[0], pair[1], activation, rng)
            })
            .collect();
        Ok(Self { layers })
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut out = x.to_owned();
        for layer in &self.layers {
            out = layer.forward(&out);
        }
        out
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Dense::inputs)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Dense::outputs)
    }

    /// `[W0, b0, W1, b1, ...]`
    pub fn weights(&self) -> Vec<Array2<f32>> {
        self.layers
            .iter()
            .flat_map(|l| [l.weight.clone(), l.bias.clone()])
            .collect()
    }

    pub fn set_weights(&mut self, tensors: &[Array2<f32>]) -> Result<(), GnnError> {
        if tensors.len() != 2 * self.layers.len() {
            return Err(GnnError::invalid_argument(
                "weights",
                format!(
                    "expected {} tensors, found {}",
                    2 * self.layers.len(),
                    tensors.len()
                ),
            ));
        }
        for (layer, pair) in self.layers.iter().zip(tensors.chunks(2)) {
            for (current, new) in [&layer.weight, &layer.bias].into_iter().zip(pair) {
                if current.dim() != new.dim() {
                    return Err(GnnError::ShapeMismatch {
                        expected: current.dim(),
                        found: new.dim(),
                    });
                }
            }
        }
        for (layer, pair) in self.layers.iter_mut().zip(tensors.chunks(2)) {
            layer.weight.assign(&pair[0]);
            layer.bias.assign(&pair[1]);
        }
        Ok(())
    }
}
