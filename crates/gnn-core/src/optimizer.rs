//! # Optimizers
//!
//! Gradient-descent rules applied to `ModelWeights`.
//!
//! Optimizer state (momentum buffers, moment estimates) is allocated lazily on
//! the first step, shaped like the weights it is applied to.

use crate::GnnError;
use crate::model::ModelWeights;
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// A stateful gradient-descent rule.
pub trait Optimizer: std::fmt::Debug {
    /// `weights <- weights - update(gradients)`.
    fn apply_gradients(
        &mut self,
        weights: &mut ModelWeights,
        gradients: &ModelWeights,
    ) -> Result<(), GnnError>;

    /// Same hyper-parameters, empty state.
    fn fresh(&self) -> Box<dyn Optimizer>;

    fn learning_rate(&self) -> f32;
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Serializable optimizer selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    Sgd {
        learning_rate: f32,
        #[serde(default)]
        momentum: f32,
    },
    Adam {
        learning_rate: f32,
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-7
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            learning_rate: 0.001,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Result<Box<dyn Optimizer>, GnnError> {
        match *self {
            Self::Sgd {
                learning_rate,
                momentum,
            } => Ok(Box::new(Sgd::new(learning_rate, momentum)?)),
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Ok(Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)?)),
        }
    }
}

fn check_rate(parameter: &'static str, value: f32, upper: f32) -> Result<(), GnnError> {
    if value.is_finite() && (0.0..upper).contains(&value) {
        Ok(())
    } else {
        Err(GnnError::invalid_argument(
            parameter,
            format!("{} not in [0, {})", value, upper),
        ))
    }
}

// =============================================================================
// SGD
// =============================================================================

/// Stochastic gradient descent with classical momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    velocity: Option<ModelWeights>,
}

impl Sgd {
    pub fn new(learning_rate: f32, momentum: f32) -> Result<Self, GnnError> {
        check_rate("learning_rate", learning_rate, f32::INFINITY)?;
        check_rate("momentum", momentum, 1.0)?;
        Ok(Self {
            learning_rate,
            momentum,
            velocity: None,
        })
    }
}

impl Optimizer for Sgd {
    fn apply_gradients(
        &mut self,
        weights: &mut ModelWeights,
        gradients: &ModelWeights,
    ) -> Result<(), GnnError> {
        weights.check_compatible(gradients)?;
        let velocity = self.velocity.get_or_insert_with(|| weights.zeros_like());
        velocity.check_compatible(weights)?;

        let (lr, momentum) = (self.learning_rate, self.momentum);
        for ((w, g), v) in weights
            .tensors_mut()
            .zip(gradients.tensors())
            .zip(velocity.tensors_mut())
        {
            Zip::from(w).and(g).and(v).for_each(|w, &g, v| {
                *v = momentum * *v - lr * g;
                *w += *v;
            });
        }
        Ok(())
    }

    fn fresh(&self) -> Box<dyn Optimizer> {
        Box::new(Self {
            velocity: None,
            ..self.clone()
        })
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

// =============================================================================
// ADAM
// =============================================================================

/// Adam with bias-corrected moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    moments: Option<(ModelWeights, ModelWeights)>,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Result<Self, GnnError> {
        check_rate("learning_rate", learning_rate, f32::INFINITY)?;
        check_rate("beta1", beta1, 1.0)?;
        check_rate("beta2", beta2, 1.0)?;
        check_rate("epsilon", epsilon, f32::INFINITY)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            step: 0,
            moments: None,
        })
    }
}

impl Optimizer for Adam {
    fn apply_gradients(
        &mut self,
        weights: &mut ModelWeights,
        gradients: &ModelWeights,
    ) -> Result<(), GnnError> {
        weights.check_compatible(gradients)?;
        let (m, v) = self
            .moments
            .get_or_insert_with(|| (weights.zeros_like(), weights.zeros_like()));
        m.check_compatible(weights)?;

        self.step = self.step.saturating_add(1);
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - b1.powi(self.step);
        let correction2 = 1.0 - b2.powi(self.step);
        let step_size = self.learning_rate * correction2.sqrt() / correction1;

        for (((w, g), m), v) in weights
            .tensors_mut()
            .zip(gradients.tensors())
            .zip(m.tensors_mut())
            .zip(v.tensors_mut())
        {
            Zip::from(w)
                .and(g)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *w -= step_size * *m / (v.sqrt() + eps);
                });
        }
        Ok(())
    }

    fn fresh(&self) -> Box<dyn Optimizer> {
        Box::new(Self {
            step: 0,
            moments: None,
            ..self.clone()
        })
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
