//! # Reference GNN
//!
//! The classic state-propagation GNN.
//!
//! ## State network
//!
//! For every arc `i: u -> v` a message is computed from
//! `[x_u | l_u | l_(u,v) | l_v]` (source state, source label, arc label,
//! destination label) by a tanh MLP. The new state of every node is the
//! `ArcNode`-weighted aggregation of its incoming messages:
//!
//! ```text
//! x(t+1) = ArcNodeᵀ · f_w(messages(x(t)))
//! ```
//!
//! Iteration starts from zero states and stops when the largest absolute
//! state change falls below `state_threshold`, or after `max_iteration` steps.
//!
//! ## Output network
//!
//! - node-based: `g_w([x_v | l_v])` for targeted nodes
//! - arc-based: `g_w([x_u | x_v | l_(u,v)])` for targeted arcs
//! - graph-based: `g_w(NodeGraphᵀ · [x | l])`, one row per graph
//!
//! Classification outputs are softmax probabilities, regression outputs are
//! linear.

use super::dense::{Activation, Mlp};
use super::{GnnModel, LoopOutput, ModelWeights};
use crate::graph::GraphObject;
use crate::{AddressedProblem, GnnError, ProblemBased};
use ndarray::{Array2, Axis, concatenate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Architecture and convergence settings of a `Gnn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GnnConfig {
    pub problem_based: ProblemBased,
    pub addressed_problem: AddressedProblem,
    pub dim_node_label: usize,
    pub dim_arc_label: usize,
    pub dim_target: usize,
    pub dim_state: usize,
    /// Hidden layer sizes of the state network.
    pub state_hidden: Vec<usize>,
    /// Hidden layer sizes of the output network.
    pub output_hidden: Vec<usize>,
    /// Convergence threshold on the max-abs state change.
    pub state_threshold: f32,
    pub max_iteration: usize,
    /// Weight initialisation seed; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for GnnConfig {
    fn default() -> Self {
        Self {
            problem_based: ProblemBased::Node,
            addressed_problem: AddressedProblem::Classification,
            dim_node_label: 1,
            dim_arc_label: 0,
            dim_target: 2,
            dim_state: 5,
            state_hidden: vec![10],
            output_hidden: vec![10],
            state_threshold: 0.01,
            max_iteration: 50,
            seed: None,
        }
    }
}

impl GnnConfig {
    /// Label and target dimensions taken from an example graph.
    #[must_use]
    pub fn for_graph(graph: &GraphObject, addressed_problem: AddressedProblem) -> Self {
        Self {
            problem_based: graph.problem_based(),
            addressed_problem,
            dim_node_label: graph.dim_node_label(),
            dim_arc_label: graph.dim_arc_label(),
            dim_target: graph.dim_target(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), GnnError> {
        if self.dim_state == 0 {
            return Err(GnnError::invalid_argument("dim_state", "must be positive"));
        }
        if self.dim_target == 0 {
            return Err(GnnError::invalid_argument("dim_target", "must be positive"));
        }
        if self.max_iteration == 0 {
            return Err(GnnError::invalid_argument("max_iteration", "must be positive"));
        }
        if !self.state_threshold.is_finite() || self.state_threshold < 0.0 {
            return Err(GnnError::invalid_argument(
                "state_threshold",
                format!("{} is not a finite non-negative number", self.state_threshold),
            ));
        }
        Ok(())
    }

    fn state_input(&self) -> usize {
        self.dim_state + 2 * self.dim_node_label + self.dim_arc_label
    }

    fn output_input(&self) -> usize {
        match self.problem_based {
            ProblemBased::Node | ProblemBased::Graph => self.dim_state + self.dim_node_label,
            ProblemBased::Arc => 2 * self.dim_state + self.dim_arc_label,
        }
    }
}

/// Reference state-propagation GNN.
#[derive(Debug, Clone, PartialEq)]
pub struct Gnn {
    config: GnnConfig,
    state_net: Mlp,
    output_net: Mlp,
}

impl Gnn {
    pub fn new(config: GnnConfig) -> Result<Self, GnnError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut state_sizes = vec![config.state_input()];
        state_sizes.extend(&config.state_hidden);
        state_sizes.push(config.dim_state);
        let state_net = Mlp::new(&state_sizes, Activation::Tanh, Activation::Tanh, &mut rng)?;

        let mut output_sizes = vec![config.output_input()];
        output_sizes.extend(&config.output_hidden);
        output_sizes.push(config.dim_target);
        let last = match config.addressed_problem {
            AddressedProblem::Classification => Activation::Softmax,
            AddressedProblem::Regression => Activation::Linear,
        };
        let output_net = Mlp::new(&output_sizes, Activation::Tanh, last, &mut rng)?;

        Ok(Self {
            config,
            state_net,
            output_net,
        })
    }

    pub fn config(&self) -> &GnnConfig {
        &self.config
    }

    fn check_graph(&self, graph: &GraphObject) -> Result<(), GnnError> {
        if graph.problem_based() != self.config.problem_based {
            return Err(GnnError::InvalidInput(format!(
                "{}-based model cannot process a {}-based graph",
                self.config.problem_based,
                graph.problem_based()
            )));
        }
        let labels = (graph.dim_node_label(), graph.dim_arc_label());
        let expected = (self.config.dim_node_label, self.config.dim_arc_label);
        if labels != expected {
            return Err(GnnError::InvalidGraph(format!(
                "model expects (node, arc) label dims {:?}, graph has {:?}",
                expected, labels
            )));
        }
        Ok(())
    }

    /// Run the state network to a fixed point.
    fn converge(&self, graph: &GraphObject) -> Result<(usize, Array2<f32>), GnnError> {
        let (sources, targets): (Vec<usize>, Vec<usize>) =
            graph.arc_endpoints().into_iter().unzip();
        let source_labels = graph.nodes().select(Axis(0), &sources);
        let target_labels = graph.nodes().select(Axis(0), &targets);
        let arc_labels = graph.arc_labels();

        let mut state = Array2::zeros((graph.node_count(), self.config.dim_state));
        let mut iterations = 0;
        while iterations < self.config.max_iteration {
            let source_state = state.select(Axis(0), &sources);
            let input = concatenate(
                Axis(1),
                &[
                    source_state.view(),
                    source_labels.view(),
                    arc_labels.view(),
                    target_labels.view(),
                ],
            )?;
            let messages = self.state_net.forward(&input);
            let next = graph.arc_node().transpose_matmul(&messages)?;
            let change = (&next - &state)
                .iter()
                .fold(0.0f32, |acc, v| acc.max(v.abs()));
            state = next;
            iterations += 1;
            if change < self.config.state_threshold {
                break;
            }
        }
        Ok((iterations, state))
    }

    fn read_out(&self, graph: &GraphObject, state: &Array2<f32>) -> Result<Array2<f32>, GnnError> {
        let selected: Vec<usize> = graph
            .set_mask()
            .iter()
            .zip(graph.output_mask())
            .enumerate()
            .filter(|&(_, (&set, &out))| set && out)
            .map(|(i, _)| i)
            .collect();

        let input = match self.config.problem_based {
            ProblemBased::Node => {
                let all = concatenate(Axis(1), &[state.view(), graph.nodes().view()])?;
                all.select(Axis(0), &selected)
            }
            ProblemBased::Arc => {
                let (sources, targets): (Vec<usize>, Vec<usize>) =
                    graph.arc_endpoints().into_iter().unzip();
                let all = concatenate(
                    Axis(1),
                    &[
                        state.select(Axis(0), &sources).view(),
                        state.select(Axis(0), &targets).view(),
                        graph.arc_labels(),
                    ],
                )?;
                all.select(Axis(0), &selected)
            }
            ProblemBased::Graph => {
                let node_graph = graph.node_graph().ok_or_else(|| {
                    GnnError::InvalidGraph("graph-based graph without NodeGraph".to_string())
                })?;
                let all = concatenate(Axis(1), &[state.view(), graph.nodes().view()])?;
                node_graph.transpose_matmul(&all)?
            }
        };
        Ok(self.output_net.forward(&input))
    }
}

impl GnnModel for Gnn {
    fn problem_based(&self) -> ProblemBased {
        self.config.problem_based
    }

    fn propagate(&self, graph: &GraphObject) -> Result<LoopOutput, GnnError> {
        self.check_graph(graph)?;
        let (iterations, state) = self.converge(graph)?;
        let output = self.read_out(graph, &state)?;
        Ok(LoopOutput {
            iterations,
            state,
            output,
        })
    }

    fn weights(&self) -> ModelWeights {
        ModelWeights {
            state: self.state_net.weights(),
            output: self.output_net.weights(),
        }
    }

    fn set_weights(&mut self, weights: &ModelWeights) -> Result<(), GnnError> {
        self.weights().check_compatible(weights)?;
        self.state_net.set_weights(&weights.state)?;
        self.output_net.set_weights(&weights.output)
    }

    /// A model with `copy_weights = false` is re-initialised from the
    /// configured seed, so every fresh copy of a seeded model starts equal.
    fn copy_model(&self, copy_weights: bool) -> Result<Self, GnnError> {
        if copy_weights {
            Ok(self.clone())
        } else {
            Self::new(self.config.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphOptions;
    use ndarray::array;

    fn chain() -> GraphObject {
        GraphObject::new(
            array![[0.0, 1.0, 1.0], [1.0, 2.0, 0.5], [2.0, 0.0, 0.2]],
            array![[0.1], [0.2], [0.3], [0.4]],
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
            GraphOptions::default(),
        )
        .expect("valid graph")
    }

    fn model(problem_based: ProblemBased) -> Gnn {
        Gnn::new(GnnConfig {
            problem_based,
            dim_arc_label: 1,
            seed: Some(3),
            ..GnnConfig::default()
        })
        .expect("valid config")
    }

    #[test]
    fn node_outputs_are_probabilities() {
        let out = model(ProblemBased::Node).propagate(&chain()).expect("loop");
        assert_eq!(out.output.dim(), (4, 2));
        assert_eq!(out.state.dim(), (4, 5));
        for row in out.output.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        assert!(out.iterations >= 1 && out.iterations <= 50);
    }

    #[test]
    fn isolated_node_keeps_zero_state() {
        let out = model(ProblemBased::Node).propagate(&chain()).expect("loop");
        assert!(out.state.row(3).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn output_rows_follow_masks() {
        let g = GraphObject::new(
            array![[0.0, 1.0, 1.0]],
            array![[0.1], [0.2], [0.3]],
            array![[1.0, 0.0], [0.0, 1.0]],
            GraphOptions::default()
                .with_set_mask(vec![true, false, true])
                .with_output_mask(vec![true, true, false]),
        )
        .expect("valid");
        let out = model(ProblemBased::Node).propagate(&g).expect("loop");
        assert_eq!(out.output.nrows(), 1);
    }

    #[test]
    fn graph_outputs_one_row_per_graph() {
        let single = |n: f32| {
            GraphObject::new(
                array![[0.0, 1.0, n]],
                array![[n], [n]],
                array![[1.0, 0.0]],
                GraphOptions::new(ProblemBased::Graph),
            )
            .expect("valid")
        };
        let merged = GraphObject::merge(
            &[single(0.1), single(0.2), single(0.3)],
            ProblemBased::Graph,
            Default::default(),
        )
        .expect("merge");
        let out = model(ProblemBased::Graph).propagate(&merged).expect("loop");
        assert_eq!(out.output.dim(), (3, 2));
    }

    #[test]
    fn arc_outputs_one_row_per_arc() {
        let g = GraphObject::new(
            array![[0.0, 1.0, 1.0], [1.0, 0.0, 0.5]],
            array![[0.1], [0.2]],
            array![[1.0, 0.0], [0.0, 1.0]],
            GraphOptions::new(ProblemBased::Arc),
        )
        .expect("valid");
        let out = model(ProblemBased::Arc).propagate(&g).expect("loop");
        assert_eq!(out.output.dim(), (2, 2));
    }

    #[test]
    fn problem_mismatch_rejected() {
        let result = model(ProblemBased::Arc).propagate(&chain());
        assert!(matches!(result, Err(GnnError::InvalidInput(_))));
    }

    #[test]
    fn seeded_copies_start_equal() {
        let m = model(ProblemBased::Node);
        let fresh = m.copy_model(false).expect("copy");
        assert_eq!(fresh.weights(), m.weights());
        let copied = m.copy_model(true).expect("copy");
        assert_eq!(copied, m);
    }

    #[test]
    fn finite_difference_gradient_of_linear_objective() {
        let mut m = model(ProblemBased::Node);
        let g = chain();
        let before = m.weights();
        let grads = m
            .gradients(&g, &|out: &LoopOutput| Ok(out.output.column(0).sum()))
            .expect("gradients");
        assert_eq!(m.weights(), before);
        assert_eq!(grads.weights.parameter_count(), before.parameter_count());
        assert!(grads.weights.is_finite());
        assert!(grads.weights.flatten().iter().any(|&v| v != 0.0));
    }
}
