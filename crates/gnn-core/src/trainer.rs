//! # Training Engine
//!
//! `Trainer` wraps a `GnnModel` with everything needed to fit it: optimizer,
//! loss, metric registry, telemetry and the history of checkpoints.
//!
//! ## Training loop
//!
//! ```text
//! for e in last_epoch+1 .. last_epoch+1+epochs:
//!     one optimizer step per training graph
//!     if e % update_freq == 0:
//!         evaluate training (+ validation) -> history, telemetry
//!         validation loss < best ? snapshot weights, fails = 0 : fails += 1
//!         fails >= max_fails ? restore snapshot, stop
//! ```
//!
//! A training "batch" is one `GraphObject`: callers merge graphs beforehand
//! to get larger batches.

use crate::curves::{self, CurveSummary};
use crate::graph::GraphObject;
use crate::history::History;
use crate::loss::{LossFunction, argmax_rows};
use crate::metrics::{self, MetricRegistry, Predictions};
use crate::model::{GnnModel, LoopOutput, ModelWeights};
use crate::optimizer::Optimizer;
use crate::primitives::{DEFAULT_MAX_FAILS, DEFAULT_UPDATE_FREQ, INITIAL_BEST_LOSS, MAX_VERBOSE};
use crate::telemetry::{Channel, JsonLinesSink, TelemetrySink, WriterConfig};
use crate::{AddressedProblem, ClassWeights, GnnError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Namespace of a trainer built with `Trainer::new`.
pub const DEFAULT_NAMESPACE: &str = "GNN";

// =============================================================================
// OPTIONS & OUTCOMES
// =============================================================================

/// Parameters of one `train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    pub epochs: usize,
    /// Epochs between two evaluation checkpoints.
    pub update_freq: usize,
    /// Non-improving validation checkpoints tolerated before stopping.
    pub max_fails: usize,
    pub class_weights: ClassWeights,
    /// Divide state network gradients by the number of loop iterations.
    pub mean: bool,
    /// 0 silent, 1 history tables, 2 per-graph progress, 3 both.
    pub verbose: u8,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            update_freq: DEFAULT_UPDATE_FREQ,
            max_fails: DEFAULT_MAX_FAILS,
            class_weights: ClassWeights::default(),
            mean: true,
            verbose: MAX_VERBOSE,
        }
    }
}

impl TrainOptions {
    pub fn validate(&self) -> Result<(), GnnError> {
        if self.verbose > MAX_VERBOSE {
            return Err(GnnError::invalid_argument(
                "verbose",
                format!("{} not in [0, {}]", self.verbose, MAX_VERBOSE),
            ));
        }
        if self.update_freq == 0 {
            return Err(GnnError::invalid_argument("update_freq", "must be at least 1"));
        }
        Ok(())
    }

    fn logs_history(&self) -> bool {
        matches!(self.verbose, 1 | 3)
    }

    fn logs_progress(&self) -> bool {
        matches!(self.verbose, 2 | 3)
    }
}

/// How a `train` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainStatus {
    /// Validation failed `max_fails` times in a row; best weights restored.
    EarlyStopped,
    /// Every requested epoch ran.
    EpochsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub status: TrainStatus,
    /// Last epoch that ran (`None` for `epochs = 0`).
    pub last_epoch: Option<usize>,
    /// Best validation loss seen so far, if validating.
    pub best_loss_va: Option<f32>,
}

/// Per-example results of one graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEvaluation {
    pub iterations: usize,
    /// Weighted loss of every targeted row.
    pub loss: Array1<f32>,
    pub targets: Array2<f32>,
    pub scores: Array2<f32>,
}

/// Results of `Trainer::evaluate` over one or more graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Truncated mean of the per-graph iteration counts.
    pub iterations: usize,
    /// Mean loss over every targeted row of every graph.
    pub loss: f32,
    /// Registered metrics, in registration order.
    pub metrics: Vec<(String, f32)>,
    pub predictions: Predictions,
    pub targets: Array2<f32>,
    pub scores: Array2<f32>,
}

impl Evaluation {
    /// Value of any column key, `It` and `Loss` included.
    pub fn metric(&self, key: &str) -> Option<f32> {
        match key {
            "It" => Some(self.iterations as f32),
            "Loss" => Some(self.loss),
            _ => self.metrics.iter().find(|(k, _)| k == key).map(|&(_, v)| v),
        }
    }

    /// Registered metrics followed by `It` and `Loss`.
    pub fn all_metrics(&self) -> Vec<(String, f32)> {
        let mut all = self.metrics.clone();
        all.push(("It".to_string(), self.iterations as f32));
        all.push(("Loss".to_string(), self.loss));
        all
    }
}

/// Parameters of `Trainer::test`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    pub class_weights: ClassWeights,
    /// Also compute the accuracy of every class.
    pub acc_classes: bool,
    /// Write ROC curves into this directory.
    pub roc_dir: Option<PathBuf>,
    /// Write precision-recall curves into this directory.
    pub pr_dir: Option<PathBuf>,
    /// Add micro/macro averaged ROC curves.
    pub micro_and_macro: bool,
    pub pos_label: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub evaluation: Evaluation,
    pub accuracy_per_class: Option<Vec<f32>>,
    pub roc: Option<CurveSummary>,
    pub precision_recall: Option<CurveSummary>,
}

impl TestReport {
    pub fn metrics(&self) -> Vec<(String, f32)> {
        self.evaluation.all_metrics()
    }
}

// =============================================================================
// TRAINER
// =============================================================================

#[derive(Debug)]
pub struct Trainer<M: GnnModel> {
    model: M,
    optimizer: Box<dyn Optimizer>,
    loss: LossFunction,
    addressed_problem: AddressedProblem,
    metrics: MetricRegistry,
    writer: WriterConfig,
    namespace: String,
    history: History,
    sink: Box<dyn TelemetrySink>,
}

impl<M: GnnModel> Trainer<M> {
    /// Build a trainer; a `Reset` writer directory is deleted here.
    pub fn new(
        model: M,
        optimizer: Box<dyn Optimizer>,
        loss: LossFunction,
        addressed_problem: AddressedProblem,
        metrics: MetricRegistry,
        writer: WriterConfig,
    ) -> Result<Self, GnnError> {
        writer.prepare()?;
        let sink = Box::new(JsonLinesSink::new(&writer.path));
        Ok(Self {
            model,
            optimizer,
            loss,
            addressed_problem,
            metrics,
            writer,
            namespace: DEFAULT_NAMESPACE.to_string(),
            history: History::default(),
            sink,
        })
    }

    /// Replace the telemetry sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn writer(&self) -> &WriterConfig {
        &self.writer
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    pub fn addressed_problem(&self) -> AddressedProblem {
        self.addressed_problem
    }

    /// Deep copy with an empty history and a fresh optimizer state.
    ///
    /// The copy writes into `<writer>/<writer_suffix>` under `namespace`.
    pub fn copy(
        &self,
        copy_weights: bool,
        writer_suffix: &str,
        namespace: impl Into<String>,
    ) -> Result<Self, GnnError> {
        let writer = self.writer.child(writer_suffix);
        writer.prepare()?;
        Ok(Self {
            model: self.model.copy_model(copy_weights)?,
            optimizer: self.optimizer.fresh(),
            loss: self.loss,
            addressed_problem: self.addressed_problem,
            metrics: self.metrics.clone(),
            sink: self.sink.fork(&writer.path),
            writer,
            namespace: namespace.into(),
            history: History::default(),
        })
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    fn check_graphs(&self, graphs: &[GraphObject], role: &str) -> Result<(), GnnError> {
        let first = graphs
            .first()
            .ok_or_else(|| GnnError::InvalidInput(format!("{} set has no graphs", role)))?;
        if let Some(other) = graphs
            .iter()
            .find(|g| g.problem_based() != first.problem_based())
        {
            return Err(GnnError::InvalidInput(format!(
                "{} set mixes {}-based and {}-based graphs",
                role,
                first.problem_based(),
                other.problem_based()
            )));
        }
        if first.problem_based() != self.model.problem_based() {
            return Err(GnnError::InvalidInput(format!(
                "{} set is {}-based, model is {}-based",
                role,
                first.problem_based(),
                self.model.problem_based()
            )));
        }
        Ok(())
    }

    /// Loop, targets and weighted losses of a single graph.
    pub fn evaluate_single_graph(
        &self,
        graph: &GraphObject,
        class_weights: &ClassWeights,
    ) -> Result<GraphEvaluation, GnnError> {
        let LoopOutput {
            iterations, output, ..
        } = self.model.propagate(graph)?;
        let targets = split_targets(graph);
        let loss = self
            .loss
            .weighted(&targets, &output, class_weights, self.addressed_problem)?;
        Ok(GraphEvaluation {
            iterations,
            loss,
            targets,
            scores: output,
        })
    }

    /// Evaluate every graph, then compute metrics on the concatenated rows.
    pub fn evaluate(
        &self,
        graphs: &[GraphObject],
        class_weights: &ClassWeights,
    ) -> Result<Evaluation, GnnError> {
        self.check_graphs(graphs, "evaluation")?;
        let per_graph = graphs
            .iter()
            .map(|g| self.evaluate_single_graph(g, class_weights))
            .collect::<Result<Vec<_>, _>>()?;

        let losses: Vec<ArrayView1<'_, f32>> = per_graph.iter().map(|e| e.loss.view()).collect();
        let targets: Vec<ArrayView2<'_, f32>> = per_graph.iter().map(|e| e.targets.view()).collect();
        let scores: Vec<ArrayView2<'_, f32>> = per_graph.iter().map(|e| e.scores.view()).collect();
        let losses = concatenate(Axis(0), &losses)?;
        let targets = concatenate(Axis(0), &targets)?;
        let scores = concatenate(Axis(0), &scores)?;
        if losses.is_empty() {
            return Err(GnnError::InvalidInput(
                "no targeted entities in the evaluated graphs".to_string(),
            ));
        }

        let iterations =
            per_graph.iter().map(|e| e.iterations).sum::<usize>() / per_graph.len().max(1);
        let loss = losses.mean().unwrap_or(0.0);
        let predictions = self.predictions(&targets, &scores);
        let metrics = self.metrics.evaluate(&predictions)?;

        Ok(Evaluation {
            iterations,
            loss,
            metrics,
            predictions,
            targets,
            scores,
        })
    }

    fn predictions(&self, targets: &Array2<f32>, scores: &Array2<f32>) -> Predictions {
        match self.addressed_problem {
            AddressedProblem::Classification => Predictions::Labels {
                y_true: argmax_rows(targets).to_vec(),
                y_pred: argmax_rows(scores).to_vec(),
                classes: targets.ncols(),
            },
            AddressedProblem::Regression => Predictions::Values {
                y_true: targets.clone(),
                y_pred: scores.clone(),
            },
        }
    }

    // =========================================================================
    // TRAINING
    // =========================================================================

    /// One optimizer step on one graph; returns the loop iterations.
    fn training_step(
        &mut self,
        graph: &GraphObject,
        class_weights: &ClassWeights,
        mean: bool,
    ) -> Result<usize, GnnError> {
        let targets = split_targets(graph);
        let (loss, addressed_problem) = (self.loss, self.addressed_problem);
        let objective = |out: &LoopOutput| -> Result<f32, GnnError> {
            Ok(loss
                .weighted(&targets, &out.output, class_weights, addressed_problem)?
                .sum())
        };
        let gradients = self.model.gradients(graph, &objective)?;

        let mut step = gradients.weights;
        if mean && gradients.iterations > 0 {
            let iterations = gradients.iterations as f32;
            for tensor in &mut step.state {
                tensor.mapv_inplace(|g| g / iterations);
            }
        }

        let mut weights = self.model.weights();
        self.optimizer.apply_gradients(&mut weights, &step)?;
        if !weights.is_finite() {
            return Err(GnnError::NumericalError(
                "optimizer step produced non-finite weights".to_string(),
            ));
        }
        self.model.set_weights(&weights)?;
        Ok(gradients.iterations)
    }

    /// Fit the model, continuing the epoch count of previous calls.
    pub fn train(
        &mut self,
        training: &[GraphObject],
        validation: Option<&[GraphObject]>,
        options: &TrainOptions,
    ) -> Result<TrainOutcome, GnnError> {
        options.validate()?;
        self.check_graphs(training, "training")?;
        if let Some(va) = validation {
            self.check_graphs(va, "validation")?;
        }

        if self.history.is_empty() {
            self.history = History::new(&self.metrics.keys(), validation.is_some());
            fs::create_dir_all(&self.writer.path)?;
        } else if self.history.validation.is_some() != validation.is_some() {
            return Err(GnnError::invalid_argument(
                "validation",
                "must be given on every call or on none, like the first train call",
            ));
        }

        let mut best_loss = self.history.last_best_loss().unwrap_or(INITIAL_BEST_LOSS);
        let mut best_weights = self.model.weights();
        let mut fails = 0usize;
        let first = self.history.last_epoch().map_or(0, |e| e + 1);
        let mut outcome = TrainOutcome {
            status: TrainStatus::EpochsExhausted,
            last_epoch: None,
            best_loss_va: validation.map(|_| best_loss),
        };

        tracing::info!(
            namespace = %self.namespace,
            first_epoch = first,
            epochs = options.epochs,
            graphs = training.len(),
            "Training started"
        );

        for epoch in first..first + options.epochs {
            for (i, graph) in training.iter().enumerate() {
                let iterations = self.training_step(graph, &options.class_weights, options.mean)?;
                if options.logs_progress() {
                    tracing::info!(
                        epoch,
                        last_epoch = first + options.epochs - 1,
                        batch = i + 1,
                        batches = training.len(),
                        iterations,
                        "Training step"
                    );
                }
            }
            outcome.last_epoch = Some(epoch);

            if epoch % options.update_freq != 0 {
                continue;
            }

            let tr = self.evaluate(training, &options.class_weights)?;
            self.history.epochs.push(epoch);
            self.history.training.push(tr.iterations, tr.loss, &tr.metrics)?;
            self.write_scalars(Channel::Training, &tr, epoch)?;
            self.write_weights(epoch)?;

            if let Some(va) = validation {
                let eva = self.evaluate(va, &options.class_weights)?;
                if eva.loss < best_loss {
                    best_loss = eva.loss;
                    best_weights = self.model.weights();
                    fails = 0;
                } else {
                    fails += 1;
                }
                self.history.best_loss_va.push(best_loss);
                self.history.fails.push(fails);
                if let Some(split) = self.history.validation.as_mut() {
                    split.push(eva.iterations, eva.loss, &eva.metrics)?;
                }
                self.write_scalars(Channel::Validation, &eva, epoch)?;
                outcome.best_loss_va = Some(best_loss);

                if fails >= options.max_fails {
                    self.model.set_weights(&best_weights)?;
                    outcome.status = TrainStatus::EarlyStopped;
                    if options.logs_history() {
                        self.print_history();
                    }
                    tracing::info!(epoch, best_loss, "Validation stop");
                    break;
                }
            }

            if options.logs_history() {
                self.print_history();
            }
        }

        if outcome.status == TrainStatus::EpochsExhausted {
            tracing::info!(last_epoch = ?outcome.last_epoch, "End of epochs stop");
        }
        self.write_weights(outcome.last_epoch.unwrap_or(first))?;
        Ok(outcome)
    }

    /// Evaluate a held-out set, optionally with per-class accuracy and curves.
    pub fn test(
        &self,
        graphs: &[GraphObject],
        options: &TestOptions,
    ) -> Result<TestReport, GnnError> {
        if options.acc_classes && self.addressed_problem != AddressedProblem::Classification {
            return Err(GnnError::invalid_argument(
                "acc_classes",
                "per-class accuracy needs a classification problem",
            ));
        }
        let evaluation = self.evaluate(graphs, &options.class_weights)?;

        let accuracy_per_class = match &evaluation.predictions {
            Predictions::Labels {
                y_true,
                y_pred,
                classes,
            } if options.acc_classes => Some(metrics::accuracy_per_class(y_true, y_pred, *classes)?),
            _ => None,
        };
        let roc = options
            .roc_dir
            .as_deref()
            .map(|dir| {
                curves::write_roc(
                    &evaluation.targets,
                    &evaluation.scores,
                    dir,
                    options.micro_and_macro,
                    options.pos_label,
                )
            })
            .transpose()?;
        let precision_recall = options
            .pr_dir
            .as_deref()
            .map(|dir| {
                curves::write_precision_recall(
                    &evaluation.targets,
                    &evaluation.scores,
                    dir,
                    options.pos_label,
                )
            })
            .transpose()?;

        Ok(TestReport {
            evaluation,
            accuracy_per_class,
            roc,
            precision_recall,
        })
    }

    // =========================================================================
    // TELEMETRY
    // =========================================================================

    fn write_scalars(
        &mut self,
        channel: Channel,
        evaluation: &Evaluation,
        step: usize,
    ) -> Result<(), GnnError> {
        self.sink.scalar(
            channel,
            "Accuracy & Loss/Iteration @ Convergence",
            evaluation.iterations as f32,
            step,
        )?;
        self.sink
            .scalar(channel, "Accuracy & Loss/Loss", evaluation.loss, step)?;
        for (metric, (_, value)) in self.metrics.metrics().zip(&evaluation.metrics) {
            let name = format!("{}/{}", metric.namescope(), metric.display_name());
            self.sink.scalar(channel, &name, *value, step)?;
        }
        Ok(())
    }

    /// Histograms of every layer: `<namespace>: Weights/N1 L0`, ...
    fn write_weights(&mut self, step: usize) -> Result<(), GnnError> {
        let ModelWeights { state, output } = self.model.weights();
        for (channel, net, tensors) in [
            (Channel::NetState, "N1", state),
            (Channel::NetOutput, "N2", output),
        ] {
            for (layer, pair) in tensors.chunks(2).enumerate() {
                for (kind, tensor) in ["Weights", "Biases"].iter().zip(pair) {
                    let name = format!("{}: {}/{} L{}", self.namespace, kind, net, layer);
                    let values: Vec<f32> = tensor.iter().copied().collect();
                    self.sink.histogram(channel, &name, &values, step)?;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Log the history as a fixed-width table.
    pub fn print_history(&self) {
        tracing::info!(namespace = %self.namespace, "\n{}", self.history.to_table());
    }

    /// Write the history as CSV; `.csv` is appended when missing.
    pub fn save_history_csv(&self, path: &Path) -> Result<PathBuf, GnnError> {
        let path = with_extension(path, "csv");
        self.history.save_csv(&path)?;
        Ok(path)
    }

    /// Write the history as a text table; `.txt` is appended when missing.
    pub fn save_history_txt(&self, path: &Path) -> Result<PathBuf, GnnError> {
        let path = with_extension(path, "txt");
        self.history.save_txt(&path)?;
        Ok(path)
    }
}

/// Target rows selected by the graph's current split.
fn split_targets(graph: &GraphObject) -> Array2<f32> {
    let rows: Vec<usize> = graph
        .target_mask()
        .iter()
        .enumerate()
        .filter(|&(_, &selected)| selected)
        .map(|(i, _)| i)
        .collect();
    graph.targets().select(Axis(0), &rows)
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    if path.extension().is_some_and(|e| e == extension) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}
