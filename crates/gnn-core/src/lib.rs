//! # gnn-core
//!
//! Graph data model and training engine for state-propagation Graph Neural
//! Networks - THE ENGINE.
//!
//! A node state is iterated through an arc aggregation operator until it
//! converges, then an output network maps the converged states to
//! predictions. This crate owns everything around that loop:
//!
//! - `graph` / `sparse`: `GraphObject` with its `Adjacency`, `ArcNode` and
//!   `NodeGraph` operators, and the merge algebra used for batching
//! - `formats`: binary and text persistence of graph directories
//! - `model`: the `GnnModel` capability and a reference `Gnn`
//! - `optimizer` / `loss` / `metrics` / `curves`: pluggable collaborators
//! - `trainer` / `lko`: the train-validate-early-stop loop and leave-k-out
//!   cross validation
//!
//! ## Architectural Constraints
//!
//! - Synchronous and single threaded: folds, epochs and graphs run in order
//! - Deterministic under a seed (weight init, fold shuffles)
//! - NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod curves;
pub mod formats;
pub mod graph;
pub mod history;
pub mod lko;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod optimizer;
pub mod primitives;
pub mod sparse;
pub mod telemetry;
pub mod trainer;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{AddressedProblem, ClassWeights, GnnError, NodeAggregation, ProblemBased};

// =============================================================================
// RE-EXPORTS: Graph Model
// =============================================================================

pub use graph::{GraphObject, GraphOptions};
pub use sparse::SparseMatrix;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    NumberFormat, PersistenceHeader, StorageFormat, array_from_bytes, array_to_bytes, load_graph,
    save_graph,
};

// =============================================================================
// RE-EXPORTS: Training Engine
// =============================================================================

pub use history::{History, SplitHistory};
pub use lko::{LkoConfig, LkoDataset, LkoReport, leave_k_out};
pub use loss::LossFunction;
pub use metrics::{Average, Metric, MetricArgs, MetricRegistry, MetricSpec, Predictions};
pub use model::{Gnn, GnnConfig, GnnModel, LoopOutput, ModelWeights};
pub use normalize::NormalizeMethod;
pub use optimizer::{Adam, Optimizer, OptimizerConfig, Sgd};
pub use telemetry::{
    Channel, JsonLinesSink, MemorySink, TelemetryEvent, TelemetrySink, WriterConfig, WriterMode,
};
pub use trainer::{
    Evaluation, TestOptions, TestReport, TrainOptions, TrainOutcome, TrainStatus, Trainer,
};
