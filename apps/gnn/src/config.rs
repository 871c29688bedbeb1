//! # Experiment Configuration
//!
//! One TOML file describes a whole experiment: how graphs are loaded, the
//! model, optimizer, loss and metrics, the training options and the
//! leave-k-out setup. Every section is optional; missing keys take the
//! defaults of the corresponding `gnn-core` record.
//!
//! ```toml
//! [data]
//! node_aggregation = "average"
//!
//! [model]
//! dim_state = 5
//! max_iteration = 50
//!
//! [optimizer]
//! kind = "adam"
//! learning_rate = 0.001
//!
//! [[metrics]]
//! key = "Acc"
//!
//! [writer]
//! path = "writer"
//! mode = "reset"
//! ```

use gnn_core::{
    Gnn, GnnConfig, GnnError, GraphObject, LkoConfig, LossFunction, MetricRegistry, MetricSpec,
    NodeAggregation, OptimizerConfig, TrainOptions, Trainer, WriterConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How graph directories are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub node_aggregation: NodeAggregation,
}

/// Everything a `train` or `lko` run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub data: DataConfig,
    pub model: GnnConfig,
    pub optimizer: OptimizerConfig,
    pub loss: LossFunction,
    pub metrics: Vec<MetricSpec>,
    pub train: TrainOptions,
    pub lko: LkoConfig,
    pub writer: WriterConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: GnnConfig::default(),
            optimizer: OptimizerConfig::default(),
            loss: LossFunction::default(),
            metrics: vec![MetricSpec {
                key: "Acc".to_string(),
                args: Default::default(),
            }],
            train: TrainOptions::default(),
            lko: LkoConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, GnnError> {
        toml::from_str(text).map_err(|e| GnnError::SerializationError(e.to_string()))
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String, GnnError> {
        toml::to_string_pretty(self).map_err(|e| GnnError::SerializationError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, GnnError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GnnError::IoError(format!("Read config {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Build a trainer whose model dimensions follow `example`.
    ///
    /// Label and target widths in the `[model]` section are ignored: they
    /// are always taken from the data so that a config can be reused across
    /// datasets.
    pub fn build_trainer(&self, example: &GraphObject) -> Result<Trainer<Gnn>, GnnError> {
        let model = GnnConfig {
            problem_based: example.problem_based(),
            dim_node_label: example.dim_node_label(),
            dim_arc_label: example.dim_arc_label(),
            dim_target: example.dim_target(),
            ..self.model.clone()
        };
        Trainer::new(
            Gnn::new(model)?,
            self.optimizer.build()?,
            self.loss,
            self.model.addressed_problem,
            MetricRegistry::from_specs(&self.metrics)?,
            self.writer.clone(),
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
