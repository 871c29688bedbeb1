//! # Core Type Definitions
//!
//! This module contains the small vocabulary types shared by every other
//! module of the engine:
//! - Problem descriptors (`ProblemBased`, `NodeAggregation`, `AddressedProblem`)
//! - Class weighting for losses (`ClassWeights`)
//! - Error types (`GnnError`)
//!
//! All descriptor enums parse from the short codes used on disk and on the
//! command line ("n"/"a"/"g", "c"/"r") as well as from their full names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// PROBLEM DESCRIPTORS
// =============================================================================

/// Granularity of the targets a graph carries.
///
/// - `Node`: one target per output-masked node.
/// - `Arc`: one target per output-masked arc.
/// - `Graph`: one target per (sub)graph; nodes are pooled through `NodeGraph`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProblemBased {
    #[default]
    Node,
    Arc,
    Graph,
}

impl ProblemBased {
    /// Short code used by persisted datasets.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Node => "n",
            Self::Arc => "a",
            Self::Graph => "g",
        }
    }
}

impl fmt::Display for ProblemBased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Arc => "arc",
            Self::Graph => "graph",
        };
        f.write_str(name)
    }
}

impl FromStr for ProblemBased {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "node" => Ok(Self::Node),
            "a" | "arc" => Ok(Self::Arc),
            "g" | "graph" => Ok(Self::Graph),
            other => Err(GnnError::invalid_argument(
                "problem_based",
                format!("'{}' not in [n, a, g]", other),
            )),
        }
    }
}

/// How incoming per-arc messages are combined at their destination node.
///
/// See `GraphObject::build_arc_node` for the exact coefficients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeAggregation {
    Sum,
    #[default]
    Average,
    Normalized,
}

impl fmt::Display for NodeAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Normalized => "normalized",
        };
        f.write_str(name)
    }
}

impl FromStr for NodeAggregation {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "average" => Ok(Self::Average),
            "normalized" => Ok(Self::Normalized),
            other => Err(GnnError::invalid_argument(
                "node_aggregation",
                format!("'{}' not in [average, sum, normalized]", other),
            )),
        }
    }
}

/// Classification or regression.
///
/// Classification compares arg-max labels, regression compares raw vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressedProblem {
    #[default]
    Classification,
    Regression,
}

impl FromStr for AddressedProblem {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "classification" => Ok(Self::Classification),
            "r" | "regression" => Ok(Self::Regression),
            other => Err(GnnError::invalid_argument(
                "addressed_problem",
                format!("'{}' not in [c, r]", other),
            )),
        }
    }
}

// =============================================================================
// CLASS WEIGHTS
// =============================================================================

/// Weighting applied to per-example losses.
///
/// `Uniform(w)` scales every example; `PerClass` picks the weight of the
/// arg-max class of the one-hot target (classification only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassWeights {
    Uniform(f32),
    PerClass(Vec<f32>),
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self::Uniform(1.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur anywhere in the engine.
///
/// - No silent coercion: a bad value fails at the call that introduced it
/// - No retries: every error aborts the current epoch, fold or command
#[derive(Debug, Error)]
pub enum GnnError {
    /// A constructor or function argument has an invalid value.
    #[error("Invalid argument <{parameter}>: {reason}")]
    InvalidArgument {
        parameter: &'static str,
        reason: String,
    },

    /// Input is not a single graph or a homogeneous, non-empty list of graphs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph arrays are inconsistent (bad arc indices, wrong shapes).
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// `set_mask` and `output_mask` have different lengths.
    #[error("len(set_mask) = {set_mask} != len(output_mask) = {output_mask}")]
    MaskLengthMismatch { set_mask: usize, output_mask: usize },

    /// Two arrays that must be multiplied or concatenated do not line up.
    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A persisted graph directory contains a file that maps to no attribute.
    #[error("Unexpected file in graph directory: {0:?}")]
    UnexpectedFile(PathBuf),

    /// A required file is absent from a persisted graph directory.
    #[error("Missing file in graph directory: {0:?}")]
    MissingFile(PathBuf),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Weights or losses left the finite range.
    #[error("Numerical error: {0}")]
    NumericalError(String),
}

impl GnnError {
    /// Shorthand for `GnnError::InvalidArgument`.
    pub fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for GnnError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<ndarray::ShapeError> for GnnError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::InvalidGraph(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_based_parses_codes_and_names() {
        assert_eq!("n".parse::<ProblemBased>().expect("n"), ProblemBased::Node);
        assert_eq!("arc".parse::<ProblemBased>().expect("arc"), ProblemBased::Arc);
        assert_eq!("G".parse::<ProblemBased>().expect("G"), ProblemBased::Graph);
        assert_eq!(ProblemBased::Graph.code(), "g");
    }

    #[test]
    fn unknown_problem_based_names_parameter() {
        let err = "x".parse::<ProblemBased>().expect_err("must fail");
        assert!(err.to_string().contains("problem_based"));
    }

    #[test]
    fn unknown_aggregation_rejected() {
        let err = "max".parse::<NodeAggregation>().expect_err("must fail");
        assert!(matches!(
            err,
            GnnError::InvalidArgument {
                parameter: "node_aggregation",
                ..
            }
        ));
    }

    #[test]
    fn aggregation_display_roundtrip() {
        for agg in [
            NodeAggregation::Sum,
            NodeAggregation::Average,
            NodeAggregation::Normalized,
        ] {
            let parsed: NodeAggregation = agg.to_string().parse().expect("roundtrip");
            assert_eq!(parsed, agg);
        }
    }

    #[test]
    fn class_weights_default_is_unit() {
        assert_eq!(ClassWeights::default(), ClassWeights::Uniform(1.0));
    }
}
