//! # Label Normalisation
//!
//! Column-wise max-abs scaling of node and arc labels, fitted on one set of
//! graphs and applied to every split. Structure, targets and masks are kept.

use crate::GnnError;
use crate::graph::GraphObject;
use crate::types::ProblemBased;
use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which graphs the scales are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    None,
    /// Training graphs only; validation and test never leak into the scales.
    #[default]
    TrainingSet,
    All,
}

impl FromStr for NormalizeMethod {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "gtr" | "training_set" | "training" => Ok(Self::TrainingSet),
            "all" => Ok(Self::All),
            other => Err(GnnError::invalid_argument(
                "normalize",
                format!("'{}' not in [none, training_set, all]", other),
            )),
        }
    }
}

/// Per-column divisors of node and arc labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScales {
    pub nodes: Array1<f32>,
    pub arcs: Array1<f32>,
}

/// Rows whose `mask` flag is false are skipped; `None` keeps every row.
fn max_abs_columns(views: &[(ArrayView2<'_, f32>, Option<&[bool]>)], width: usize) -> Array1<f32> {
    let mut scales = Array1::<f32>::zeros(width);
    for (view, mask) in views {
        for (i, row) in view.axis_iter(Axis(0)).enumerate() {
            if mask.and_then(|m| m.get(i)).is_some_and(|&keep| !keep) {
                continue;
            }
            scales.zip_mut_with(&row, |s, &v| *s = s.max(v.abs()));
        }
    }
    // all-zero columns stay unscaled
    scales.mapv_inplace(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
    scales
}

impl LabelScales {
    /// Max-abs of every label column over the entities selected by each
    /// graph's `set_mask`: node rows for node and graph problems, arc rows
    /// for arc problems. The other label kind is read in full.
    pub fn fit(graphs: &[&GraphObject]) -> Result<Self, GnnError> {
        let first = graphs.first().ok_or_else(|| {
            GnnError::InvalidInput("cannot fit label scales on zero graphs".to_string())
        })?;
        let dims = (first.dim_node_label(), first.dim_arc_label());
        if let Some(g) = graphs
            .iter()
            .find(|g| (g.dim_node_label(), g.dim_arc_label()) != dims)
        {
            return Err(GnnError::InvalidInput(format!(
                "label dims {:?} differ from {:?}",
                (g.dim_node_label(), g.dim_arc_label()),
                dims
            )));
        }

        let nodes: Vec<_> = graphs
            .iter()
            .map(|g| {
                let mask = (g.problem_based() != ProblemBased::Arc).then(|| g.set_mask());
                (g.nodes().view(), mask)
            })
            .collect();
        let arcs: Vec<_> = graphs
            .iter()
            .map(|g| {
                let mask = (g.problem_based() == ProblemBased::Arc).then(|| g.set_mask());
                (g.arc_labels(), mask)
            })
            .collect();
        Ok(Self {
            nodes: max_abs_columns(&nodes, dims.0),
            arcs: max_abs_columns(&arcs, dims.1),
        })
    }

    /// A copy of `graph` with scaled labels.
    pub fn apply(&self, graph: &GraphObject) -> Result<GraphObject, GnnError> {
        if graph.dim_node_label() != self.nodes.len() || graph.dim_arc_label() != self.arcs.len() {
            return Err(GnnError::InvalidInput(format!(
                "scales fitted on label dims ({}, {}), graph has ({}, {})",
                self.nodes.len(),
                self.arcs.len(),
                graph.dim_node_label(),
                graph.dim_arc_label()
            )));
        }
        let nodes = graph.nodes() / &self.nodes;
        let arc_labels = &graph.arc_labels() / &self.arcs;
        graph.relabel(nodes, arc_labels.view())
    }
}

/// The three splits of one cross-validation fold.
#[derive(Debug, Clone, PartialEq)]
pub struct Splits {
    pub training: Vec<GraphObject>,
    pub validation: Option<GraphObject>,
    pub test: GraphObject,
}

impl Splits {
    /// Scale every split with labels fitted according to `method`.
    pub fn normalized(self, method: NormalizeMethod) -> Result<Self, GnnError> {
        let scales = match method {
            NormalizeMethod::None => return Ok(self),
            NormalizeMethod::TrainingSet => LabelScales::fit(&self.training.iter().collect::<Vec<_>>())?,
            NormalizeMethod::All => {
                let all: Vec<&GraphObject> = self
                    .training
                    .iter()
                    .chain(self.validation.as_ref())
                    .chain(std::iter::once(&self.test))
                    .collect();
                LabelScales::fit(&all)?
            }
        };
        tracing::debug!(?method, node_scales = ?scales.nodes, arc_scales = ?scales.arcs, "Normalizing labels");
        Ok(Self {
            training: self
                .training
                .iter()
                .map(|g| scales.apply(g))
                .collect::<Result<_, _>>()?,
            validation: self.validation.as_ref().map(|g| scales.apply(g)).transpose()?,
            test: scales.apply(&self.test)?,
        })
    }
}
