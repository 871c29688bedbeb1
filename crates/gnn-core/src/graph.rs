//! # Graph Object
//!
//! The graph instance consumed by training and evaluation.
//!
//! A `GraphObject` owns its raw arrays (`arcs`, `nodes`, `targets`, masks) and
//! the sparse operators derived from them (`Adjacency`, `ArcNode`,
//! `NodeGraph`). Fields are private: the derived operators can only change
//! through a full reconstruction or through `set_arc_node`, so they never
//! drift from the arrays they were built from.
//!
//! ## Layout
//!
//! - `arcs[i] = [from | to | arc label...]` (float-encoded node indices)
//! - `nodes[j] = [node label...]`
//! - `targets`: one row per output-masked node or arc, or one row per graph

use crate::primitives::ARC_INDEX_COLUMNS;
use crate::sparse::SparseMatrix;
use crate::{GnnError, NodeAggregation, ProblemBased};
use ndarray::{Array2, ArrayView2, Axis, s};

// =============================================================================
// CONSTRUCTION OPTIONS
// =============================================================================

/// Optional constructor inputs of a `GraphObject`.
///
/// Absent masks default to all-true; absent operators are built from the arcs.
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    pub problem_based: ProblemBased,
    pub node_aggregation: NodeAggregation,
    pub set_mask: Option<Vec<bool>>,
    pub output_mask: Option<Vec<bool>>,
    pub node_graph: Option<SparseMatrix>,
    pub arc_node: Option<SparseMatrix>,
}

impl GraphOptions {
    /// Options for the given problem type, everything else default.
    #[must_use]
    pub fn new(problem_based: ProblemBased) -> Self {
        Self {
            problem_based,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_aggregation(mut self, node_aggregation: NodeAggregation) -> Self {
        self.node_aggregation = node_aggregation;
        self
    }

    #[must_use]
    pub fn with_set_mask(mut self, set_mask: Vec<bool>) -> Self {
        self.set_mask = Some(set_mask);
        self
    }

    #[must_use]
    pub fn with_output_mask(mut self, output_mask: Vec<bool>) -> Self {
        self.output_mask = Some(output_mask);
        self
    }

    #[must_use]
    pub fn with_node_graph(mut self, node_graph: SparseMatrix) -> Self {
        self.node_graph = Some(node_graph);
        self
    }
}

// =============================================================================
// GRAPH OBJECT
// =============================================================================

/// One (possibly merged) graph instance.
///
/// `Clone` is a full deep copy: every array and operator is duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphObject {
    arcs: Array2<f32>,
    nodes: Array2<f32>,
    targets: Array2<f32>,
    problem_based: ProblemBased,
    node_aggregation: NodeAggregation,
    set_mask: Vec<bool>,
    output_mask: Vec<bool>,
    adjacency: SparseMatrix,
    arc_node: SparseMatrix,
    node_graph: Option<SparseMatrix>,
}

impl GraphObject {
    /// Build a graph from raw arrays.
    ///
    /// # Errors
    ///
    /// - `InvalidGraph` if an arc references a node that does not exist, or
    ///   the targets do not match the problem granularity
    /// - `MaskLengthMismatch` if `len(set_mask) != len(output_mask)`
    pub fn new(
        arcs: Array2<f32>,
        nodes: Array2<f32>,
        targets: Array2<f32>,
        options: GraphOptions,
    ) -> Result<Self, GnnError> {
        let GraphOptions {
            problem_based,
            node_aggregation,
            set_mask,
            output_mask,
            node_graph,
            arc_node,
        } = options;

        let node_count = nodes.nrows();
        if arcs.nrows() > 0 && arcs.ncols() < ARC_INDEX_COLUMNS {
            return Err(GnnError::InvalidGraph(format!(
                "arcs need at least {} columns, found {}",
                ARC_INDEX_COLUMNS,
                arcs.ncols()
            )));
        }
        let endpoints = parse_endpoints(&arcs, node_count)?;

        let entity_count = match problem_based {
            ProblemBased::Arc => arcs.nrows(),
            ProblemBased::Node | ProblemBased::Graph => node_count,
        };
        let set_mask = set_mask.unwrap_or_else(|| vec![true; entity_count]);
        let output_mask = output_mask.unwrap_or_else(|| vec![true; set_mask.len()]);
        if set_mask.len() != output_mask.len() {
            return Err(GnnError::MaskLengthMismatch {
                set_mask: set_mask.len(),
                output_mask: output_mask.len(),
            });
        }
        if set_mask.len() != entity_count {
            return Err(GnnError::InvalidGraph(format!(
                "masks cover {} entities, {}-based graph has {}",
                set_mask.len(),
                problem_based,
                entity_count
            )));
        }

        let adjacency = adjacency_from(&endpoints, node_count);
        let arc_node = match arc_node {
            Some(m) if m.shape() == (arcs.nrows(), node_count) => m,
            Some(m) => {
                return Err(GnnError::ShapeMismatch {
                    expected: (arcs.nrows(), node_count),
                    found: m.shape(),
                });
            }
            None => arc_node_from(&endpoints, node_count, node_aggregation),
        };
        let node_graph = match (problem_based, node_graph) {
            (ProblemBased::Graph, Some(m)) if m.shape().0 == node_count => Some(m),
            (ProblemBased::Graph, Some(m)) => {
                return Err(GnnError::ShapeMismatch {
                    expected: (node_count, m.shape().1),
                    found: m.shape(),
                });
            }
            (pb, _) => node_graph_for(pb, node_count),
        };

        let graph = Self {
            arcs,
            nodes,
            targets,
            problem_based,
            node_aggregation,
            set_mask,
            output_mask,
            adjacency,
            arc_node,
            node_graph,
        };
        graph.check_targets()?;
        Ok(graph)
    }

    fn check_targets(&self) -> Result<(), GnnError> {
        let expected = match self.problem_based {
            ProblemBased::Graph => self.graph_count(),
            ProblemBased::Node | ProblemBased::Arc => {
                self.output_mask.iter().filter(|&&m| m).count()
            }
        };
        if self.targets.nrows() != expected {
            return Err(GnnError::InvalidGraph(format!(
                "{}-based graph expects {} target rows, found {}",
                self.problem_based,
                expected,
                self.targets.nrows()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // STRUCTURE BUILDERS
    // =========================================================================

    /// Sparse N×N adjacency with one unit triplet per arc.
    ///
    /// Parallel arcs are kept as separate triplets and sum when read.
    #[must_use]
    pub fn build_adjacency(&self) -> SparseMatrix {
        adjacency_from(&self.arc_endpoints(), self.node_count())
    }

    /// Sparse (arcs × nodes) aggregation operator.
    ///
    /// Row i has a single entry at the destination node of arc i:
    /// - `Sum`: 1
    /// - `Average`: 1 / in-degree of the destination
    /// - `Normalized`: 1 / total number of arcs
    ///
    /// Nodes with no incoming arc get an all-zero column.
    #[must_use]
    pub fn build_arc_node(&self, node_aggregation: NodeAggregation) -> SparseMatrix {
        arc_node_from(&self.arc_endpoints(), self.node_count(), node_aggregation)
    }

    /// Uniform (N × 1) pooling column `1/N` for graph-based problems, `None` otherwise.
    #[must_use]
    pub fn build_node_graph(&self, problem_based: ProblemBased) -> Option<SparseMatrix> {
        node_graph_for(problem_based, self.node_count())
    }

    /// Rebuild `ArcNode` for another aggregation mode.
    pub fn set_arc_node(&mut self, node_aggregation: NodeAggregation) {
        self.arc_node = self.build_arc_node(node_aggregation);
        self.node_aggregation = node_aggregation;
    }

    /// Replace the set mask; its length must match the output mask.
    pub fn set_set_mask(&mut self, set_mask: Vec<bool>) -> Result<(), GnnError> {
        if set_mask.len() != self.output_mask.len() {
            return Err(GnnError::MaskLengthMismatch {
                set_mask: set_mask.len(),
                output_mask: self.output_mask.len(),
            });
        }
        self.set_mask = set_mask;
        Ok(())
    }

    /// Replace the output mask; target rows must still match.
    pub fn set_output_mask(&mut self, output_mask: Vec<bool>) -> Result<(), GnnError> {
        if output_mask.len() != self.set_mask.len() {
            return Err(GnnError::MaskLengthMismatch {
                set_mask: self.set_mask.len(),
                output_mask: output_mask.len(),
            });
        }
        let previous = std::mem::replace(&mut self.output_mask, output_mask);
        if let Err(e) = self.check_targets() {
            self.output_mask = previous;
            return Err(e);
        }
        Ok(())
    }

    /// A new graph with the same structure and masks but other labels.
    ///
    /// `arc_labels` replaces every column of `arcs` after the two index columns.
    pub fn relabel(
        &self,
        nodes: Array2<f32>,
        arc_labels: ArrayView2<'_, f32>,
    ) -> Result<Self, GnnError> {
        if nodes.nrows() != self.node_count() {
            return Err(GnnError::ShapeMismatch {
                expected: (self.node_count(), nodes.ncols()),
                found: nodes.dim(),
            });
        }
        let arcs = if self.arc_count() == 0 {
            self.arcs.clone()
        } else {
            let indices = self.arcs.slice(s![.., ..ARC_INDEX_COLUMNS]);
            ndarray::concatenate(Axis(1), &[indices.view(), arc_labels.view()])?
        };
        Self::new(
            arcs,
            nodes,
            self.targets.clone(),
            GraphOptions {
                problem_based: self.problem_based,
                node_aggregation: self.node_aggregation,
                set_mask: Some(self.set_mask.clone()),
                output_mask: Some(self.output_mask.clone()),
                node_graph: self.node_graph.clone(),
                arc_node: Some(self.arc_node.clone()),
            },
        )
    }

    // =========================================================================
    // MERGE
    // =========================================================================

    /// Disjoint union of `graphs`, in input order.
    ///
    /// Arc endpoints of graph k are shifted by the node count of graphs 0..k;
    /// nodes, targets and masks are concatenated; `Adjacency` and `ArcNode`
    /// are rebuilt; for graph-based problems `NodeGraph` is the block-diagonal
    /// composition of the per-graph pooling columns.
    pub fn merge(
        graphs: &[GraphObject],
        problem_based: ProblemBased,
        node_aggregation: NodeAggregation,
    ) -> Result<Self, GnnError> {
        if graphs.is_empty() {
            return Err(GnnError::InvalidInput(
                "cannot merge an empty list of graphs".to_string(),
            ));
        }

        let mut offset = 0usize;
        let mut arcs = Vec::with_capacity(graphs.len());
        for g in graphs {
            let mut shifted = g.arcs.clone();
            if shifted.nrows() > 0 {
                shifted
                    .slice_mut(s![.., ..ARC_INDEX_COLUMNS])
                    .mapv_inplace(|v| v + offset as f32);
            }
            arcs.push(shifted);
            offset += g.node_count();
        }

        let arcs = concat_rows(&arcs, "arcs")?;
        let nodes = concat_rows(
            &graphs.iter().map(|g| g.nodes.clone()).collect::<Vec<_>>(),
            "nodes",
        )?;
        let targets = concat_rows(
            &graphs.iter().map(|g| g.targets.clone()).collect::<Vec<_>>(),
            "targets",
        )?;
        let set_mask = graphs.iter().flat_map(|g| g.set_mask.iter().copied()).collect();
        let output_mask = graphs
            .iter()
            .flat_map(|g| g.output_mask.iter().copied())
            .collect();

        let node_graph = (problem_based == ProblemBased::Graph).then(|| {
            let blocks: Vec<SparseMatrix> = graphs
                .iter()
                .map(|g| {
                    g.node_graph
                        .clone()
                        .unwrap_or_else(|| uniform_column(g.node_count()))
                })
                .collect();
            SparseMatrix::block_diag(&blocks)
        });

        Self::new(
            arcs,
            nodes,
            targets,
            GraphOptions {
                problem_based,
                node_aggregation,
                set_mask: Some(set_mask),
                output_mask: Some(output_mask),
                node_graph,
                arc_node: None,
            },
        )
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn arcs(&self) -> &Array2<f32> {
        &self.arcs
    }

    pub fn nodes(&self) -> &Array2<f32> {
        &self.nodes
    }

    pub fn targets(&self) -> &Array2<f32> {
        &self.targets
    }

    pub fn set_mask(&self) -> &[bool] {
        &self.set_mask
    }

    pub fn output_mask(&self) -> &[bool] {
        &self.output_mask
    }

    pub fn adjacency(&self) -> &SparseMatrix {
        &self.adjacency
    }

    pub fn arc_node(&self) -> &SparseMatrix {
        &self.arc_node
    }

    pub fn node_graph(&self) -> Option<&SparseMatrix> {
        self.node_graph.as_ref()
    }

    pub fn problem_based(&self) -> ProblemBased {
        self.problem_based
    }

    pub fn node_aggregation(&self) -> NodeAggregation {
        self.node_aggregation
    }

    pub fn node_count(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.nrows()
    }

    /// Length of the mask axis: arcs for arc problems, nodes otherwise.
    pub fn entity_count(&self) -> usize {
        self.set_mask.len()
    }

    /// Number of pooled graphs (columns of `NodeGraph`), 1 without pooling.
    pub fn graph_count(&self) -> usize {
        self.node_graph.as_ref().map_or(1, |m| m.shape().1)
    }

    pub fn dim_node_label(&self) -> usize {
        self.nodes.ncols()
    }

    pub fn dim_arc_label(&self) -> usize {
        self.arcs.ncols().saturating_sub(ARC_INDEX_COLUMNS)
    }

    pub fn dim_target(&self) -> usize {
        self.targets.ncols()
    }

    /// Arc labels (every column after the two index columns).
    pub fn arc_labels(&self) -> ArrayView2<'_, f32> {
        let from = ARC_INDEX_COLUMNS.min(self.arcs.ncols());
        self.arcs.slice(s![.., from..])
    }

    /// (from, to) node indices of every arc.
    pub fn arc_endpoints(&self) -> Vec<(usize, usize)> {
        self.arcs
            .rows()
            .into_iter()
            .map(|row| (row[0] as usize, row[1] as usize))
            .collect()
    }

    /// Number of incoming arcs of every node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.node_count()];
        for (_, to) in self.arc_endpoints() {
            degrees[to] += 1;
        }
        degrees
    }

    /// Mask over target rows selecting the entities of this split.
    ///
    /// For node/arc problems this is `set_mask` restricted to output-masked
    /// entities; graph-level targets are always all selected.
    pub fn target_mask(&self) -> Vec<bool> {
        match self.problem_based {
            ProblemBased::Graph => vec![true; self.targets.nrows()],
            ProblemBased::Node | ProblemBased::Arc => self
                .set_mask
                .iter()
                .zip(&self.output_mask)
                .filter(|&(_, &out)| out)
                .map(|(&set, _)| set)
                .collect(),
        }
    }
}

// =============================================================================
// BUILDERS (pure functions of the arrays)
// =============================================================================

fn parse_endpoints(arcs: &Array2<f32>, node_count: usize) -> Result<Vec<(usize, usize)>, GnnError> {
    let mut endpoints = Vec::with_capacity(arcs.nrows());
    for (i, row) in arcs.rows().into_iter().enumerate() {
        let index = |v: f32| -> Result<usize, GnnError> {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && (v as usize) < node_count {
                Ok(v as usize)
            } else {
                Err(GnnError::InvalidGraph(format!(
                    "arc {} references node {} but the graph has {} nodes",
                    i, v, node_count
                )))
            }
        };
        endpoints.push((index(row[0])?, index(row[1])?));
    }
    Ok(endpoints)
}

fn adjacency_from(endpoints: &[(usize, usize)], node_count: usize) -> SparseMatrix {
    let mut rows = Vec::with_capacity(endpoints.len());
    let mut cols = Vec::with_capacity(endpoints.len());
    for &(from, to) in endpoints {
        rows.push(from);
        cols.push(to);
    }
    let values = vec![1.0; endpoints.len()];
    SparseMatrix::from_triplets((node_count, node_count), rows, cols, values)
        .unwrap_or_else(|_| SparseMatrix::zeros((node_count, node_count)))
}

fn arc_node_from(
    endpoints: &[(usize, usize)],
    node_count: usize,
    node_aggregation: NodeAggregation,
) -> SparseMatrix {
    let arc_count = endpoints.len();
    let mut in_degree = vec![0usize; node_count];
    for &(_, to) in endpoints {
        in_degree[to] += 1;
    }

    let values = endpoints
        .iter()
        .map(|&(_, to)| match node_aggregation {
            NodeAggregation::Sum => 1.0,
            NodeAggregation::Average => 1.0 / in_degree[to] as f32,
            NodeAggregation::Normalized => 1.0 / arc_count as f32,
        })
        .collect();
    let rows = (0..arc_count).collect();
    let cols = endpoints.iter().map(|&(_, to)| to).collect();
    SparseMatrix::from_triplets((arc_count, node_count), rows, cols, values)
        .unwrap_or_else(|_| SparseMatrix::zeros((arc_count, node_count)))
}

fn node_graph_for(problem_based: ProblemBased, node_count: usize) -> Option<SparseMatrix> {
    (problem_based == ProblemBased::Graph).then(|| uniform_column(node_count))
}

fn uniform_column(node_count: usize) -> SparseMatrix {
    let value = 1.0 / node_count as f32;
    SparseMatrix::from_triplets(
        (node_count, 1),
        (0..node_count).collect(),
        vec![0; node_count],
        vec![value; node_count],
    )
    .unwrap_or_else(|_| SparseMatrix::zeros((node_count, 1)))
}

fn concat_rows(blocks: &[Array2<f32>], what: &str) -> Result<Array2<f32>, GnnError> {
    let views: Vec<_> = blocks.iter().map(Array2::view).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|e| {
        GnnError::InvalidInput(format!("cannot merge {} of different widths: {}", what, e))
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// 0 -> 1, 0 -> 2, 1 -> 2 and an isolated node 3.
    fn triangle_with_isolated() -> GraphObject {
        let arcs = array![[0.0, 1.0, 0.5], [0.0, 2.0, 0.1], [1.0, 2.0, 0.2]];
        let nodes = array![[1.0], [2.0], [3.0], [4.0]];
        let targets = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        GraphObject::new(arcs, nodes, targets, GraphOptions::default()).expect("valid graph")
    }

    #[test]
    fn dimensions_are_recorded() {
        let g = triangle_with_isolated();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.arc_count(), 3);
        assert_eq!(g.dim_node_label(), 1);
        assert_eq!(g.dim_arc_label(), 1);
        assert_eq!(g.dim_target(), 2);
        assert_eq!(g.entity_count(), 4);
        assert!(g.node_graph().is_none());
    }

    #[test]
    fn adjacency_marks_arcs() {
        let g = triangle_with_isolated();
        let adj = g.adjacency().to_dense();
        assert_eq!(adj[[0, 1]], 1.0);
        assert_eq!(adj[[0, 2]], 1.0);
        assert_eq!(adj[[1, 2]], 1.0);
        assert_eq!(adj.sum(), 3.0);
    }

    #[test]
    fn multi_edges_sum_in_adjacency() {
        let arcs = array![[0.0, 1.0], [0.0, 1.0]];
        let nodes = array![[0.0], [0.0]];
        let targets = array![[1.0], [1.0]];
        let g = GraphObject::new(arcs, nodes, targets, GraphOptions::default()).expect("valid");
        assert_eq!(g.adjacency().get(0, 1), 2.0);
    }

    #[test]
    fn arc_node_average_divides_by_in_degree() {
        let g = triangle_with_isolated();
        let an = g.arc_node().to_dense();
        assert_eq!(an[[0, 1]], 1.0);
        assert_eq!(an[[1, 2]], 0.5);
        assert_eq!(an[[2, 2]], 0.5);
        assert_eq!(g.arc_node().col_sums(), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn arc_node_sum_counts_in_degree() {
        let g = triangle_with_isolated();
        let an = g.build_arc_node(NodeAggregation::Sum);
        assert_eq!(an.col_sums(), vec![0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn arc_node_normalized_divides_by_arc_count() {
        let g = triangle_with_isolated();
        let an = g.build_arc_node(NodeAggregation::Normalized);
        for (_, _, v) in an.triplets() {
            assert!((v - 1.0 / 3.0).abs() < 1e-7);
        }
    }

    #[test]
    fn set_arc_node_rebuilds() {
        let mut g = triangle_with_isolated();
        g.set_arc_node(NodeAggregation::Sum);
        assert_eq!(g.node_aggregation(), NodeAggregation::Sum);
        assert_eq!(g.arc_node().get(1, 2), 1.0);
    }

    #[test]
    fn node_graph_is_uniform_for_graph_problems() {
        let arcs = array![[0.0, 1.0]];
        let nodes = array![[0.0], [1.0]];
        let targets = array![[1.0, 0.0]];
        let g = GraphObject::new(arcs, nodes, targets, GraphOptions::new(ProblemBased::Graph))
            .expect("valid");
        let ng = g.node_graph().expect("node graph").to_dense();
        assert_eq!(ng, array![[0.5], [0.5]]);
        assert_eq!(g.graph_count(), 1);
        assert!(g.build_node_graph(ProblemBased::Node).is_none());
    }

    #[test]
    fn mismatched_masks_rejected() {
        let g = triangle_with_isolated();
        let result = GraphObject::new(
            g.arcs().clone(),
            g.nodes().clone(),
            g.targets().clone(),
            GraphOptions::default()
                .with_set_mask(vec![true; 4])
                .with_output_mask(vec![true; 3]),
        );
        assert!(matches!(
            result,
            Err(GnnError::MaskLengthMismatch {
                set_mask: 4,
                output_mask: 3
            })
        ));
    }

    #[test]
    fn out_of_range_arc_rejected() {
        let arcs = array![[0.0, 5.0]];
        let nodes = array![[0.0], [1.0]];
        let targets = array![[1.0], [1.0]];
        let result = GraphObject::new(arcs, nodes, targets, GraphOptions::default());
        assert!(matches!(result, Err(GnnError::InvalidGraph(_))));
    }

    #[test]
    fn fractional_arc_index_rejected() {
        let arcs = array![[0.5, 1.0]];
        let nodes = array![[0.0], [1.0]];
        let targets = array![[1.0], [1.0]];
        let result = GraphObject::new(arcs, nodes, targets, GraphOptions::default());
        assert!(matches!(result, Err(GnnError::InvalidGraph(_))));
    }

    #[test]
    fn target_rows_follow_output_mask() {
        let g = triangle_with_isolated();
        let result = GraphObject::new(
            g.arcs().clone(),
            g.nodes().clone(),
            g.targets().clone(),
            GraphOptions::default().with_output_mask(vec![true, true, false, false]),
        );
        assert!(matches!(result, Err(GnnError::InvalidGraph(_))));
    }

    #[test]
    fn clone_is_independent() {
        let g = triangle_with_isolated();
        let mut copy = g.clone();
        copy.set_set_mask(vec![false, true, false, true]).expect("mask");
        copy.set_arc_node(NodeAggregation::Sum);
        assert_eq!(g.set_mask(), &[true; 4]);
        assert_eq!(g.node_aggregation(), NodeAggregation::Average);
        assert_ne!(g, copy);
    }

    #[test]
    fn target_mask_restricts_to_output_entities() {
        let arcs = array![[0.0, 1.0]];
        let nodes = array![[0.0], [1.0], [2.0]];
        let targets = array![[1.0], [0.0]];
        let g = GraphObject::new(
            arcs,
            nodes,
            targets,
            GraphOptions::default()
                .with_set_mask(vec![true, false, true])
                .with_output_mask(vec![true, true, false]),
        )
        .expect("valid");
        assert_eq!(g.target_mask(), vec![true, false]);
    }

    #[test]
    fn merge_offsets_second_graph() {
        let a = triangle_with_isolated();
        let b = triangle_with_isolated();
        let merged =
            GraphObject::merge(&[a.clone(), b], ProblemBased::Node, NodeAggregation::Average)
                .expect("merge");
        assert_eq!(merged.node_count(), 8);
        assert_eq!(merged.arc_count(), 6);
        assert_eq!(merged.arcs()[[3, 0]], 4.0);
        assert_eq!(merged.arcs()[[5, 1]], 6.0);
        assert_eq!(merged.arcs()[[5, 2]], 0.2);
        assert_eq!(merged.targets().nrows(), 8);
    }

    #[test]
    fn merge_singleton_is_identity() {
        let g = triangle_with_isolated();
        let merged = GraphObject::merge(
            std::slice::from_ref(&g),
            g.problem_based(),
            g.node_aggregation(),
        )
        .expect("merge");
        assert_eq!(merged, g);
    }

    #[test]
    fn merge_graph_problems_block_diagonal() {
        let small = GraphObject::new(
            array![[0.0, 1.0]],
            array![[0.0], [1.0]],
            array![[1.0]],
            GraphOptions::new(ProblemBased::Graph),
        )
        .expect("valid");
        let single = GraphObject::new(
            Array2::zeros((0, 2)),
            array![[5.0]],
            array![[0.0]],
            GraphOptions::new(ProblemBased::Graph),
        )
        .expect("valid");
        let merged =
            GraphObject::merge(&[small, single], ProblemBased::Graph, NodeAggregation::Sum)
                .expect("merge");
        let ng = merged.node_graph().expect("node graph").to_dense();
        assert_eq!(ng, array![[0.5, 0.0], [0.5, 0.0], [0.0, 1.0]]);
        assert_eq!(merged.graph_count(), 2);
    }

    #[test]
    fn merge_empty_list_rejected() {
        let result = GraphObject::merge(&[], ProblemBased::Node, NodeAggregation::Sum);
        assert!(matches!(result, Err(GnnError::InvalidInput(_))));
    }

    #[test]
    fn relabel_keeps_structure() {
        let g = triangle_with_isolated();
        let labels = g.arc_labels().mapv(|v| v * 2.0);
        let relabeled = g
            .relabel(g.nodes().mapv(|v| v / 4.0), labels.view())
            .expect("relabel");
        assert_eq!(relabeled.arc_endpoints(), g.arc_endpoints());
        assert_eq!(relabeled.arcs()[[0, 2]], 1.0);
        assert_eq!(relabeled.nodes()[[3, 0]], 1.0);
        assert_eq!(relabeled.arc_node(), g.arc_node());
    }
}
