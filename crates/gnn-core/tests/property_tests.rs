//! # Property-Based Tests
//!
//! Structural invariants of `GraphObject` over random graphs: aggregation
//! coefficients, merge identity and offsets, persistence and deep copies.

use gnn_core::{GraphObject, GraphOptions, NodeAggregation, NumberFormat, ProblemBased};
use ndarray::Array2;
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

/// (node count, arc endpoints, node labels, arc labels).
fn raw_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<f32>, Vec<f32>)> {
    (1usize..12).prop_flat_map(|nodes| {
        (
            Just(nodes),
            vec((0..nodes, 0..nodes), 0..30),
            vec(-10.0f32..10.0, nodes),
        )
            .prop_flat_map(|(nodes, arcs, labels)| {
                let arc_count = arcs.len();
                (
                    Just(nodes),
                    Just(arcs),
                    Just(labels),
                    vec(-1.0f32..1.0, arc_count),
                )
            })
    })
}

fn build(
    (nodes, arcs, labels, arc_labels): &(usize, Vec<(usize, usize)>, Vec<f32>, Vec<f32>),
    aggregation: NodeAggregation,
) -> GraphObject {
    let mut arc_array = Array2::zeros((arcs.len(), 3));
    for (i, &(from, to)) in arcs.iter().enumerate() {
        arc_array[[i, 0]] = from as f32;
        arc_array[[i, 1]] = to as f32;
        arc_array[[i, 2]] = arc_labels[i];
    }
    let node_array = Array2::from_shape_vec((*nodes, 1), labels.clone()).expect("labels");
    let targets = Array2::from_shape_fn((*nodes, 2), |(i, j)| if i % 2 == j { 1.0 } else { 0.0 });
    GraphObject::new(
        arc_array,
        node_array,
        targets,
        GraphOptions::new(ProblemBased::Node).with_aggregation(aggregation),
    )
    .expect("valid graph")
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Average aggregation: every node with incoming arcs receives weights
    /// summing to 1, isolated nodes receive nothing.
    #[test]
    fn average_columns_sum_to_one_or_zero(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Average);
        let sums = g.arc_node().col_sums();
        for (node, degree) in g.in_degrees().into_iter().enumerate() {
            let expected = if degree >= 1 { 1.0 } else { 0.0 };
            prop_assert!((sums[node] - expected).abs() < 1e-5);
        }
    }

    /// Sum aggregation: column sums are exactly the in-degrees.
    #[test]
    fn sum_columns_equal_in_degree(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Sum);
        let sums = g.arc_node().col_sums();
        for (node, degree) in g.in_degrees().into_iter().enumerate() {
            prop_assert_eq!(sums[node], degree as f32);
        }
    }

    /// Normalized aggregation divides by the total arc count.
    #[test]
    fn normalized_entries_divide_by_arc_count(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Normalized);
        let arcs = g.arc_count() as f32;
        for (_, _, value) in g.arc_node().triplets() {
            prop_assert!((value - 1.0 / arcs).abs() < 1e-6);
        }
    }

    /// Merging a single graph reproduces it.
    #[test]
    fn singleton_merge_is_identity(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Average);
        let merged = GraphObject::merge(std::slice::from_ref(&g), ProblemBased::Node, NodeAggregation::Average)
            .expect("merge");
        prop_assert_eq!(merged.arcs(), g.arcs());
        prop_assert_eq!(merged.nodes(), g.nodes());
        prop_assert_eq!(merged.targets(), g.targets());
        prop_assert_eq!(merged.set_mask(), g.set_mask());
        prop_assert_eq!(merged.output_mask(), g.output_mask());
        prop_assert_eq!(merged.arc_node(), g.arc_node());
    }

    /// Arcs of the second graph are shifted by the node count of the first.
    #[test]
    fn merge_offsets_second_graph(a in raw_graph(), b in raw_graph()) {
        let (ga, gb) = (build(&a, NodeAggregation::Sum), build(&b, NodeAggregation::Sum));
        let merged = GraphObject::merge(&[ga.clone(), gb.clone()], ProblemBased::Node, NodeAggregation::Sum)
            .expect("merge");
        prop_assert_eq!(merged.node_count(), ga.node_count() + gb.node_count());

        let endpoints = merged.arc_endpoints();
        let offset = ga.node_count();
        for (i, &(from, to)) in gb.arc_endpoints().iter().enumerate() {
            prop_assert_eq!(endpoints[ga.arc_count() + i], (from + offset, to + offset));
        }
        prop_assert_eq!(&endpoints[..ga.arc_count()], &ga.arc_endpoints()[..]);
    }

    /// Binary persistence is bit exact.
    #[test]
    fn binary_roundtrip_is_exact(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Average);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph");
        g.save(&path).expect("save");
        let loaded = GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Average).expect("load");
        prop_assert_eq!(loaded, g);
    }

    /// Text persistence with shortest formatting is exact as well.
    #[test]
    fn text_roundtrip_is_exact(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Average);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph");
        g.save_txt(&path, NumberFormat::Shortest).expect("save");
        let loaded = GraphObject::load_txt(&path, ProblemBased::Node, NodeAggregation::Average).expect("load");
        // an empty arc file reads back with the index columns only
        if g.arc_count() > 0 {
            prop_assert_eq!(loaded.arcs(), g.arcs());
        } else {
            prop_assert_eq!(loaded.arc_count(), 0);
        }
        prop_assert_eq!(loaded.nodes(), g.nodes());
        prop_assert_eq!(loaded.targets(), g.targets());
    }

    /// Clones own their storage.
    #[test]
    fn clone_is_independent(raw in raw_graph()) {
        let g = build(&raw, NodeAggregation::Average);
        let mut copy = g.clone();
        let mask = vec![false; copy.entity_count()];
        copy.set_set_mask(mask).expect("mask");
        copy.set_arc_node(NodeAggregation::Sum);
        prop_assert!(g.set_mask().iter().all(|&m| m));
        prop_assert_eq!(g.node_aggregation(), NodeAggregation::Average);
        prop_assert_eq!(g.arc_node(), &g.build_arc_node(NodeAggregation::Average));
    }
}
