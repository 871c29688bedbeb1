//! # Persistence Tests
//!
//! Graph directories written by `save_graph` and read back by `load_graph`:
//! masks, pooled batches, text precision and rejection of foreign files.

use gnn_core::{
    GnnError, GraphObject, GraphOptions, NodeAggregation, NumberFormat, ProblemBased,
    StorageFormat, load_graph, save_graph,
};
use ndarray::array;
use std::fs;

fn labelled(problem_based: ProblemBased, target: f32) -> GraphObject {
    let targets = match problem_based {
        ProblemBased::Graph => array![[target, 1.0 - target]],
        _ => array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0]],
    };
    GraphObject::new(
        array![[0.0, 1.0, 0.25], [1.0, 2.0, 0.5], [2.0, 0.0, 0.75]],
        array![[0.1, 1.0], [0.2, 2.0], [0.3, 3.0]],
        targets,
        GraphOptions::new(problem_based),
    )
    .expect("graph")
}

#[test]
fn masks_survive_binary_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("masked");
    let g = GraphObject::new(
        array![[0.0, 1.0, 0.25], [1.0, 2.0, 0.5], [2.0, 0.0, 0.75]],
        array![[0.1, 1.0], [0.2, 2.0], [0.3, 3.0]],
        array![[1.0, 0.0], [0.0, 1.0]],
        GraphOptions::new(ProblemBased::Node)
            .with_set_mask(vec![true, true, false])
            .with_output_mask(vec![false, true, true]),
    )
    .expect("graph");

    g.save(&path).expect("save");
    let mut files: Vec<String> = fs::read_dir(&path)
        .expect("listing")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        ["arcs.bin", "nodes.bin", "output_mask.bin", "set_mask.bin", "targets.bin"]
    );

    let loaded = GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Average).expect("load");
    assert_eq!(loaded, g);
    // one flag per output-masked node
    assert_eq!(loaded.target_mask(), vec![true, false]);
}

#[test]
fn merged_graph_batch_keeps_its_pooling_matrix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("batch");
    let batch = GraphObject::merge(
        &[
            labelled(ProblemBased::Graph, 1.0),
            labelled(ProblemBased::Graph, 0.0),
        ],
        ProblemBased::Graph,
        NodeAggregation::Average,
    )
    .expect("merge");
    assert_eq!(batch.graph_count(), 2);

    save_graph(&batch, &path, StorageFormat::Binary).expect("save");
    assert!(path.join("NodeGraph.bin").exists());

    let loaded = load_graph(
        &path,
        StorageFormat::Binary,
        ProblemBased::Graph,
        NodeAggregation::Average,
    )
    .expect("load");
    assert_eq!(loaded.graph_count(), 2);
    assert_eq!(
        loaded.node_graph().map(|m| m.to_dense()),
        batch.node_graph().map(|m| m.to_dense())
    );
    assert_eq!(loaded.targets(), batch.targets());
}

#[test]
fn single_graph_problem_omits_pooling_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("single");
    labelled(ProblemBased::Graph, 1.0).save(&path).expect("save");
    assert!(!path.join("NodeGraph.bin").exists());
    let loaded = GraphObject::load(&path, ProblemBased::Graph, NodeAggregation::Average).expect("load");
    assert_eq!(loaded.graph_count(), 1);
}

#[test]
fn fixed_precision_text_rounds_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("text");
    let g = labelled(ProblemBased::Node, 0.0);
    g.save_txt(&path, NumberFormat::Fixed(1)).expect("save");

    let raw = fs::read_to_string(path.join("arcs.txt")).expect("arcs");
    assert_eq!(raw.lines().nth(1), Some("1.0,2.0,0.5"));

    let loaded = GraphObject::load_txt(&path, ProblemBased::Node, NodeAggregation::Average).expect("load");
    assert_eq!(loaded.nodes(), g.nodes());
    assert_eq!(loaded.arc_endpoints(), g.arc_endpoints());
}

#[test]
fn stray_file_aborts_the_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stray");
    labelled(ProblemBased::Node, 0.0).save(&path).expect("save");
    fs::write(path.join("notes.bin"), b"hello").expect("write stray");

    let err = GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Average).unwrap_err();
    assert!(matches!(err, GnnError::UnexpectedFile(p) if p.ends_with("notes.bin")));
}

#[test]
fn text_files_are_foreign_to_binary_loads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mixed");
    labelled(ProblemBased::Node, 0.0)
        .save_txt(&path, NumberFormat::Shortest)
        .expect("save");
    let err = GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Average).unwrap_err();
    assert!(matches!(err, GnnError::UnexpectedFile(_)));
}

#[test]
fn missing_targets_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("partial");
    labelled(ProblemBased::Node, 0.0).save(&path).expect("save");
    fs::remove_file(path.join("targets.bin")).expect("remove");

    let err = GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Average).unwrap_err();
    assert!(matches!(err, GnnError::MissingFile(p) if p.ends_with("targets.bin")));
}

#[test]
fn saving_wipes_previous_contents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reused");
    fs::create_dir_all(&path).expect("mkdir");
    fs::write(path.join("old.txt"), b"stale").expect("write");

    labelled(ProblemBased::Node, 0.0).save(&path).expect("save");
    assert!(!path.join("old.txt").exists());
    assert!(GraphObject::load(&path, ProblemBased::Node, NodeAggregation::Sum).is_ok());
}
