//! Integration tests for CLI parsing and command execution.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use gnn_cli::ExperimentConfig;
use gnn_cli::cli::{
    Cli, Commands, GraphArgs, GraphStats, TrainRequest, cmd_convert, cmd_init_config,
    cmd_inspect, cmd_lko, cmd_merge, cmd_train, detect_format, load_dataset, load_dir,
};
use gnn_core::{
    GraphObject, GraphOptions, LkoDataset, NodeAggregation, NumberFormat, ProblemBased,
    StorageFormat,
};
use ndarray::array;
use std::path::{Path, PathBuf};

// =============================================================================
// FIXTURES
// =============================================================================

fn node_args() -> GraphArgs {
    GraphArgs {
        problem: ProblemBased::Node,
        aggregation: NodeAggregation::Average,
    }
}

/// Three-node path plus an isolated fourth node.
fn path_graph(shift: f32) -> GraphObject {
    GraphObject::new(
        array![[0.0, 1.0], [1.0, 2.0]],
        array![[shift], [shift + 1.0], [shift + 2.0], [shift + 3.0]],
        array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
        GraphOptions::new(ProblemBased::Node),
    )
    .unwrap()
}

fn saved_graphs(root: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let dir = root.join(format!("g{}", i));
            path_graph(i as f32).save(&dir).unwrap();
            dir
        })
        .collect()
}

fn tiny_experiment(root: &Path) -> PathBuf {
    let text = format!(
        r#"
[model]
dim_state = 2
state_hidden = [2]
output_hidden = [2]
max_iteration = 5
seed = 3

[train]
epochs = 2
update_freq = 1
verbose = 0

[lko]
number_of_batches = 2
seed = 1

[lko.train]
epochs = 1
update_freq = 1
verbose = 0

[writer]
path = "{}"
"#,
        root.join("writer").display()
    );
    let path = root.join("experiment.toml");
    std::fs::write(&path, text).unwrap();
    path
}

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_parse_inspect_with_graph_args() {
    let cli = Cli::try_parse_from(["gnn", "inspect", "data/g0", "-p", "g", "-a", "sum"]).unwrap();
    match cli.command {
        Commands::Inspect { dir, graph } => {
            assert_eq!(dir, PathBuf::from("data/g0"));
            assert_eq!(graph.problem, ProblemBased::Graph);
            assert_eq!(graph.aggregation, NodeAggregation::Sum);
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_parse_train_lists() {
    let cli = Cli::try_parse_from([
        "gnn", "--json-mode", "train", "-t", "a", "b", "--validation", "v", "--test", "x", "y",
    ])
    .unwrap();
    assert!(cli.json_mode);
    match cli.command {
        Commands::Train {
            training,
            validation,
            test,
            config,
            ..
        } => {
            assert_eq!(training.len(), 2);
            assert_eq!(validation, vec![PathBuf::from("v")]);
            assert_eq!(test.len(), 2);
            assert!(config.is_none());
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_verbose_and_quiet_conflict() {
    assert!(Cli::try_parse_from(["gnn", "-v", "-q", "init-config"]).is_err());
}

#[test]
fn test_train_requires_training_dirs() {
    assert!(Cli::try_parse_from(["gnn", "train"]).is_err());
}

// =============================================================================
// GRAPH COMMAND TESTS
// =============================================================================

#[test]
fn test_graph_stats() {
    let stats = GraphStats::of(&path_graph(0.0));
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.arcs, 2);
    assert_eq!(stats.in_degree_min, 0);
    assert_eq!(stats.in_degree_max, 1);
    assert_eq!(stats.in_degree_mean, 0.5);
    assert_eq!(stats.isolated_nodes, 1);
}

#[test]
fn test_convert_binary_to_text_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let source = saved_graphs(dir.path(), 1).remove(0);
    let text = dir.path().join("text");
    let binary = dir.path().join("binary");

    cmd_convert(&source, &text, "text", None, node_args()).unwrap();
    assert_eq!(detect_format(&text), StorageFormat::Text(NumberFormat::Shortest));
    cmd_convert(&text, &binary, "binary", None, node_args()).unwrap();
    assert_eq!(detect_format(&binary), StorageFormat::Binary);

    assert_eq!(load_dir(&binary, node_args()).unwrap(), path_graph(0.0));
    assert!(cmd_inspect(&text, node_args(), true).is_ok());
}

#[test]
fn test_convert_rejects_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    let source = saved_graphs(dir.path(), 1).remove(0);
    assert!(cmd_convert(&source, &dir.path().join("out"), "xml", None, node_args()).is_err());
}

#[test]
fn test_merge_writes_batch() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = saved_graphs(dir.path(), 3);
    let output = dir.path().join("batch");

    cmd_merge(&inputs, &output, false, node_args(), false).unwrap();
    let batch = load_dir(&output, node_args()).unwrap();
    assert_eq!(batch.node_count(), 12);
    assert_eq!(batch.arc_count(), 6);
}

#[test]
fn test_missing_graph_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(cmd_inspect(&dir.path().join("nope"), node_args(), false).is_err());
}

// =============================================================================
// EXPERIMENT COMMAND TESTS
// =============================================================================

#[test]
fn test_init_config_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.toml");

    cmd_init_config(&path, false).unwrap();
    let written = ExperimentConfig::load(&path).unwrap();
    assert_eq!(written, ExperimentConfig::default());

    assert!(cmd_init_config(&path, false).is_err());
    assert!(cmd_init_config(&path, true).is_ok());
}

#[test]
fn test_train_saves_history() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = saved_graphs(dir.path(), 3);
    let config = tiny_experiment(dir.path());
    let request = TrainRequest {
        training: graphs[..2].to_vec(),
        validation: vec![graphs[2].clone()],
        test: vec![graphs[2].clone()],
        history: None,
    };

    cmd_train(Some(&config), &request, None, true).unwrap();

    let csv = std::fs::read_to_string(dir.path().join("writer").join("history.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Epoch,It Tr,It Va,Loss Tr,Loss Va,Acc Tr,Acc Va,Fail,Best Loss Va")
    );
    assert_eq!(lines.count(), 2);
}

#[test]
fn test_lko_layouts() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = saved_graphs(dir.path(), 4);

    let single = load_dataset(&graphs[..1], "single", node_args()).unwrap();
    assert!(matches!(single, LkoDataset::Single(_)));
    assert!(load_dataset(&graphs, "single", node_args()).is_err());
    assert!(load_dataset(&graphs, "nested", node_args()).is_err());

    let per_class = load_dataset(&[dir.path().to_path_buf()], "per-class", node_args());
    assert!(matches!(per_class, Ok(LkoDataset::PerClass(ref c)) if c[0].len() == 4));
}

#[test]
fn test_lko_runs_flat_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = saved_graphs(dir.path(), 4);
    let config = tiny_experiment(dir.path());

    cmd_lko(Some(&config), &graphs, "flat", Some(0), true).unwrap();
    assert!(dir.path().join("writer").join("0").is_dir());
    assert!(dir.path().join("writer").join("1").is_dir());
}
