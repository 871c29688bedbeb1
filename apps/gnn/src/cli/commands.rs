//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::GraphArgs;
use crate::config::ExperimentConfig;
use gnn_core::{
    GnnError, GraphObject, LkoDataset, NumberFormat, ProblemBased, StorageFormat, TestOptions,
    leave_k_out, load_graph, primitives::TEXT_EXTENSION, save_graph,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// GRAPH DIRECTORY HELPERS
// =============================================================================

/// Text when the directory holds `arcs.txt`, binary otherwise.
pub fn detect_format(dir: &Path) -> StorageFormat {
    if dir.join(format!("arcs.{}", TEXT_EXTENSION)).is_file() {
        StorageFormat::Text(NumberFormat::Shortest)
    } else {
        StorageFormat::Binary
    }
}

/// Load one graph directory in whichever format it was written.
pub fn load_dir(dir: &Path, args: GraphArgs) -> Result<GraphObject, GnnError> {
    if !dir.is_dir() {
        return Err(GnnError::IoError(format!(
            "Graph directory '{}' does not exist",
            dir.display()
        )));
    }
    load_graph(dir, detect_format(dir), args.problem, args.aggregation)
}

pub fn load_dirs(dirs: &[PathBuf], args: GraphArgs) -> Result<Vec<GraphObject>, GnnError> {
    dirs.iter().map(|d| load_dir(d, args)).collect()
}

/// Load every graph directory directly under `parent`, sorted by name.
pub fn load_children(parent: &Path, args: GraphArgs) -> Result<Vec<GraphObject>, GnnError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    if dirs.is_empty() {
        return Err(GnnError::InvalidInput(format!(
            "'{}' holds no graph directories",
            parent.display()
        )));
    }
    load_dirs(&dirs, args)
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig, GnnError> {
    match path {
        Some(path) => ExperimentConfig::load(path),
        None => Ok(ExperimentConfig::default()),
    }
}

fn graph_args(experiment: &ExperimentConfig) -> GraphArgs {
    GraphArgs {
        problem: experiment.model.problem_based,
        aggregation: experiment.data.node_aggregation,
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn metrics_json(metrics: &[(String, f32)]) -> serde_json::Map<String, serde_json::Value> {
    metrics
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::json!(v)))
        .collect()
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Summary printed by `inspect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub problem_based: ProblemBased,
    pub nodes: usize,
    pub arcs: usize,
    pub graphs: usize,
    pub targets: usize,
    pub dim_node_label: usize,
    pub dim_arc_label: usize,
    pub dim_target: usize,
    pub in_degree_min: usize,
    pub in_degree_max: usize,
    pub in_degree_mean: f32,
    /// Nodes with neither incoming nor outgoing arcs.
    pub isolated_nodes: usize,
}

impl GraphStats {
    pub fn of(graph: &GraphObject) -> Self {
        let in_degrees = graph.in_degrees();
        let mut touched = vec![false; graph.node_count()];
        for (from, to) in graph.arc_endpoints() {
            touched[from] = true;
            touched[to] = true;
        }
        let total: usize = in_degrees.iter().sum();
        Self {
            problem_based: graph.problem_based(),
            nodes: graph.node_count(),
            arcs: graph.arc_count(),
            graphs: graph.graph_count(),
            targets: graph.targets().nrows(),
            dim_node_label: graph.dim_node_label(),
            dim_arc_label: graph.dim_arc_label(),
            dim_target: graph.dim_target(),
            in_degree_min: in_degrees.iter().copied().min().unwrap_or(0),
            in_degree_max: in_degrees.iter().copied().max().unwrap_or(0),
            in_degree_mean: total as f32 / in_degrees.len().max(1) as f32,
            isolated_nodes: touched.iter().filter(|&&t| !t).count(),
        }
    }
}

/// Show graph statistics.
pub fn cmd_inspect(dir: &Path, args: GraphArgs, json_mode: bool) -> Result<(), GnnError> {
    let graph = load_dir(dir, args)?;
    let stats = GraphStats::of(&graph);

    if json_mode {
        print_json(&stats);
        return Ok(());
    }

    println!("Graph {}", dir.display());
    println!("==================");
    println!("Problem:        {}", stats.problem_based);
    println!("Nodes:          {}", stats.nodes);
    println!("Arcs:           {}", stats.arcs);
    println!("Graphs:         {}", stats.graphs);
    println!("Target rows:    {}", stats.targets);
    println!(
        "Label dims:     node {}, arc {}, target {}",
        stats.dim_node_label, stats.dim_arc_label, stats.dim_target
    );
    println!(
        "In-degree:      min {}, max {}, mean {:.3}",
        stats.in_degree_min, stats.in_degree_max, stats.in_degree_mean
    );
    println!("Isolated nodes: {}", stats.isolated_nodes);

    Ok(())
}

// =============================================================================
// CONVERT / MERGE COMMANDS
// =============================================================================

/// Rewrite a graph directory in another format.
pub fn cmd_convert(
    input: &Path,
    output: &Path,
    to: &str,
    precision: Option<usize>,
    args: GraphArgs,
) -> Result<(), GnnError> {
    let format = match to {
        "binary" | "bin" => StorageFormat::Binary,
        "text" | "txt" => StorageFormat::Text(
            precision.map_or(NumberFormat::Shortest, NumberFormat::Fixed),
        ),
        _ => {
            return Err(GnnError::invalid_argument(
                "to",
                format!("unknown format '{}'. Use: binary, text", to),
            ));
        }
    };

    let graph = load_dir(input, args)?;
    save_graph(&graph, output, format)?;
    println!("Converted {} -> {}", input.display(), output.display());
    Ok(())
}

/// Merge several graph directories into one.
pub fn cmd_merge(
    inputs: &[PathBuf],
    output: &Path,
    text: bool,
    args: GraphArgs,
    json_mode: bool,
) -> Result<(), GnnError> {
    let graphs = load_dirs(inputs, args)?;
    let merged = GraphObject::merge(&graphs, args.problem, args.aggregation)?;
    let format = if text {
        StorageFormat::Text(NumberFormat::Shortest)
    } else {
        StorageFormat::Binary
    };
    save_graph(&merged, output, format)?;

    if json_mode {
        print_json(&GraphStats::of(&merged));
    } else {
        println!(
            "Merged {} graphs ({} nodes, {} arcs) into {}",
            graphs.len(),
            merged.node_count(),
            merged.arc_count(),
            output.display()
        );
    }
    Ok(())
}

// =============================================================================
// TRAIN COMMAND
// =============================================================================

/// Graph directories of one `train` invocation.
#[derive(Debug, Clone, Default)]
pub struct TrainRequest {
    pub training: Vec<PathBuf>,
    pub validation: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
    pub history: Option<PathBuf>,
}

/// Train, save the history CSV and optionally test.
pub fn cmd_train(
    config: Option<&Path>,
    request: &TrainRequest,
    verbosity: Option<u8>,
    json_mode: bool,
) -> Result<(), GnnError> {
    let mut experiment = load_config(config)?;
    if let Some(verbose) = verbosity {
        experiment.train.verbose = verbose;
    }
    let args = graph_args(&experiment);

    let training = load_dirs(&request.training, args)?;
    let example = training
        .first()
        .ok_or_else(|| GnnError::InvalidInput("no training graphs given".to_string()))?;
    let validation = if request.validation.is_empty() {
        None
    } else {
        Some(load_dirs(&request.validation, args)?)
    };

    let mut trainer = experiment.build_trainer(example)?;
    let outcome = trainer.train(&training, validation.as_deref(), &experiment.train)?;

    let history_path = request
        .history
        .clone()
        .unwrap_or_else(|| trainer.writer().path.join("history.csv"));
    let history_path = trainer.save_history_csv(&history_path)?;

    let test = if request.test.is_empty() {
        None
    } else {
        let graphs = load_dirs(&request.test, args)?;
        let options = TestOptions {
            class_weights: experiment.train.class_weights.clone(),
            ..TestOptions::default()
        };
        Some(trainer.test(&graphs, &options)?.metrics())
    };

    if json_mode {
        let output = serde_json::json!({
            "status": outcome.status,
            "last_epoch": outcome.last_epoch,
            "best_loss_va": outcome.best_loss_va,
            "history": history_path.to_string_lossy(),
            "test": test.as_deref().map(metrics_json),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Training finished: {:?}", outcome.status);
    if let Some(epoch) = outcome.last_epoch {
        println!("Last epoch:   {}", epoch);
    }
    if let Some(loss) = outcome.best_loss_va {
        println!("Best Loss Va: {}", loss);
    }
    println!("History:      {}", history_path.display());
    if let Some(metrics) = test {
        println!();
        println!("Test");
        for (key, value) in metrics {
            println!("  {:<6} {}", key, value);
        }
    }
    Ok(())
}

// =============================================================================
// LKO COMMAND
// =============================================================================

/// Build the dataset a `--layout` describes.
pub fn load_dataset(
    dirs: &[PathBuf],
    layout: &str,
    args: GraphArgs,
) -> Result<LkoDataset, GnnError> {
    match layout {
        "single" => match dirs {
            [dir] => Ok(LkoDataset::Single(load_dir(dir, args)?)),
            _ => Err(GnnError::invalid_argument(
                "layout",
                format!("'single' takes one graph directory, got {}", dirs.len()),
            )),
        },
        "flat" => Ok(LkoDataset::Flat(load_dirs(dirs, args)?)),
        "per-class" => Ok(LkoDataset::PerClass(
            dirs.iter()
                .map(|d| load_children(d, args))
                .collect::<Result<_, _>>()?,
        )),
        _ => Err(GnnError::invalid_argument(
            "layout",
            format!("unknown layout '{}'. Use: single, flat, per-class", layout),
        )),
    }
}

fn first_graph(dataset: &LkoDataset) -> Option<&GraphObject> {
    match dataset {
        LkoDataset::Single(g) => Some(g),
        LkoDataset::Flat(gs) => gs.first(),
        LkoDataset::PerClass(classes) => classes.iter().find_map(|c| c.first()),
    }
}

/// Run leave-k-out cross validation.
pub fn cmd_lko(
    config: Option<&Path>,
    dirs: &[PathBuf],
    layout: &str,
    verbosity: Option<u8>,
    json_mode: bool,
) -> Result<(), GnnError> {
    let mut experiment = load_config(config)?;
    if let Some(verbose) = verbosity {
        experiment.lko.train.verbose = verbose;
    }

    let dataset = load_dataset(dirs, layout, graph_args(&experiment))?;
    let example = first_graph(&dataset)
        .ok_or_else(|| GnnError::InvalidInput("dataset holds no graphs".to_string()))?;
    let trainer = experiment.build_trainer(example)?;
    let report = leave_k_out(&trainer, &dataset, &experiment.lko)?;

    if json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("Leave-k-out: {} folds", report.folds());
    println!("==================");
    for (key, values) in &report.metrics {
        println!(
            "{:<6} mean {:.4}  folds {:?}",
            key,
            report.mean(key).unwrap_or(f32::NAN),
            values
        );
    }
    if let Some(per_class) = &report.accuracy_per_class {
        for (fold, accuracies) in per_class.iter().enumerate() {
            println!("Fold {} accuracy per class: {:?}", fold, accuracies);
        }
    }
    Ok(())
}

// =============================================================================
// INIT-CONFIG COMMAND
// =============================================================================

/// Write the default experiment file.
pub fn cmd_init_config(output: &Path, force: bool) -> Result<(), GnnError> {
    if output.exists() && !force {
        return Err(GnnError::invalid_argument(
            "output",
            format!("'{}' already exists. Use --force to overwrite.", output.display()),
        ));
    }
    std::fs::write(output, ExperimentConfig::default().to_toml()?)?;
    println!("Wrote default experiment to {}", output.display());
    Ok(())
}
