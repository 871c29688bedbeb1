//! # GNN CLI Module
//!
//! This module implements the command-line interface.
//!
//! ## Available Commands
//!
//! - `inspect` - Show counts, dimensions and degree statistics of a graph
//! - `convert` - Rewrite a graph directory in binary or text format
//! - `merge` - Merge several graph directories into one batch
//! - `train` - Train a model described by a TOML experiment file
//! - `lko` - Leave-k-out cross validation over a dataset
//! - `init-config` - Write the default experiment file

mod commands;

use clap::{Parser, Subcommand};
use gnn_core::{GnnError, NodeAggregation, ProblemBased};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// GNN - state-propagation Graph Neural Networks
///
/// Inspect and convert graph directories, train models and run
/// leave-k-out cross validation.
#[derive(Parser, Debug)]
#[command(name = "gnn")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log training history and per-graph progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Silence training logs
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// How graph directories on the command line are interpreted.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct GraphArgs {
    /// Problem type: n(ode), a(rc) or g(raph)
    #[arg(short, long, default_value = "n")]
    pub problem: ProblemBased,

    /// Node aggregation: sum, average or normalized
    #[arg(short, long, default_value = "average")]
    pub aggregation: NodeAggregation,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show graph statistics
    Inspect {
        /// Graph directory
        dir: PathBuf,

        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Convert a graph directory between binary and text
    Convert {
        /// Source graph directory (format detected from its files)
        input: PathBuf,

        /// Destination directory (wiped before writing)
        output: PathBuf,

        /// Target format (binary, text)
        #[arg(short = 't', long, default_value = "text")]
        to: String,

        /// Decimals for text output (shortest round-trip form when absent)
        #[arg(long)]
        precision: Option<usize>,

        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Merge graph directories into a single batch
    Merge {
        /// Source graph directories, in batch order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Destination directory
        #[arg(short, long)]
        output: PathBuf,

        /// Write the batch as text
        #[arg(long)]
        text: bool,

        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Train a model on graph directories
    Train {
        /// Experiment file (defaults apply when absent)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Training graph directories
        #[arg(short, long, required = true, num_args = 1..)]
        training: Vec<PathBuf>,

        /// Validation graph directories (enables early stopping)
        #[arg(long, num_args = 1..)]
        validation: Vec<PathBuf>,

        /// Test graph directories evaluated after training
        #[arg(long, num_args = 1..)]
        test: Vec<PathBuf>,

        /// History CSV path (defaults to `<writer>/history.csv`)
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Leave-k-out cross validation
    Lko {
        /// Experiment file (defaults apply when absent)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset directories
        #[arg(required = true)]
        dataset: Vec<PathBuf>,

        /// Dataset layout: single, flat or per-class
        #[arg(short, long, default_value = "flat")]
        layout: String,
    },

    /// Write the default experiment file
    InitConfig {
        /// Output file path
        #[arg(default_value = "experiment.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), GnnError> {
    let json_mode = cli.json_mode;
    let verbosity = match (cli.verbose, cli.quiet) {
        (true, _) => Some(3),
        (_, true) => Some(0),
        _ => None,
    };

    match cli.command {
        Commands::Inspect { dir, graph } => cmd_inspect(&dir, graph, json_mode),
        Commands::Convert {
            input,
            output,
            to,
            precision,
            graph,
        } => cmd_convert(&input, &output, &to, precision, graph),
        Commands::Merge {
            inputs,
            output,
            text,
            graph,
        } => cmd_merge(&inputs, &output, text, graph, json_mode),
        Commands::Train {
            config,
            training,
            validation,
            test,
            history,
        } => {
            let request = TrainRequest {
                training,
                validation,
                test,
                history,
            };
            cmd_train(config.as_deref(), &request, verbosity, json_mode)
        }
        Commands::Lko {
            config,
            dataset,
            layout,
        } => cmd_lko(config.as_deref(), &dataset, &layout, verbosity, json_mode),
        Commands::InitConfig { output, force } => cmd_init_config(&output, force),
    }
}
