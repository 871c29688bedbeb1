//! # gnn
//!
//! The command-line binary for state-propagation Graph Neural Networks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              apps/gnn (THE BINARY)           │
//! │                                              │
//! │   ┌──────────────┐      ┌────────────────┐   │
//! │   │     CLI      │      │   Experiment   │   │
//! │   │    (clap)    │      │  config (toml) │   │
//! │   └──────┬───────┘      └───────┬────────┘   │
//! │          └──────────┬───────────┘            │
//! │                     ▼                        │
//! │             ┌───────────────┐                │
//! │             │   gnn-core    │                │
//! │             │ (THE ENGINE)  │                │
//! │             └───────────────┘                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! gnn init-config experiment.toml
//! gnn inspect data/graph0 --problem g
//! gnn train -c experiment.toml -t data/tr0 data/tr1 --validation data/va --test data/te
//! gnn lko -c experiment.toml --layout per-class data/class0 data/class1
//! ```

use clap::Parser;
use gnn_cli::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // GNN_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("GNN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gnn=info,gnn_cli=info,gnn_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
