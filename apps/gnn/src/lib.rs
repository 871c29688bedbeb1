//! # gnn - THE BINARY
//!
//! Command-line front end over `gnn-core`: graph directory tools, training
//! and leave-k-out runs configured by a TOML experiment file.

pub mod cli;
pub mod config;

pub use config::{DataConfig, ExperimentConfig};
