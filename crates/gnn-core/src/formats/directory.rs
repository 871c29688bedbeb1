//! # Graph Directories
//!
//! One persisted graph is one directory holding one array file per attribute:
//!
//! | stem          | required | written when                          |
//! |---------------|----------|---------------------------------------|
//! | `arcs`        | yes      | always                                |
//! | `nodes`       | yes      | always                                |
//! | `targets`     | yes      | always                                |
//! | `set_mask`    | no       | the mask is not all-true              |
//! | `output_mask` | no       | the mask is not all-true              |
//! | `NodeGraph`   | no       | graph-based with more than one target |
//!
//! Saving always deletes and recreates the directory. Loading is driven by
//! the directory listing: a file whose stem or extension is not in the table
//! aborts the load with `UnexpectedFile`.

use super::persistence::{
    NumberFormat, array_from_bytes, array_to_bytes, read_text_array, write_text_array,
};
use crate::graph::{GraphObject, GraphOptions};
use crate::primitives::{BINARY_EXTENSION, TEXT_EXTENSION};
use crate::sparse::SparseMatrix;
use crate::{GnnError, NodeAggregation, ProblemBased};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk encoding of a graph directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageFormat {
    /// Header + postcard array files (`.bin`).
    #[default]
    Binary,
    /// Comma-delimited text array files (`.txt`).
    Text(NumberFormat),
}

impl StorageFormat {
    /// File extension used by this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Binary => BINARY_EXTENSION,
            Self::Text(_) => TEXT_EXTENSION,
        }
    }
}

/// Attributes a graph directory may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum GraphFile {
    Arcs,
    Nodes,
    Targets,
    SetMask,
    OutputMask,
    NodeGraph,
}

impl GraphFile {
    const fn stem(self) -> &'static str {
        match self {
            Self::Arcs => "arcs",
            Self::Nodes => "nodes",
            Self::Targets => "targets",
            Self::SetMask => "set_mask",
            Self::OutputMask => "output_mask",
            Self::NodeGraph => "NodeGraph",
        }
    }

    fn from_stem(stem: &str) -> Option<Self> {
        [
            Self::Arcs,
            Self::Nodes,
            Self::Targets,
            Self::SetMask,
            Self::OutputMask,
            Self::NodeGraph,
        ]
        .into_iter()
        .find(|f| f.stem() == stem)
    }
}

// =============================================================================
// SAVE
// =============================================================================

/// Persist `graph` into `dir`, wiping whatever the directory held before.
pub fn save_graph(graph: &GraphObject, dir: &Path, format: StorageFormat) -> Result<(), GnnError> {
    if dir.exists() {
        tracing::debug!(path = %dir.display(), "removing existing graph directory");
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    write_array(dir, GraphFile::Arcs, graph.arcs(), format)?;
    write_array(dir, GraphFile::Nodes, graph.nodes(), format)?;
    write_array(dir, GraphFile::Targets, graph.targets(), format)?;
    if !graph.set_mask().iter().all(|&m| m) {
        write_array(dir, GraphFile::SetMask, &mask_to_column(graph.set_mask()), format)?;
    }
    if !graph.output_mask().iter().all(|&m| m) {
        write_array(
            dir,
            GraphFile::OutputMask,
            &mask_to_column(graph.output_mask()),
            format,
        )?;
    }
    if let Some(node_graph) = graph.node_graph().filter(|_| graph.targets().nrows() > 1) {
        write_array(dir, GraphFile::NodeGraph, &node_graph.to_dense(), format)?;
    }
    Ok(())
}

fn write_array(
    dir: &Path,
    file: GraphFile,
    array: &Array2<f32>,
    format: StorageFormat,
) -> Result<(), GnnError> {
    let path = dir.join(format!("{}.{}", file.stem(), format.extension()));
    match format {
        StorageFormat::Binary => fs::write(&path, array_to_bytes(array)?)?,
        StorageFormat::Text(number_format) => {
            write_text_array(fs::File::create(&path)?, array, number_format)?;
        }
    }
    Ok(())
}

fn mask_to_column(mask: &[bool]) -> Array2<f32> {
    Array2::from_shape_fn((mask.len(), 1), |(i, _)| if mask[i] { 1.0 } else { 0.0 })
}

// =============================================================================
// LOAD
// =============================================================================

/// Load the graph persisted in `dir`.
///
/// # Errors
///
/// - `UnexpectedFile` for any entry that is not one of the known attributes
///   in the requested format
/// - `MissingFile` if `arcs`, `nodes` or `targets` is absent
/// - any construction error of `GraphObject::new`
pub fn load_graph(
    dir: &Path,
    format: StorageFormat,
    problem_based: ProblemBased,
    node_aggregation: NodeAggregation,
) -> Result<GraphObject, GnnError> {
    let mut arrays: BTreeMap<GraphFile, Array2<f32>> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let file = classify(&path, format)?;
        arrays.insert(file, read_array(&path, format)?);
    }

    let mut take_required = |file: GraphFile| {
        arrays.remove(&file).ok_or_else(|| {
            GnnError::MissingFile(dir.join(format!("{}.{}", file.stem(), format.extension())))
        })
    };
    let arcs = take_required(GraphFile::Arcs)?;
    let nodes = take_required(GraphFile::Nodes)?;
    let targets = take_required(GraphFile::Targets)?;

    let options = GraphOptions {
        problem_based,
        node_aggregation,
        set_mask: arrays.get(&GraphFile::SetMask).map(column_to_mask),
        output_mask: arrays.get(&GraphFile::OutputMask).map(column_to_mask),
        node_graph: arrays.get(&GraphFile::NodeGraph).map(SparseMatrix::from_dense),
        arc_node: None,
    };
    GraphObject::new(normalize_empty(arcs), nodes, targets, options)
}

/// Map a directory entry onto the attribute it stores.
fn classify(path: &Path, format: StorageFormat) -> Result<GraphFile, GnnError> {
    let unexpected = || GnnError::UnexpectedFile(PathBuf::from(path));
    if !path.is_file() {
        return Err(unexpected());
    }
    let extension = path.extension().and_then(|e| e.to_str());
    if extension != Some(format.extension()) {
        return Err(unexpected());
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(GraphFile::from_stem)
        .ok_or_else(unexpected)
}

fn read_array(path: &Path, format: StorageFormat) -> Result<Array2<f32>, GnnError> {
    match format {
        StorageFormat::Binary => array_from_bytes(&fs::read(path)?),
        StorageFormat::Text(_) => read_text_array(fs::File::open(path)?),
    }
}

fn column_to_mask(array: &Array2<f32>) -> Vec<bool> {
    array.iter().map(|&v| v != 0.0).collect()
}

/// An empty text file reads back as (0 × 0); arcs keep their index columns.
fn normalize_empty(arcs: Array2<f32>) -> Array2<f32> {
    if arcs.nrows() == 0 && arcs.ncols() == 0 {
        Array2::zeros((0, crate::primitives::ARC_INDEX_COLUMNS))
    } else {
        arcs
    }
}

// =============================================================================
// GRAPH OBJECT SHORTHANDS
// =============================================================================

impl GraphObject {
    /// Save as binary array files.
    pub fn save(&self, dir: &Path) -> Result<(), GnnError> {
        save_graph(self, dir, StorageFormat::Binary)
    }

    /// Save as comma-delimited text files.
    pub fn save_txt(&self, dir: &Path, number_format: NumberFormat) -> Result<(), GnnError> {
        save_graph(self, dir, StorageFormat::Text(number_format))
    }

    /// Load a binary graph directory.
    pub fn load(
        dir: &Path,
        problem_based: ProblemBased,
        node_aggregation: NodeAggregation,
    ) -> Result<Self, GnnError> {
        load_graph(dir, StorageFormat::Binary, problem_based, node_aggregation)
    }

    /// Load a text graph directory.
    pub fn load_txt(
        dir: &Path,
        problem_based: ProblemBased,
        node_aggregation: NodeAggregation,
    ) -> Result<Self, GnnError> {
        load_graph(
            dir,
            StorageFormat::Text(NumberFormat::default()),
            problem_based,
            node_aggregation,
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
