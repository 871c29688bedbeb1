//! # Formats
//!
//! Persistence of graphs and their arrays.
//!
//! - `persistence`: single-array codecs (binary header + postcard, CSV text)
//! - `directory`: one graph per directory, one file per attribute

pub mod directory;
pub mod persistence;

pub use directory::{StorageFormat, load_graph, save_graph};
pub use persistence::{
    NumberFormat, PersistenceHeader, array_from_bytes, array_to_bytes, read_text_array,
    write_text_array,
};
