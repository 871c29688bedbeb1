//! # Engine Primitives
//!
//! Hardcoded constants shared by the graph model, persistence formats and the
//! training loop. They are compiled in and immutable at runtime.

/// Magic bytes for the binary array file header.
///
/// - File Header = Magic Bytes ("GNNA") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"GNNA";

/// Current binary array format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the binary header (magic + version).
pub const HEADER_SIZE: usize = 5;

/// File extension of binary array files.
pub const BINARY_EXTENSION: &str = "bin";

/// File extension of text array files.
pub const TEXT_EXTENSION: &str = "txt";

/// Number of leading arc columns holding node indices (from, to).
pub const ARC_INDEX_COLUMNS: usize = 2;

/// Best validation loss before any validation has happened.
pub const INITIAL_BEST_LOSS: f32 = 1e30;

/// Default number of epochs between two evaluation checkpoints.
pub const DEFAULT_UPDATE_FREQ: usize = 10;

/// Default number of non-improving checkpoints before early stopping.
pub const DEFAULT_MAX_FAILS: usize = 10;

/// Highest accepted `verbose` level of the training loop.
pub const MAX_VERBOSE: u8 = 3;

/// Default step used by central finite-difference gradients.
pub const DEFAULT_FD_EPSILON: f32 = 1e-3;

/// Clipping bound applied to probabilities inside cross-entropy.
pub const PROBABILITY_EPSILON: f32 = 1e-7;

/// Maximum accepted payload of a single binary array file (256 MB).
///
/// Validated BEFORE deserialization.
pub const MAX_ARRAY_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;
