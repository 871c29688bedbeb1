//! # Array Persistence Format
//!
//! Binary and text encodings of the dense arrays a graph directory holds.
//!
//! Binary format: Header (5 bytes) + postcard-serialized array record.
//! - 4 bytes: Magic ("GNNA")
//! - 1 byte: Version
//!
//! Text format: comma-delimited rows, one line per array row, numbers written
//! with a configurable `NumberFormat`.
//!
//! ## Validation
//!
//! - Maximum payload size is checked before deserialization
//! - The header is validated before the payload is parsed
//! - The decoded element count must match the declared shape

use crate::primitives::{self, HEADER_SIZE, MAX_ARRAY_PAYLOAD_SIZE};
use crate::GnnError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes every binary array payload.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), GnnError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GnnError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GnnError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GnnError> {
        if bytes.len() < HEADER_SIZE {
            return Err(GnnError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape + row-major data of one dense array.
#[derive(Debug, Serialize, Deserialize)]
struct ArrayRecord {
    rows: u64,
    cols: u64,
    data: Vec<f32>,
}

// =============================================================================
// BINARY ENCODING
// =============================================================================

/// Serialize an array to bytes (header + payload).
///
/// This is a pure transformation - no file I/O.
pub fn array_to_bytes(array: &Array2<f32>) -> Result<Vec<u8>, GnnError> {
    let record = ArrayRecord {
        rows: array.nrows() as u64,
        cols: array.ncols() as u64,
        data: array.iter().copied().collect(),
    };
    let payload = postcard::to_stdvec(&record)
        .map_err(|e| GnnError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize an array from bytes.
///
/// This is a pure transformation - no file I/O.
pub fn array_from_bytes(bytes: &[u8]) -> Result<Array2<f32>, GnnError> {
    if bytes.len() < HEADER_SIZE {
        return Err(GnnError::SerializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_ARRAY_PAYLOAD_SIZE {
        return Err(GnnError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_ARRAY_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let record: ArrayRecord = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        GnnError::SerializationError(format!("Failed to deserialize array data: {}", e))
    })?;
    let shape = (record.rows as usize, record.cols as usize);
    if shape.0.saturating_mul(shape.1) != record.data.len() {
        return Err(GnnError::SerializationError(format!(
            "Array declares shape {:?} but holds {} values",
            shape,
            record.data.len()
        )));
    }
    Ok(Array2::from_shape_vec(shape, record.data)?)
}

// =============================================================================
// TEXT ENCODING
// =============================================================================

/// How numbers are written in text array files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "style", content = "precision")]
pub enum NumberFormat {
    /// Shortest representation that round-trips exactly.
    #[default]
    Shortest,
    /// Fixed number of decimals.
    Fixed(usize),
    /// Scientific notation with the given mantissa decimals.
    Scientific(usize),
}

impl NumberFormat {
    /// Render one value.
    #[must_use]
    pub fn format(self, value: f32) -> String {
        match self {
            Self::Shortest => format!("{}", value),
            Self::Fixed(precision) => format!("{:.*}", precision, value),
            Self::Scientific(precision) => format!("{:.*e}", precision, value),
        }
    }
}

/// Write an array as comma-delimited text.
pub fn write_text_array<W: Write>(
    writer: W,
    array: &Array2<f32>,
    format: NumberFormat,
) -> Result<(), GnnError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for row in array.rows() {
        csv_writer
            .write_record(row.iter().map(|&v| format.format(v)))
            .map_err(|e| GnnError::SerializationError(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| GnnError::IoError(e.to_string()))
}

/// Read a comma-delimited array; every row must have the same width.
///
/// An empty input yields a (0 × 0) array.
pub fn read_text_array<R: Read>(reader: R) -> Result<Array2<f32>, GnnError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut cols = None;
    let mut rows = 0usize;
    let mut data = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| GnnError::SerializationError(e.to_string()))?;
        for field in &record {
            let value: f32 = field.parse().map_err(|_| {
                GnnError::SerializationError(format!("'{}' is not a number", field))
            })?;
            data.push(value);
        }
        match cols {
            None => cols = Some(record.len()),
            Some(width) if width != record.len() => {
                return Err(GnnError::SerializationError(format!(
                    "row {} has {} values, expected {}",
                    rows,
                    record.len(),
                    width
                )));
            }
            Some(_) => {}
        }
        rows += 1;
    }
    Ok(Array2::from_shape_vec((rows, cols.unwrap_or(0)), data)?)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn header_roundtrip() {
        let header = PersistenceHeader::new();
        let bytes = header.to_bytes();
        let restored = PersistenceHeader::from_bytes(&bytes).expect("parse header");

        assert_eq!(restored.magic, *primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let array = array![[0.1f32, -2.5, 3.0e-8], [1.0, 0.0, f32::MAX]];

        let bytes1 = array_to_bytes(&array).expect("first serialize");
        let restored = array_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = array_to_bytes(&restored).expect("second serialize");

        assert_eq!(restored, array);
        assert_eq!(
            bytes1, bytes2,
            "save -> load -> save must produce identical bytes"
        );
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");

        let result = array_from_bytes(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn text_roundtrip_shortest_is_exact() {
        let array = array![[0.1f32, 1.0 / 3.0], [-7.25, 1e-20]];
        let mut buffer = Vec::new();
        write_text_array(&mut buffer, &array, NumberFormat::Shortest).expect("write");
        let restored = read_text_array(buffer.as_slice()).expect("read");
        assert_eq!(restored, array);
    }

    #[test]
    fn text_fixed_precision_rounds() {
        let array = array![[1.0f32 / 3.0]];
        let mut buffer = Vec::new();
        write_text_array(&mut buffer, &array, NumberFormat::Fixed(2)).expect("write");
        assert_eq!(String::from_utf8_lossy(&buffer).trim(), "0.33");
        let restored = read_text_array(buffer.as_slice()).expect("read");
        assert!((restored[[0, 0]] - 0.33).abs() < 1e-6);
    }

    #[test]
    fn text_scientific_parses_back() {
        assert_eq!(NumberFormat::Scientific(3).format(1234.0), "1.234e3");
        let value: f32 = NumberFormat::Scientific(3).format(1234.0).parse().expect("parse");
        assert_eq!(value, 1234.0);
    }

    #[test]
    fn ragged_text_rejected() {
        let text = "1,2\n3\n";
        assert!(read_text_array(text.as_bytes()).is_err());
    }

    #[test]
    fn empty_text_is_empty_array() {
        let restored = read_text_array("".as_bytes()).expect("read");
        assert_eq!(restored.dim(), (0, 0));
    }
}
