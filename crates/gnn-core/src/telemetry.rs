//! # Training Telemetry
//!
//! Scalar and histogram events emitted by the training loop, routed to a
//! pluggable `TelemetrySink`. Every event belongs to one `Channel`, and each
//! channel maps to one subdirectory of the writer directory:
//!
//! | Channel     | Directory      | Content                          |
//! |-------------|----------------|----------------------------------|
//! | `Training`  | `Training`     | metric scalars on the training set |
//! | `Validation`| `Validation`   | metric scalars on the validation set |
//! | `NetState`  | `Net - State`  | state network weight histograms  |
//! | `NetOutput` | `Net - Output` | output network weight histograms |

use crate::GnnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Buckets of every histogram summary.
pub const HISTOGRAM_BUCKETS: usize = 10;

/// File every channel directory receives its events in.
pub const EVENTS_FILE: &str = "events.jsonl";

// =============================================================================
// CHANNELS & EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "Training")]
    Training,
    #[serde(rename = "Validation")]
    Validation,
    #[serde(rename = "Net - State")]
    NetState,
    #[serde(rename = "Net - Output")]
    NetOutput,
}

impl Channel {
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Training => "Training",
            Self::Validation => "Validation",
            Self::NetState => "Net - State",
            Self::NetOutput => "Net - Output",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Distribution of a tensor's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// `(lower edge, upper edge, count)`, equal widths from `min` to `max`.
    pub buckets: Vec<(f32, f32, usize)>,
}

impl HistogramSummary {
    #[must_use]
    pub fn from_values(values: &[f32], bucket_count: usize) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                buckets: Vec::new(),
            };
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().sum::<f32>() / values.len() as f32;

        let bucket_count = bucket_count.max(1);
        let width = (max - min) / bucket_count as f32;
        let mut counts = vec![0usize; bucket_count];
        for &v in values {
            let slot = if width > 0.0 {
                (((v - min) / width) as usize).min(bucket_count - 1)
            } else {
                0
            };
            counts[slot] += 1;
        }
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (min + width * i as f32, min + width * (i + 1) as f32, c))
            .collect();

        Self {
            count: values.len(),
            min,
            max,
            mean,
            buckets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Scalar {
        channel: Channel,
        name: String,
        value: f32,
        step: usize,
    },
    Histogram {
        channel: Channel,
        name: String,
        step: usize,
        summary: HistogramSummary,
    },
}

impl TelemetryEvent {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Scalar { channel, .. } | Self::Histogram { channel, .. } => *channel,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::Histogram { name, .. } => name,
        }
    }

    pub fn step(&self) -> usize {
        match self {
            Self::Scalar { step, .. } | Self::Histogram { step, .. } => *step,
        }
    }
}

// =============================================================================
// SINK TRAIT
// =============================================================================

/// Receiver of telemetry events.
pub trait TelemetrySink: fmt::Debug {
    fn record(&mut self, event: TelemetryEvent) -> Result<(), GnnError>;

    /// A sink of the same kind rooted at another writer directory.
    fn fork(&self, root: &Path) -> Box<dyn TelemetrySink>;

    fn scalar(
        &mut self,
        channel: Channel,
        name: &str,
        value: f32,
        step: usize,
    ) -> Result<(), GnnError> {
        self.record(TelemetryEvent::Scalar {
            channel,
            name: name.to_string(),
            value,
            step,
        })
    }

    fn histogram(
        &mut self,
        channel: Channel,
        name: &str,
        values: &[f32],
        step: usize,
    ) -> Result<(), GnnError> {
        self.record(TelemetryEvent::Histogram {
            channel,
            name: name.to_string(),
            step,
            summary: HistogramSummary::from_values(values, HISTOGRAM_BUCKETS),
        })
    }
}

// =============================================================================
// JSON LINES SINK
// =============================================================================

/// Appends events to `<root>/<channel>/events.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    root: PathBuf,
}

impl JsonLinesSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events_path(&self, channel: Channel) -> PathBuf {
        self.root.join(channel.dir_name()).join(EVENTS_FILE)
    }
}

impl TelemetrySink for JsonLinesSink {
    fn record(&mut self, event: TelemetryEvent) -> Result<(), GnnError> {
        let dir = self.root.join(event.channel().dir_name());
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &event)
            .map_err(|e| GnnError::SerializationError(e.to_string()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn fork(&self, root: &Path) -> Box<dyn TelemetrySink> {
        Box::new(Self::new(root))
    }
}

// =============================================================================
// MEMORY SINK
// =============================================================================

/// Keeps events in memory; forks share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, event: TelemetryEvent) -> Result<(), GnnError> {
        self.events
            .lock()
            .map_err(|_| GnnError::IoError("telemetry buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }

    fn fork(&self, _root: &Path) -> Box<dyn TelemetrySink> {
        Box::new(self.clone())
    }
}

// =============================================================================
// WRITER DIRECTORY
// =============================================================================

/// What happens to an existing writer directory when a trainer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterMode {
    /// Delete the directory (logged as a warning).
    #[default]
    Reset,
    /// Keep it and append new events.
    Append,
}

/// Location and policy of the training artifact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub mode: WriterMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::reset("writer")
    }
}

impl WriterConfig {
    pub fn reset(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: WriterMode::Reset,
        }
    }

    pub fn append(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: WriterMode::Append,
        }
    }

    /// Same mode, rooted at `<path>/<suffix>`.
    #[must_use]
    pub fn child(&self, suffix: &str) -> Self {
        Self {
            path: self.path.join(suffix),
            mode: self.mode,
        }
    }

    /// Apply the mode to the directory on disk.
    pub fn prepare(&self) -> Result<(), GnnError> {
        if self.mode == WriterMode::Reset && self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Removing existing writer directory");
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}
