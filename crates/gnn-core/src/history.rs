//! # Training History
//!
//! Append-only record of every evaluation checkpoint of a training run.
//!
//! Columns, in order:
//!
//! ```text
//! Epoch | It Tr | It Va | Loss Tr | Loss Va | <m> Tr | <m> Va ... | Fail | Best Loss Va
//! ```
//!
//! The `Va` columns, `Fail` and `Best Loss Va` only exist when the first
//! training run was given a validation set.

use crate::GnnError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Per-split sequences (one entry per checkpoint).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SplitHistory {
    pub iterations: Vec<usize>,
    pub loss: Vec<f32>,
    /// `(metric key, values)` in registry order.
    pub metrics: Vec<(String, Vec<f32>)>,
}

impl SplitHistory {
    fn with_keys(keys: &[String]) -> Self {
        Self {
            iterations: Vec::new(),
            loss: Vec::new(),
            metrics: keys.iter().map(|k| (k.clone(), Vec::new())).collect(),
        }
    }

    /// Append one checkpoint; `metrics` must follow the key order.
    pub fn push(
        &mut self,
        iterations: usize,
        loss: f32,
        metrics: &[(String, f32)],
    ) -> Result<(), GnnError> {
        let keys_match = metrics.len() == self.metrics.len()
            && metrics
                .iter()
                .zip(&self.metrics)
                .all(|((k, _), (key, _))| k == key);
        if !keys_match {
            return Err(GnnError::InvalidInput(
                "metric keys differ from the history columns".to_string(),
            ));
        }
        self.iterations.push(iterations);
        self.loss.push(loss);
        for ((_, value), (_, values)) in metrics.iter().zip(&mut self.metrics) {
            values.push(*value);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }
}

/// The history of one model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<usize>,
    pub training: SplitHistory,
    pub validation: Option<SplitHistory>,
    pub fails: Vec<usize>,
    pub best_loss_va: Vec<f32>,
}

impl History {
    /// Empty history with columns for `metric_keys`.
    #[must_use]
    pub fn new(metric_keys: &[String], with_validation: bool) -> Self {
        Self {
            epochs: Vec::new(),
            training: SplitHistory::with_keys(metric_keys),
            validation: with_validation.then(|| SplitHistory::with_keys(metric_keys)),
            fails: Vec::new(),
            best_loss_va: Vec::new(),
        }
    }

    /// True before the first checkpoint has been allocated.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty() && self.training.metrics.is_empty() && self.validation.is_none()
    }

    pub fn last_epoch(&self) -> Option<usize> {
        self.epochs.last().copied()
    }

    pub fn last_best_loss(&self) -> Option<f32> {
        self.best_loss_va.last().copied()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    fn validation_columns(&self) -> bool {
        self.validation.is_some()
    }

    /// Column names and their stringified values.
    pub fn columns(&self) -> Vec<(String, Vec<String>)> {
        let fmt_f = |v: &Vec<f32>| v.iter().map(|x| format!("{}", x)).collect::<Vec<_>>();
        let fmt_u = |v: &Vec<usize>| v.iter().map(usize::to_string).collect::<Vec<_>>();

        let mut columns = vec![("Epoch".to_string(), fmt_u(&self.epochs))];
        let splits: Vec<(&str, &SplitHistory)> = std::iter::once(("Tr", &self.training))
            .chain(self.validation.as_ref().map(|v| ("Va", v)))
            .collect();

        for (suffix, split) in &splits {
            columns.push((format!("It {}", suffix), fmt_u(&split.iterations)));
        }
        for (suffix, split) in &splits {
            columns.push((format!("Loss {}", suffix), fmt_f(&split.loss)));
        }
        for (i, (key, _)) in self.training.metrics.iter().enumerate() {
            for (suffix, split) in &splits {
                let values = split.metrics.get(i).map(|(_, v)| fmt_f(v)).unwrap_or_default();
                columns.push((format!("{} {}", key, suffix), values));
            }
        }
        if self.validation_columns() {
            columns.push(("Fail".to_string(), fmt_u(&self.fails)));
            columns.push(("Best Loss Va".to_string(), fmt_f(&self.best_loss_va)));
        }
        columns
    }

    /// Delimited text: one header row, one row per checkpoint.
    pub fn save_csv(&self, path: &Path) -> Result<(), GnnError> {
        let columns = self.columns();
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| GnnError::IoError(e.to_string()))?;
        writer
            .write_record(columns.iter().map(|(name, _)| name))
            .map_err(|e| GnnError::SerializationError(e.to_string()))?;
        for row in 0..self.len() {
            writer
                .write_record(
                    columns
                        .iter()
                        .map(|(_, values)| values.get(row).map_or("", String::as_str)),
                )
                .map_err(|e| GnnError::SerializationError(e.to_string()))?;
        }
        writer.flush().map_err(|e| GnnError::IoError(e.to_string()))
    }

    /// Right-aligned fixed-width table.
    pub fn to_table(&self) -> String {
        let columns = self.columns();
        let widths: Vec<usize> = columns
            .iter()
            .map(|(name, values)| {
                values
                    .iter()
                    .map(String::len)
                    .chain(std::iter::once(name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut table = String::new();
        let header: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|((name, _), w)| format!("{:>w$}", name, w = w))
            .collect();
        let _ = writeln!(table, "{}", header.join("  "));
        for row in 0..self.len() {
            let cells: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|((_, values), w)| {
                    format!("{:>w$}", values.get(row).map_or("", String::as_str), w = w)
                })
                .collect();
            let _ = writeln!(table, "{}", cells.join("  "));
        }
        table
    }

    /// Write `to_table` into a text file.
    pub fn save_txt(&self, path: &Path) -> Result<(), GnnError> {
        std::fs::write(path, self.to_table())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["Acc".to_string()]
    }

    fn recorded() -> History {
        let mut h = History::new(&keys(), true);
        for e in 0..3 {
            h.epochs.push(e);
            h.training
                .push(4, 0.5, &[("Acc".to_string(), 0.75)])
                .expect("tr");
            if let Some(va) = h.validation.as_mut() {
                va.push(5, 0.6, &[("Acc".to_string(), 0.5)]).expect("va");
            }
            h.fails.push(e);
            h.best_loss_va.push(0.6);
        }
        h
    }

    #[test]
    fn column_order_interleaves_splits() {
        let names: Vec<String> = recorded().columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "Epoch", "It Tr", "It Va", "Loss Tr", "Loss Va", "Acc Tr", "Acc Va", "Fail",
                "Best Loss Va"
            ]
        );
    }

    #[test]
    fn training_only_has_no_validation_columns() {
        let h = History::new(&keys(), false);
        let names: Vec<String> = h.columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Epoch", "It Tr", "Loss Tr", "Acc Tr"]);
        assert!(!h.is_empty());
        assert!(History::default().is_empty());
    }

    #[test]
    fn push_rejects_unknown_metrics() {
        let mut h = History::new(&keys(), false);
        assert!(h.training.push(1, 0.1, &[("Fs".to_string(), 0.2)]).is_err());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.csv");
        recorded().save_csv(&path).expect("save");
        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Epoch,It Tr,It Va"));
        assert_eq!(lines[3], "2,4,5,0.5,0.6,0.75,0.5,2,0.6");
    }

    #[test]
    fn table_is_aligned() {
        let table = recorded().to_table();
        let widths: Vec<usize> = table.lines().map(str::len).collect();
        assert_eq!(widths.len(), 4);
        assert!(widths.iter().all(|&w| w == widths[0]));
    }
}
