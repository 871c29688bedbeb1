//! # ROC and Precision-Recall Curves
//!
//! One-vs-rest curve points computed from one-hot targets and class scores,
//! written as CSV files into a caller-chosen directory:
//!
//! - `roc_class_<k>.csv` (`threshold,fpr,tpr`), plus `roc_micro.csv` on request
//! - `pr_class_<k>.csv` (`threshold,recall,precision,f1`)
//!
//! For two-class problems only the curve of `pos_label` is produced.

use crate::GnnError;
use crate::loss::argmax_rows;
use ndarray::Array2;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub threshold: f32,
    pub fpr: f32,
    pub tpr: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrPoint {
    pub threshold: f32,
    pub recall: f32,
    pub precision: f32,
    pub f1: f32,
}

/// Area per written curve, plus micro/macro aggregates for ROC.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CurveSummary {
    /// `(class, area)` for every written per-class curve.
    pub per_class: Vec<(usize, f32)>,
    pub micro: Option<f32>,
    pub macro_average: Option<f32>,
}

/// Cumulative (true positive, false positive) counts at every distinct
/// threshold, highest score first.
fn sweep(scores: &[f32], positives: &[bool]) -> Vec<(f32, usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = Vec::new();
    let (mut tp, mut fp) = (0, 0);
    for (rank, &i) in order.iter().enumerate() {
        if positives[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(rank + 1)
            .is_none_or(|&next| scores[next] != scores[i]);
        if last_of_tie {
            points.push((scores[i], tp, fp));
        }
    }
    points
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

/// ROC points from `(0, 0)` at an infinite threshold down to `(1, 1)`.
pub fn roc_curve(scores: &[f32], positives: &[bool]) -> Vec<RocPoint> {
    let total_pos = positives.iter().filter(|&&p| p).count();
    let total_neg = positives.len() - total_pos;
    let mut curve = vec![RocPoint {
        threshold: f32::INFINITY,
        fpr: 0.0,
        tpr: 0.0,
    }];
    curve.extend(sweep(scores, positives).into_iter().map(|(threshold, tp, fp)| RocPoint {
        threshold,
        fpr: ratio(fp, total_neg),
        tpr: ratio(tp, total_pos),
    }));
    curve
}

/// Precision-recall points, highest threshold first.
pub fn precision_recall_curve(scores: &[f32], positives: &[bool]) -> Vec<PrPoint> {
    let total_pos = positives.iter().filter(|&&p| p).count();
    sweep(scores, positives)
        .into_iter()
        .map(|(threshold, tp, fp)| {
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, total_pos);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            PrPoint {
                threshold,
                recall,
                precision,
                f1,
            }
        })
        .collect()
}

/// Trapezoidal area under `(x, y)` points ordered by `x`.
pub fn auc(points: &[(f32, f32)]) -> f32 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
        .sum()
}

/// Step-wise area under a precision-recall curve (average precision).
pub fn average_precision(curve: &[PrPoint]) -> f32 {
    let mut previous_recall = 0.0;
    let mut area = 0.0;
    for p in curve {
        area += (p.recall - previous_recall) * p.precision;
        previous_recall = p.recall;
    }
    area
}

fn curve_classes(targets: &Array2<f32>, scores: &Array2<f32>, pos_label: usize) -> Result<Vec<usize>, GnnError> {
    if targets.dim() != scores.dim() {
        return Err(GnnError::ShapeMismatch {
            expected: targets.dim(),
            found: scores.dim(),
        });
    }
    let classes = targets.ncols();
    if pos_label >= classes {
        return Err(GnnError::invalid_argument(
            "pos_label",
            format!("{} outside {} classes", pos_label, classes),
        ));
    }
    Ok(if classes == 2 {
        vec![pos_label]
    } else {
        (0..classes).collect()
    })
}

fn one_vs_rest(targets: &Array2<f32>, scores: &Array2<f32>, class: usize) -> (Vec<f32>, Vec<bool>) {
    let labels = argmax_rows(targets);
    (
        scores.column(class).to_vec(),
        labels.iter().map(|&l| l == class).collect(),
    )
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), GnnError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| GnnError::IoError(e.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| GnnError::SerializationError(e.to_string()))?;
    }
    writer.flush().map_err(|e| GnnError::IoError(e.to_string()))
}

/// Write ROC curves into `dir` and return their areas.
pub fn write_roc(
    targets: &Array2<f32>,
    scores: &Array2<f32>,
    dir: &Path,
    micro_and_macro: bool,
    pos_label: usize,
) -> Result<CurveSummary, GnnError> {
    let classes = curve_classes(targets, scores, pos_label)?;
    fs::create_dir_all(dir)?;

    let mut summary = CurveSummary::default();
    for &class in &classes {
        let (s, p) = one_vs_rest(targets, scores, class);
        let curve = roc_curve(&s, &p);
        write_csv(&dir.join(format!("roc_class_{}.csv", class)), &curve)?;
        let area = auc(&curve.iter().map(|c| (c.fpr, c.tpr)).collect::<Vec<_>>());
        summary.per_class.push((class, area));
    }

    if micro_and_macro {
        let flat_scores: Vec<f32> = scores.iter().copied().collect();
        let flat_positives: Vec<bool> = targets.iter().map(|&t| t > 0.5).collect();
        let curve = roc_curve(&flat_scores, &flat_positives);
        write_csv(&dir.join("roc_micro.csv"), &curve)?;
        summary.micro = Some(auc(&curve.iter().map(|c| (c.fpr, c.tpr)).collect::<Vec<_>>()));
        summary.macro_average = Some(
            summary.per_class.iter().map(|&(_, a)| a).sum::<f32>()
                / summary.per_class.len().max(1) as f32,
        );
    }
    tracing::info!(dir = %dir.display(), areas = ?summary.per_class, "ROC curves written");
    Ok(summary)
}

/// Write precision-recall curves into `dir` and return their average precision.
pub fn write_precision_recall(
    targets: &Array2<f32>,
    scores: &Array2<f32>,
    dir: &Path,
    pos_label: usize,
) -> Result<CurveSummary, GnnError> {
    let classes = curve_classes(targets, scores, pos_label)?;
    fs::create_dir_all(dir)?;

    let mut summary = CurveSummary::default();
    for &class in &classes {
        let (s, p) = one_vs_rest(targets, scores, class);
        let curve = precision_recall_curve(&s, &p);
        write_csv(&dir.join(format!("pr_class_{}.csv", class)), &curve)?;
        summary.per_class.push((class, average_precision(&curve)));
    }
    tracing::info!(dir = %dir.display(), areas = ?summary.per_class, "precision-recall curves written");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn perfect_ranking_has_unit_auc() {
        let curve = roc_curve(&[0.9, 0.8, 0.2, 0.1], &[true, true, false, false]);
        let area = auc(&curve.iter().map(|c| (c.fpr, c.tpr)).collect::<Vec<_>>());
        assert!((area - 1.0).abs() < 1e-6);
        assert_eq!(curve.last().map(|c| (c.fpr, c.tpr)), Some((1.0, 1.0)));
    }

    #[test]
    fn ties_collapse_into_one_point() {
        let curve = roc_curve(&[0.5, 0.5, 0.5], &[true, false, true]);
        assert_eq!(curve.len(), 2);
        let area = auc(&curve.iter().map(|c| (c.fpr, c.tpr)).collect::<Vec<_>>());
        assert!((area - 0.5).abs() < 1e-6);
    }

    #[test]
    fn precision_recall_points() {
        let curve = precision_recall_curve(&[0.9, 0.6, 0.3], &[true, false, true]);
        assert_eq!(curve.len(), 3);
        assert_eq!((curve[0].precision, curve[0].recall), (1.0, 0.5));
        assert!((curve[2].precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((average_precision(&curve) - (0.5 + 0.5 * 2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn binary_problem_writes_pos_label_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let targets = array![[1.0, 0.0], [0.0, 1.0], [0.0, 1.0]];
        let scores = array![[0.8, 0.2], [0.3, 0.7], [0.6, 0.4]];
        let summary = write_roc(&targets, &scores, dir.path(), true, 1).expect("roc");
        assert_eq!(summary.per_class.len(), 1);
        assert!(dir.path().join("roc_class_1.csv").exists());
        assert!(dir.path().join("roc_micro.csv").exists());
        assert!(!dir.path().join("roc_class_0.csv").exists());
    }

    #[test]
    fn multiclass_writes_every_class() {
        let dir = tempfile::tempdir().expect("tempdir");
        let targets = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let scores = targets.clone();
        let summary = write_precision_recall(&targets, &scores, dir.path(), 0).expect("pr");
        assert_eq!(summary.per_class.len(), 3);
        for (_, ap) in summary.per_class {
            assert!((ap - 1.0).abs() < 1e-6);
        }
    }
}
