//! # Metrics
//!
//! A registry of metrics evaluated on `(y_true, y_pred)` after every
//! evaluation. Built-in metrics are tagged variants keyed by the short names
//! used in history columns (`Acc`, `Fs`, `Mse`, ...); user metrics are
//! registered with `Metric::custom`.
//!
//! Classification metrics work on class labels (arg-max of the one-hot
//! targets and of the scores), regression metrics on the raw vectors.

use crate::GnnError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// PREDICTIONS
// =============================================================================

/// What metrics are evaluated on.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// Classification: true and predicted class indices out of `classes`.
    Labels {
        y_true: Vec<usize>,
        y_pred: Vec<usize>,
        classes: usize,
    },
    /// Regression: true and predicted vectors, one row per example.
    Values {
        y_true: Array2<f32>,
        y_pred: Array2<f32>,
    },
}

impl Predictions {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Labels { y_true, .. } => y_true.len(),
            Self::Values { y_true, .. } => y_true.nrows(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// ARGUMENTS
// =============================================================================

/// How per-class scores are combined into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Score of `pos_label` only.
    Binary,
    /// Unweighted mean over classes.
    #[default]
    Macro,
    /// Pooled counts over classes.
    Micro,
    /// Mean over classes weighted by their support.
    Weighted,
}

/// Extra arguments passed to a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricArgs {
    pub average: Average,
    pub pos_label: usize,
}

/// Serializable selection of a built-in metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub key: String,
    #[serde(default)]
    pub args: MetricArgs,
}

// =============================================================================
// METRIC
// =============================================================================

/// Signature of a user metric.
pub type MetricFn = Arc<dyn Fn(&Predictions, &MetricArgs) -> Result<f32, GnnError> + Send + Sync>;

/// A metric: one of the built-ins or a named user function.
#[derive(Clone)]
pub enum Metric {
    Acc,
    Bacc,
    Ck,
    Js,
    Fs,
    Prec,
    Rec,
    Tpr,
    Tnr,
    Fpr,
    Fnr,
    Mae,
    Mse,
    Rmse,
    Custom { name: String, func: MetricFn },
}

const BUILTIN: [Metric; 14] = [
    Metric::Acc,
    Metric::Bacc,
    Metric::Ck,
    Metric::Js,
    Metric::Fs,
    Metric::Prec,
    Metric::Rec,
    Metric::Tpr,
    Metric::Tnr,
    Metric::Fpr,
    Metric::Fnr,
    Metric::Mae,
    Metric::Mse,
    Metric::Rmse,
];

impl Metric {
    /// Register a user metric under `name`.
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Predictions, &MetricArgs) -> Result<f32, GnnError> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Short key used in history columns.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Acc => "Acc",
            Self::Bacc => "Bacc",
            Self::Ck => "Ck",
            Self::Js => "Js",
            Self::Fs => "Fs",
            Self::Prec => "Prec",
            Self::Rec => "Rec",
            Self::Tpr => "Tpr",
            Self::Tnr => "Tnr",
            Self::Fpr => "Fpr",
            Self::Fnr => "Fnr",
            Self::Mae => "Mae",
            Self::Mse => "Mse",
            Self::Rmse => "Rmse",
            Self::Custom { name, .. } => name.as_str(),
        }
    }

    /// Human readable name used by telemetry.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Acc => "Accuracy",
            Self::Bacc => "Balanced Accuracy",
            Self::Ck => "Cohen's Kappa",
            Self::Js => "Jaccard Score",
            Self::Fs => "F1-Score",
            Self::Prec => "Precision Score",
            Self::Rec => "Recall Score",
            Self::Tpr => "TPR",
            Self::Tnr => "TNR",
            Self::Fpr => "FPR",
            Self::Fnr => "FNR",
            Self::Mae => "Mean Absolute Error",
            Self::Mse => "Mean Squared Error",
            Self::Rmse => "Root Mean Squared Error",
            Self::Custom { name, .. } => name.as_str(),
        }
    }

    /// Telemetry group the metric is reported under.
    #[must_use]
    pub fn namescope(&self) -> &'static str {
        match self {
            Self::Acc | Self::Bacc => "Accuracy & Loss",
            Self::Fs | Self::Prec | Self::Rec => "F-Score, Precision and Recall",
            Self::Tpr | Self::Tnr | Self::Fpr | Self::Fnr => "Positive and Negative Rates",
            Self::Ck | Self::Js => "Other Scores",
            Self::Mae | Self::Mse | Self::Rmse => "Regression Errors",
            Self::Custom { .. } => "Custom Metrics",
        }
    }

    pub fn evaluate(&self, predictions: &Predictions, args: &MetricArgs) -> Result<f32, GnnError> {
        if let Self::Custom { func, .. } = self {
            return func(predictions, args);
        }
        match predictions {
            Predictions::Labels {
                y_true,
                y_pred,
                classes,
            } => {
                let cm = ConfusionMatrix::new(y_true, y_pred, *classes)?;
                cm.score(self, args)
            }
            Predictions::Values { y_true, y_pred } => regression_score(self, y_true, y_pred),
        }
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            other => f.write_str(other.key()),
        }
    }
}

impl FromStr for Metric {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BUILTIN
            .iter()
            .find(|m| m.key().eq_ignore_ascii_case(s.trim()))
            .cloned()
            .ok_or_else(|| GnnError::invalid_argument("metric", format!("unknown metric '{}'", s)))
    }
}

// =============================================================================
// CLASSIFICATION SCORES
// =============================================================================

/// `matrix[true][pred]` counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

/// One-vs-rest counts of a class.
#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
    tn: usize,
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

impl ConfusionMatrix {
    pub fn new(y_true: &[usize], y_pred: &[usize], classes: usize) -> Result<Self, GnnError> {
        if y_true.len() != y_pred.len() {
            return Err(GnnError::InvalidInput(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        let mut matrix = vec![vec![0; classes]; classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t >= classes || p >= classes {
                return Err(GnnError::InvalidInput(format!(
                    "label {} outside {} classes",
                    t.max(p),
                    classes
                )));
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix })
    }

    pub fn classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    fn counts(&self, class: usize) -> Counts {
        let tp = self.matrix[class][class];
        let fp = self.predicted(class) - tp;
        let fn_ = self.support(class) - tp;
        Counts {
            tp,
            fp,
            fn_,
            tn: self.total() - tp - fp - fn_,
        }
    }

    /// Classes that occur in the true or predicted labels.
    fn present(&self) -> Vec<usize> {
        (0..self.classes())
            .filter(|&c| self.support(c) + self.predicted(c) > 0)
            .collect()
    }

    pub fn accuracy(&self) -> f32 {
        let correct = (0..self.classes()).map(|c| self.matrix[c][c]).sum();
        ratio(correct, self.total())
    }

    /// Correct predictions among the examples of each class.
    pub fn accuracy_per_class(&self) -> Vec<f32> {
        (0..self.classes())
            .map(|c| ratio(self.matrix[c][c], self.support(c)))
            .collect()
    }

    fn balanced_accuracy(&self) -> f32 {
        let recalls: Vec<f32> = (0..self.classes())
            .filter(|&c| self.support(c) > 0)
            .map(|c| ratio(self.matrix[c][c], self.support(c)))
            .collect();
        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f32>() / recalls.len() as f32
        }
    }

    fn cohen_kappa(&self) -> f32 {
        let total = self.total() as f32;
        if total == 0.0 {
            return 0.0;
        }
        let observed = self.accuracy();
        let expected = (0..self.classes())
            .map(|c| self.support(c) as f32 * self.predicted(c) as f32)
            .sum::<f32>()
            / (total * total);
        if (1.0 - expected).abs() < f32::EPSILON {
            0.0
        } else {
            (observed - expected) / (1.0 - expected)
        }
    }

    fn score(&self, metric: &Metric, args: &MetricArgs) -> Result<f32, GnnError> {
        let per_class: fn(Counts) -> f32 = match metric {
            Metric::Acc => return Ok(self.accuracy()),
            Metric::Bacc => return Ok(self.balanced_accuracy()),
            Metric::Ck => return Ok(self.cohen_kappa()),
            Metric::Js => |c| ratio(c.tp, c.tp + c.fp + c.fn_),
            Metric::Fs => |c| ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_),
            Metric::Prec => |c| ratio(c.tp, c.tp + c.fp),
            Metric::Rec | Metric::Tpr => |c| ratio(c.tp, c.tp + c.fn_),
            Metric::Tnr => |c| ratio(c.tn, c.tn + c.fp),
            Metric::Fpr => |c| ratio(c.fp, c.fp + c.tn),
            Metric::Fnr => |c| ratio(c.fn_, c.fn_ + c.tp),
            Metric::Mae | Metric::Mse | Metric::Rmse | Metric::Custom { .. } => {
                return Err(GnnError::invalid_argument(
                    "metric",
                    format!("{} is not a classification metric", metric.key()),
                ));
            }
        };

        match args.average {
            Average::Binary => {
                if args.pos_label >= self.classes() {
                    return Err(GnnError::invalid_argument(
                        "pos_label",
                        format!("{} outside {} classes", args.pos_label, self.classes()),
                    ));
                }
                Ok(per_class(self.counts(args.pos_label)))
            }
            Average::Macro => {
                let present = self.present();
                if present.is_empty() {
                    return Ok(0.0);
                }
                let sum: f32 = present.iter().map(|&c| per_class(self.counts(c))).sum();
                Ok(sum / present.len() as f32)
            }
            Average::Micro => {
                let pooled = (0..self.classes()).map(|c| self.counts(c)).fold(
                    Counts::default(),
                    |acc, c| Counts {
                        tp: acc.tp + c.tp,
                        fp: acc.fp + c.fp,
                        fn_: acc.fn_ + c.fn_,
                        tn: acc.tn + c.tn,
                    },
                );
                Ok(per_class(pooled))
            }
            Average::Weighted => {
                let total = self.total();
                if total == 0 {
                    return Ok(0.0);
                }
                let sum: f32 = (0..self.classes())
                    .map(|c| per_class(self.counts(c)) * self.support(c) as f32)
                    .sum();
                Ok(sum / total as f32)
            }
        }
    }
}

/// Per-class accuracy of a classification.
pub fn accuracy_per_class(
    y_true: &[usize],
    y_pred: &[usize],
    classes: usize,
) -> Result<Vec<f32>, GnnError> {
    Ok(ConfusionMatrix::new(y_true, y_pred, classes)?.accuracy_per_class())
}

// =============================================================================
// REGRESSION SCORES
// =============================================================================

fn regression_score(
    metric: &Metric,
    y_true: &Array2<f32>,
    y_pred: &Array2<f32>,
) -> Result<f32, GnnError> {
    if y_true.dim() != y_pred.dim() {
        return Err(GnnError::ShapeMismatch {
            expected: y_true.dim(),
            found: y_pred.dim(),
        });
    }
    let count = y_true.len().max(1) as f32;
    let squared = || {
        y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p) * (t - p))
            .sum::<f32>()
            / count
    };
    match metric {
        Metric::Mae => Ok(y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).abs())
            .sum::<f32>()
            / count),
        Metric::Mse => Ok(squared()),
        Metric::Rmse => Ok(squared().sqrt()),
        other => Err(GnnError::invalid_argument(
            "metric",
            format!("{} is not a regression metric", other.key()),
        )),
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ordered set of metrics with their arguments.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    entries: Vec<(Metric, MetricArgs)>,
}

impl MetricRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from serialized specs.
    pub fn from_specs(specs: &[MetricSpec]) -> Result<Self, GnnError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec.key.parse()?, spec.args)?;
        }
        Ok(registry)
    }

    /// Add a metric; keys must be unique and must not shadow `It`/`Loss`.
    pub fn register(&mut self, metric: Metric, args: MetricArgs) -> Result<(), GnnError> {
        let key = metric.key();
        if key == "It" || key == "Loss" || self.entries.iter().any(|(m, _)| m.key() == key) {
            return Err(GnnError::invalid_argument(
                "extra_metrics",
                format!("duplicate metric key '{}'", key),
            ));
        }
        self.entries.push((metric, args));
        Ok(())
    }

    pub fn with(mut self, metric: Metric, args: MetricArgs) -> Result<Self, GnnError> {
        self.register(metric, args)?;
        Ok(self)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(m, _)| m.key().to_string()).collect()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.entries.iter().map(|(m, _)| m)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every metric, in registration order.
    pub fn evaluate(&self, predictions: &Predictions) -> Result<Vec<(String, f32)>, GnnError> {
        self.entries
            .iter()
            .map(|(metric, args)| Ok((metric.key().to_string(), metric.evaluate(predictions, args)?)))
            .collect()
    }
}
