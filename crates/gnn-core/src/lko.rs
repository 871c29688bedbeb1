//! # Leave-K-Out Cross Validation
//!
//! Splits a dataset into K folds, then for every fold trains a fresh copy of
//! a trainer on the remaining folds and tests it on the held-out one.
//!
//! ## Fold construction
//!
//! - `Single`: entity indices are shuffled and cut into K contiguous groups;
//!   every fold is a copy of the graph whose `set_mask` selects one group.
//! - `Flat`: the graph list is shuffled, cut into K groups, each group is
//!   shuffled again and merged into one graph.
//! - `PerClass`: every class list is cut into K groups separately, so each
//!   fold keeps the class frequencies of the whole dataset.
//!
//! With `use_validation` one extra fold is built; the last remaining fold of
//! every split becomes the validation set.

use crate::GnnError;
use crate::graph::GraphObject;
use crate::model::GnnModel;
use crate::normalize::{NormalizeMethod, Splits};
use crate::trainer::{TestOptions, TrainOptions, Trainer};
use crate::{NodeAggregation, ProblemBased};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Input of `leave_k_out`.
#[derive(Debug, Clone, PartialEq)]
pub enum LkoDataset {
    /// One graph, split by entity.
    Single(GraphObject),
    /// Graphs split without regard to their class.
    Flat(Vec<GraphObject>),
    /// One graph list per class; folds keep the class frequencies.
    PerClass(Vec<Vec<GraphObject>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LkoConfig {
    pub number_of_batches: usize,
    /// Reserve one extra fold for early stopping.
    pub use_validation: bool,
    pub seed: Option<u64>,
    pub normalize: NormalizeMethod,
    /// Aggregation of the merged fold graphs.
    pub node_aggregation: NodeAggregation,
    pub acc_classes: bool,
    /// Start every fold from the current weights instead of new ones.
    pub copy_weights: bool,
    pub train: TrainOptions,
    pub pos_label: usize,
}

impl Default for LkoConfig {
    fn default() -> Self {
        Self {
            number_of_batches: 10,
            use_validation: false,
            seed: None,
            normalize: NormalizeMethod::TrainingSet,
            node_aggregation: NodeAggregation::Average,
            acc_classes: false,
            copy_weights: false,
            train: TrainOptions::default(),
            pos_label: 0,
        }
    }
}

/// Test results of every fold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LkoReport {
    /// `(metric key, value of every fold)`; `It` and `Loss` last.
    pub metrics: Vec<(String, Vec<f32>)>,
    /// Per-class accuracies of every fold, when requested.
    pub accuracy_per_class: Option<Vec<Vec<f32>>>,
}

impl LkoReport {
    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.metrics
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Mean over folds.
    pub fn mean(&self, key: &str) -> Option<f32> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(|v| v.iter().sum::<f32>() / v.len() as f32)
    }

    pub fn folds(&self) -> usize {
        self.metrics.first().map_or(0, |(_, v)| v.len())
    }

    fn push(&mut self, values: Vec<(String, f32)>) {
        for (key, value) in values {
            match self.metrics.iter_mut().find(|(k, _)| *k == key) {
                Some((_, column)) => column.push(value),
                None => self.metrics.push((key, vec![value])),
            }
        }
    }
}

/// `items` cut into `parts` contiguous groups; the first `len % parts`
/// groups hold one extra element.
pub fn array_split<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    if parts == 0 {
        return Vec::new();
    }
    let (base, extra) = (items.len() / parts, items.len() % parts);
    let mut groups = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        groups.push(items[start..start + size].to_vec());
        start += size;
    }
    groups
}

/// Build the `folds` fold graphs of a dataset.
pub fn build_folds(
    dataset: &LkoDataset,
    folds: usize,
    problem_based: ProblemBased,
    node_aggregation: NodeAggregation,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<GraphObject>, GnnError> {
    match dataset {
        LkoDataset::Single(graph) => {
            let mut indices: Vec<usize> = (0..graph.entity_count()).collect();
            indices.shuffle(rng);
            array_split(&indices, folds)
                .into_iter()
                .map(|group| {
                    if group.is_empty() {
                        return Err(GnnError::invalid_argument(
                            "number_of_batches",
                            format!("{} folds for {} entities", folds, graph.entity_count()),
                        ));
                    }
                    let mut mask = vec![false; graph.entity_count()];
                    for i in group {
                        mask[i] = true;
                    }
                    let mut fold = graph.clone();
                    fold.set_set_mask(mask)?;
                    Ok(fold)
                })
                .collect()
        }
        LkoDataset::Flat(graphs) => {
            stratified_folds(&[graphs.clone()], folds, problem_based, node_aggregation, rng)
        }
        LkoDataset::PerClass(classes) => {
            stratified_folds(classes, folds, problem_based, node_aggregation, rng)
        }
    }
}

fn stratified_folds(
    classes: &[Vec<GraphObject>],
    folds: usize,
    problem_based: ProblemBased,
    node_aggregation: NodeAggregation,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<GraphObject>, GnnError> {
    let mut classes = classes.to_vec();
    for class in &mut classes {
        class.shuffle(rng);
    }
    classes.shuffle(rng);

    let per_class: Vec<Vec<Vec<GraphObject>>> =
        classes.iter().map(|c| array_split(c, folds)).collect();

    (0..folds)
        .map(|j| {
            let mut fold: Vec<GraphObject> = per_class
                .iter()
                .flat_map(|groups| groups[j].iter().cloned())
                .collect();
            if fold.is_empty() {
                return Err(GnnError::invalid_argument(
                    "number_of_batches",
                    format!("fold {} of {} has no graphs", j + 1, folds),
                ));
            }
            fold.shuffle(rng);
            GraphObject::merge(&fold, problem_based, node_aggregation)
        })
        .collect()
}

/// Cross-validate copies of `trainer` on `dataset`.
pub fn leave_k_out<M: GnnModel>(
    trainer: &Trainer<M>,
    dataset: &LkoDataset,
    config: &LkoConfig,
) -> Result<LkoReport, GnnError> {
    if config.number_of_batches < 2 {
        return Err(GnnError::invalid_argument(
            "number_of_batches",
            format!("{} < 2", config.number_of_batches),
        ));
    }
    config.train.validate()?;

    let mut rng = config
        .seed
        .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
    let total = config.number_of_batches + usize::from(config.use_validation);
    let folds = build_folds(
        dataset,
        total,
        trainer.model().problem_based(),
        config.node_aggregation,
        &mut rng,
    )?;

    let mut report = LkoReport::default();
    let mut accuracies = Vec::new();
    for i in 0..config.number_of_batches {
        let mut training = folds.clone();
        let test = training.remove(i);
        let validation = if config.use_validation {
            training.pop()
        } else {
            None
        };
        let splits = Splits {
            training,
            validation,
            test,
        }
        .normalized(config.normalize)?;

        tracing::info!(
            fold = i + 1,
            folds = config.number_of_batches,
            "Leave-k-out batch"
        );
        let mut fold = trainer.copy(
            config.copy_weights,
            &i.to_string(),
            format!("Batch {}-{}", i + 1, total),
        )?;
        fold.train(
            &splits.training,
            splits.validation.as_ref().map(std::slice::from_ref),
            &config.train,
        )?;
        let result = fold.test(
            std::slice::from_ref(&splits.test),
            &TestOptions {
                class_weights: config.train.class_weights.clone(),
                acc_classes: config.acc_classes,
                pos_label: config.pos_label,
                ..TestOptions::default()
            },
        )?;

        report.push(result.metrics());
        if let Some(acc) = result.accuracy_per_class {
            accuracies.push(acc);
        }
    }
    report.accuracy_per_class = config.acc_classes.then_some(accuracies);
    Ok(report)
}
