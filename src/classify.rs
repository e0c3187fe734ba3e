//! Two-condition classification.
//!
//! A [`PatternClassifier`] is the injected classification function: it gets
//! training vectors with labels and test vectors, and returns one predicted
//! label per test vector (`None` when it cannot decide).  Options live in the
//! classifier value itself.
//!
//! [`score_binary`] turns predictions into per-condition accuracy.
use ndarray::{Array2, ArrayView2};

use crate::stats;

/// Identity tag of a classifier; selects the default dimension recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    /// Nearest class mean by correlation.
    Correlation,
    /// Nearest class mean by distance.
    Distance,
    /// Representational similarity analysis.
    Rsa,
    /// Anything else supplied by the caller.
    Custom,
}

/// Injected classification function for the two-condition path.
pub trait PatternClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Custom
    }

    /// Predict a label for every row of `test`.
    ///
    /// `train` has one row per entry of `train_labels`.  Errors abort the
    /// whole cross-validation run.
    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>>;
}

impl<F> PatternClassifier for F
where
    F: Fn(ArrayView2<'_, f64>, &[String], ArrayView2<'_, f64>) -> anyhow::Result<Vec<Option<String>>>,
{
    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>> {
        self(train, train_labels, test)
    }
}

/// Assigns the label of the training class mean most correlated with each
/// test vector.  Ties go to the class seen first in the training labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationClassifier;

/// Assigns the label of the nearest training class mean (Euclidean).
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceClassifier;

impl PatternClassifier for CorrelationClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Correlation
    }

    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>> {
        nearest_mean(train, train_labels, test, |a, b| stats::pearson(a, b))
    }
}

impl PatternClassifier for DistanceClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Distance
    }

    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>> {
        nearest_mean(train, train_labels, test, |a, b| -stats::euclidean(a, b))
    }
}

/// Per-class means in first-seen label order.
pub fn class_means(train: ArrayView2<'_, f64>, labels: &[String]) -> anyhow::Result<(Vec<String>, Array2<f64>)> {
    anyhow::ensure!(
        train.nrows() == labels.len(),
        "{} training rows but {} labels",
        train.nrows(),
        labels.len()
    );
    let mut classes: Vec<String> = Vec::new();
    for l in labels {
        if !classes.contains(l) {
            classes.push(l.clone());
        }
    }
    let mut means = Array2::<f64>::from_elem((classes.len(), train.ncols()), f64::NAN);
    for (ci, c) in classes.iter().enumerate() {
        for f in 0..train.ncols() {
            let col = labels
                .iter()
                .zip(train.column(f))
                .filter(|(l, _)| *l == c)
                .map(|(_, &v)| v);
            means[[ci, f]] = crate::summarize::nan_mean(col);
        }
    }
    Ok((classes, means))
}

/// Highest-scoring class mean per test row; `score` is "bigger is closer".
fn nearest_mean<S>(
    train: ArrayView2<'_, f64>,
    labels: &[String],
    test: ArrayView2<'_, f64>,
    score: S,
) -> anyhow::Result<Vec<Option<String>>>
where
    S: Fn(&[f64], &[f64]) -> f64,
{
    anyhow::ensure!(
        train.ncols() == test.ncols(),
        "training has {} features, test has {}",
        train.ncols(),
        test.ncols()
    );
    let (classes, means) = class_means(train, labels)?;
    let means: Vec<Vec<f64>> = means.rows().into_iter().map(|r| r.to_vec()).collect();
    Ok(test
        .rows()
        .into_iter()
        .map(|row| {
            let row = row.to_vec();
            let mut best: Option<(usize, f64)> = None;
            for (ci, m) in means.iter().enumerate() {
                let s = score(&row, m);
                if s.is_nan() {
                    continue;
                }
                if best.map_or(true, |(_, b)| s > b) {
                    best = Some((ci, s));
                }
            }
            best.map(|(ci, _)| classes[ci].clone())
        })
        .collect())
}

/// Fraction of each condition's test instances predicted correctly.
///
/// `NaN` for a condition without test instances.  Abstentions count as
/// errors.
pub fn score_binary(predicted: &[Option<String>], known: &[String], conditions: &[String]) -> Vec<f64> {
    conditions
        .iter()
        .map(|c| {
            let (hits, n) = known
                .iter()
                .zip(predicted)
                .filter(|(k, _)| *k == c)
                .fold((0usize, 0usize), |(h, n), (k, p)| {
                    (h + usize::from(p.as_ref() == Some(k)), n + 1)
                });
            if n == 0 { f64::NAN } else { hits as f64 / n as f64 }
        })
        .collect()
}
