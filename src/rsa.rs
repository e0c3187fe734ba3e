//! Representational similarity analysis (RSA) classification.
//!
//! For every condition, the mean pattern is computed per replicate (a
//! session of a subject).  Condition means are compared pairwise to give a
//! condition × condition structure: correlations passed through the Fisher z
//! transform in similarity space, raw distances in dissimilarity space.
//! Structures are averaged over replicates.
//!
//! A test structure (held-out subject) is matched against a reference
//! structure (training subjects, or an external model) in one of two ways:
//!
//! * **n-way**: every relabelling of the test conditions is tried and the one
//!   whose lower triangle correlates best with the reference wins.  This is
//!   `n!` work, so at most [`MAX_PERMUTATION_LABELS`] labels are accepted.
//! * **pairwise**: for each pair of conditions, the identity labelling is
//!   compared with the labelling that swaps just that pair.
//!
//! Instances are sorted by label before anything else and predictions are
//! mapped back to the caller's order at the end, so the result does not
//! depend on how the instances were ordered.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{McpaError, Result};
use crate::stats;
use crate::summarize::nan_mean;

/// Largest label count for the exhaustive permutation search.
pub const MAX_PERMUTATION_LABELS: usize = 10;

/// A structure with this few defined off-diagonal cells (or fewer) is treated
/// as empty.
pub const NEAR_EMPTY_CELLS: usize = 8;

/// Tie-break jitter, as a fraction of the smallest gap between test values.
const TIEBREAK_FRACTION: f64 = 0.0099;

// ── Options ───────────────────────────────────────────────────────────────────

/// Pattern comparison measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Pearson correlation (similarity).
    Pearson,
    /// Spearman rank correlation (similarity).
    Spearman,
    /// Euclidean distance.
    Euclidean,
    /// Squared Euclidean distance.
    SqEuclidean,
    /// Manhattan distance.
    Cityblock,
    /// `1 − cos`.
    Cosine,
    /// `1 − Pearson r`.
    Correlation,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::Euclidean => "euclidean",
            Self::SqEuclidean => "sqeuclidean",
            Self::Cityblock => "cityblock",
            Self::Cosine => "cosine",
            Self::Correlation => "correlation",
        }
    }

    /// Whether this is a correlation type (similarity space).
    pub fn is_similarity(self) -> bool {
        matches!(self, Self::Pearson | Self::Spearman)
    }

    pub fn compute(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Pearson => stats::pearson(a, b),
            Self::Spearman => stats::spearman(a, b),
            Self::Euclidean => stats::euclidean(a, b),
            Self::SqEuclidean => stats::euclidean(a, b).powi(2),
            Self::Cityblock => stats::cityblock(a, b),
            Self::Cosine => stats::cosine_distance(a, b),
            Self::Correlation => 1.0 - stats::pearson(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = McpaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            "euclidean" => Ok(Self::Euclidean),
            "sqeuclidean" | "seuclidean" => Ok(Self::SqEuclidean),
            "cityblock" | "manhattan" => Ok(Self::Cityblock),
            "cosine" => Ok(Self::Cosine),
            "correlation" => Ok(Self::Correlation),
            _ => Err(McpaError::UnknownMetric(s.to_string())),
        }
    }
}

/// Options of [`rsa_classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsaOptions {
    /// Correlation-based similarity (`true`) or distance-based dissimilarity.
    pub similarity_space: bool,
    pub metric: Metric,
    /// Pairwise comparisons instead of the n-way permutation search.
    pub pairwise: bool,
    /// Jitter test values to break exact ties in the n-way search.
    pub tiebreak: bool,
    /// 0 = quiet, 1 = log structures, 2 = log every permutation score.
    pub verbose: u8,
    /// Seed of the tie-break jitter.
    pub seed: u64,
}

impl Default for RsaOptions {
    fn default() -> Self {
        Self {
            similarity_space: true,
            metric: Metric::Pearson,
            pairwise: false,
            tiebreak: true,
            verbose: 0,
            seed: 0,
        }
    }
}

impl RsaOptions {
    /// The metric must belong to the selected space.
    pub fn validate(&self) -> Result<()> {
        if self.metric.is_similarity() != self.similarity_space {
            return Err(McpaError::MetricSpace {
                metric: self.metric.to_string(),
                space: if self.similarity_space { "similarity" } else { "dissimilarity" },
            });
        }
        Ok(())
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Labelled patterns, `[instance, feature, replicate]`.
///
/// Replicates are whatever the structures are averaged over: sessions,
/// subjects, or both flattened together.
#[derive(Debug, Clone)]
pub struct RsaInput {
    pub patterns: Array3<f64>,
    pub labels: Vec<String>,
}

impl RsaInput {
    pub fn new(patterns: Array3<f64>, labels: Vec<String>) -> Result<Self> {
        if patterns.len_of(Axis(0)) != labels.len() {
            return Err(McpaError::DimensionMismatch(format!(
                "{} labels for {} instances",
                labels.len(),
                patterns.len_of(Axis(0))
            )));
        }
        Ok(Self { patterns, labels })
    }

    /// Same data with instances reordered by `order`.
    fn reordered(&self, order: &[usize]) -> Self {
        Self {
            patterns: self.patterns.select(Axis(0), order),
            labels: order.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }
}

/// External reference structure used in place of the training data.
#[derive(Debug, Clone)]
pub enum ReferenceModel {
    /// Precomputed condition × condition structure, already in the space
    /// being compared (z-scored similarities or distances).
    Matrix { labels: Vec<String>, matrix: Array2<f64> },
    /// Condition × feature model (e.g. semantic features), turned into a
    /// structure with the configured metric.
    Features { labels: Vec<String>, features: Array2<f64> },
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Outcome of the n-way permutation search.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationResult {
    /// Condition labels in sorted order; indices below refer to this list.
    pub labels: Vec<String>,
    /// `assignment[i]` = label given to test condition `i`.
    pub assignment: Vec<Option<String>>,
    /// Prediction for every test instance, in the caller's order.
    pub predicted: Vec<Option<String>>,
    /// Winning relabelling: test condition `permutation[i]` takes label `i`.
    pub permutation: Vec<usize>,
    /// Correlation of the winning relabelling with the reference.
    pub correlation: f64,
    /// `false` when a structure was (near) empty.
    pub usable: bool,
}

/// One pairwise decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PairComparison {
    pub first: usize,
    pub second: usize,
    /// Labels assigned to (`first`, `second`); `None` when indeterminate.
    pub predicted: Option<(String, String)>,
}

impl PairComparison {
    /// `Some(true)` if the pair kept its own labels, `None` if undecided.
    pub fn is_correct(&self, labels: &[String]) -> Option<bool> {
        self.predicted
            .as_ref()
            .map(|(a, b)| *a == labels[self.first] && *b == labels[self.second])
    }
}

/// Outcome of the pairwise search.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseResult {
    pub labels: Vec<String>,
    /// One entry per unordered pair, `first < second`, lexicographic.
    pub comparisons: Vec<PairComparison>,
    pub usable: bool,
}

/// Result of [`rsa_classify`].
#[derive(Debug, Clone, PartialEq)]
pub enum RsaOutcome {
    Permutation(PermutationResult),
    Pairwise(PairwiseResult),
}

impl RsaOutcome {
    pub fn labels(&self) -> &[String] {
        match self {
            Self::Permutation(p) => &p.labels,
            Self::Pairwise(p) => &p.labels,
        }
    }

    pub fn is_usable(&self) -> bool {
        match self {
            Self::Permutation(p) => p.usable,
            Self::Pairwise(p) => p.usable,
        }
    }

    /// Accuracy cells `((row, col), value)` in label-index space.
    ///
    /// n-way: a confusion row per condition, 1 at the assigned label and 0
    /// elsewhere (all `NaN` if unassigned).  Pairwise: `(i, j)` and `(j, i)`
    /// hold 1 for a correct pair, 0 for a swapped one, `NaN` if undecided.
    pub fn cells(&self) -> Vec<((usize, usize), f64)> {
        match self {
            Self::Permutation(p) => {
                let n = p.labels.len();
                let mut out = Vec::with_capacity(n * n);
                for (i, a) in p.assignment.iter().enumerate() {
                    let j = a.as_ref().and_then(|l| p.labels.iter().position(|x| x == l));
                    for k in 0..n {
                        let v = match j {
                            Some(j) => f64::from(u8::from(j == k)),
                            None => f64::NAN,
                        };
                        out.push(((i, k), v));
                    }
                }
                out
            }
            Self::Pairwise(p) => p
                .comparisons
                .iter()
                .flat_map(|c| {
                    let v = match c.is_correct(&p.labels) {
                        Some(ok) => f64::from(u8::from(ok)),
                        None => f64::NAN,
                    };
                    [((c.first, c.second), v), ((c.second, c.first), v)]
                })
                .collect(),
        }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Classify the test conditions against the training (or reference) structure.
///
/// Errors are configuration errors only; empty data yields an outcome with
/// `usable == false` and no predictions.
pub fn rsa_classify(
    train: &RsaInput,
    test: &RsaInput,
    reference: Option<&ReferenceModel>,
    opts: &RsaOptions,
) -> Result<RsaOutcome> {
    opts.validate()?;

    let labels: Vec<String> = test
        .labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let n = labels.len();
    if n < 2 {
        return Err(McpaError::InvalidConfig(format!("RSA needs at least 2 labels, got {n}")));
    }
    if !opts.pairwise && n > MAX_PERMUTATION_LABELS {
        return Err(McpaError::TooManyLabels { n_labels: n, max: MAX_PERMUTATION_LABELS });
    }
    if train.patterns.len_of(Axis(1)) != test.patterns.len_of(Axis(1)) && reference.is_none() {
        return Err(McpaError::DimensionMismatch(format!(
            "training has {} features, test has {}",
            train.patterns.len_of(Axis(1)),
            test.patterns.len_of(Axis(1))
        )));
    }

    // 1. canonical order
    let test_order = sort_order(&test.labels);
    let test_sorted = test.reordered(&test_order);

    // 2. structures
    let reference_matrix = match reference {
        Some(model) => model_structure(model, &labels, opts)?,
        None => {
            let train_sorted = train.reordered(&sort_order(&train.labels));
            structure(&condition_means(&train_sorted, &labels), opts)
        }
    };
    let mut test_matrix = structure(&condition_means(&test_sorted, &labels), opts);

    if opts.verbose > 0 {
        tracing::debug!(?labels, reference = ?reference_matrix, test = ?test_matrix, "RSA structures");
    }

    // 3. degenerate data
    let usable = !(is_degenerate(&reference_matrix) || is_degenerate(&test_matrix));
    if !usable {
        tracing::warn!(
            n_labels = n,
            "similarity structure is empty or nearly empty (missing session or subject); fold result is unusable"
        );
    }

    // 4. classification
    if opts.pairwise {
        let comparisons = if usable {
            pairwise_comparisons(&reference_matrix, &test_matrix, &labels, opts)
        } else {
            all_pairs(n)
                .map(|(first, second)| PairComparison { first, second, predicted: None })
                .collect()
        };
        return Ok(RsaOutcome::Pairwise(PairwiseResult { labels, comparisons, usable }));
    }

    if opts.tiebreak {
        let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
        jitter_ties(&mut test_matrix, &mut rng);
    }
    let best = if usable { best_permutation(&reference_matrix, &test_matrix, opts.verbose) } else { None };

    let (permutation, correlation, assignment) = match best {
        Some((perm, r)) => {
            let mut assignment = vec![None; n];
            for (label_idx, &cond) in perm.iter().enumerate() {
                assignment[cond] = Some(labels[label_idx].clone());
            }
            (perm, r, assignment)
        }
        None => ((0..n).collect(), f64::NAN, vec![None; n]),
    };

    // 5. restore caller order
    let mut predicted = vec![None; test.labels.len()];
    for (sorted_pos, &orig) in test_order.iter().enumerate() {
        let li = labels.iter().position(|l| *l == test_sorted.labels[sorted_pos]);
        predicted[orig] = li.and_then(|li| assignment[li].clone());
    }

    Ok(RsaOutcome::Permutation(PermutationResult {
        labels,
        assignment,
        predicted,
        permutation,
        correlation,
        usable,
    }))
}

/// Stable argsort of `labels`.
fn sort_order(labels: &[String]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| labels[a].cmp(&labels[b]));
    order
}

/// `[label, feature, replicate]` means over the instances of each label.
pub fn condition_means(input: &RsaInput, labels: &[String]) -> Array3<f64> {
    let (_, n_feat, n_rep) = input.patterns.dim();
    Array3::from_shape_fn((labels.len(), n_feat, n_rep), |(l, f, r)| {
        nan_mean(
            input
                .labels
                .iter()
                .enumerate()
                .filter(|(_, x)| **x == labels[l])
                .map(|(i, _)| input.patterns[[i, f, r]]),
        )
    })
}

/// Replicate-averaged condition × condition structure of `means`.
pub fn structure(means: &Array3<f64>, opts: &RsaOptions) -> Array2<f64> {
    let (n, _, n_rep) = means.dim();
    let per_rep: Vec<Array2<f64>> = (0..n_rep)
        .map(|r| pairwise_matrix(&means.index_axis(Axis(2), r).to_owned(), opts))
        .collect();
    Array2::from_shape_fn((n, n), |(i, j)| nan_mean(per_rep.iter().map(|m| m[[i, j]])))
}

/// Structure of one `[condition, feature]` matrix.
///
/// Similarity cells are Fisher-z transformed; the diagonal is `NaN` in
/// similarity space and 0 in dissimilarity space.
pub fn pairwise_matrix(patterns: &Array2<f64>, opts: &RsaOptions) -> Array2<f64> {
    let n = patterns.nrows();
    let rows: Vec<Vec<f64>> = patterns.rows().into_iter().map(|r| r.to_vec()).collect();
    let mut m = Array2::from_elem((n, n), f64::NAN);
    for i in 0..n {
        if !opts.similarity_space && rows[i].iter().any(|v| !v.is_nan()) {
            m[[i, i]] = 0.0;
        }
        for j in 0..i {
            let v = opts.metric.compute(&rows[i], &rows[j]);
            let v = if opts.similarity_space { stats::fisher_z(v) } else { v };
            // identical condition patterns (r = ±1) carry no usable structure
            let v = if v.is_infinite() { f64::NAN } else { v };
            m[[i, j]] = v;
            m[[j, i]] = v;
        }
    }
    m
}

fn model_structure(model: &ReferenceModel, labels: &[String], opts: &RsaOptions) -> Result<Array2<f64>> {
    let (model_labels, matrix) = match model {
        ReferenceModel::Matrix { labels, matrix } => {
            if matrix.nrows() != matrix.ncols() || matrix.nrows() != labels.len() {
                return Err(McpaError::DimensionMismatch(format!(
                    "reference matrix {:?} for {} labels",
                    matrix.dim(),
                    labels.len()
                )));
            }
            (labels, matrix.clone())
        }
        ReferenceModel::Features { labels, features } => {
            if features.nrows() != labels.len() {
                return Err(McpaError::DimensionMismatch(format!(
                    "reference model has {} rows for {} labels",
                    features.nrows(),
                    labels.len()
                )));
            }
            (labels, pairwise_matrix(features, opts))
        }
    };
    let idx: Vec<Option<usize>> = labels
        .iter()
        .map(|l| model_labels.iter().position(|m| m == l))
        .collect();
    for (l, i) in labels.iter().zip(&idx) {
        if i.is_none() {
            tracing::warn!(label = %l, "label missing from reference model");
        }
    }
    Ok(Array2::from_shape_fn((labels.len(), labels.len()), |(a, b)| match (idx[a], idx[b]) {
        (Some(x), Some(y)) => matrix[[x, y]],
        _ => f64::NAN,
    }))
}

/// Strictly-lower-triangular cells, row-major: `(1,0), (2,0), (2,1), …`.
pub fn lower_triangle(m: &Array2<f64>) -> Vec<f64> {
    let n = m.nrows();
    let mut v = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in 0..i {
            v.push(m[[i, j]]);
        }
    }
    v
}

/// Lower triangle of `m` with conditions relabelled by `perm`.
fn permuted_triangle(m: &Array2<f64>, perm: &[usize]) -> Vec<f64> {
    let mut v = Vec::new();
    permuted_triangle_into(m, perm, &mut v);
    v
}

fn permuted_triangle_into(m: &Array2<f64>, perm: &[usize], out: &mut Vec<f64>) {
    out.clear();
    for i in 0..perm.len() {
        for j in 0..i {
            out.push(m[[perm[i], perm[j]]]);
        }
    }
}

/// Whether `m` has no more than a handful of defined off-diagonal cells.
pub fn is_degenerate(m: &Array2<f64>) -> bool {
    let n = m.nrows();
    let off = n * n - n;
    let defined = m
        .indexed_iter()
        .filter(|((i, j), v)| i != j && v.is_finite())
        .count();
    defined == 0 || defined <= NEAR_EMPTY_CELLS.min(off / 2)
}

/// Advance `p` to the next lexicographic permutation; `false` after the last.
fn next_permutation(p: &mut [usize]) -> bool {
    let Some(i) = (1..p.len()).rev().find(|&i| p[i - 1] < p[i]) else {
        return false;
    };
    let j = (i..p.len()).rev().find(|&j| p[j] > p[i - 1]).unwrap_or(i);
    p.swap(i - 1, j);
    p[i..].reverse();
    true
}

/// Lexicographic walk over every relabelling of a test structure (identity
/// first), scoring each against a reference triangle.
///
/// Holds only the current permutation and one triangle buffer.  [`advance`]
/// borrows the current permutation; the [`Iterator`] impl copies it out.
///
/// [`advance`]: PermutationScores::advance
pub struct PermutationScores<'a> {
    test: &'a Array2<f64>,
    target: Vec<f64>,
    // no NaN on either side: every relabelling pairs complete cells
    dense: bool,
    perm: Vec<usize>,
    triangle: Vec<f64>,
    started: bool,
}

impl<'a> PermutationScores<'a> {
    pub fn new(reference: &Array2<f64>, test: &'a Array2<f64>) -> Self {
        let target = lower_triangle(reference);
        let dense =
            !target.iter().any(|v| v.is_nan()) && !test.indexed_iter().any(|((i, j), v)| i != j && v.is_nan());
        Self {
            test,
            triangle: Vec::with_capacity(target.len()),
            target,
            dense,
            perm: (0..test.nrows()).collect(),
            started: false,
        }
    }

    /// Score the next relabelling; `None` once all have been visited.
    pub fn advance(&mut self) -> Option<(&[usize], f64)> {
        if self.started && !next_permutation(&mut self.perm) {
            return None;
        }
        self.started = true;
        permuted_triangle_into(self.test, &self.perm, &mut self.triangle);
        let r = if self.dense {
            stats::pearson_complete(&self.target, &self.triangle)
        } else {
            stats::pearson(&self.target, &self.triangle)
        };
        Some((&self.perm, r))
    }
}

impl Iterator for PermutationScores<'_> {
    type Item = (Vec<usize>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().map(|(perm, r)| (perm.to_vec(), r))
    }
}

/// Correlation of the reference triangle with every relabelled test triangle,
/// in lexicographic permutation order (identity first).
pub fn permutation_scores<'a>(reference: &Array2<f64>, test: &'a Array2<f64>) -> PermutationScores<'a> {
    PermutationScores::new(reference, test)
}

/// Highest-correlating relabelling; ties keep the first one found.
fn best_permutation(reference: &Array2<f64>, test: &Array2<f64>, verbose: u8) -> Option<(Vec<usize>, f64)> {
    let mut scores = permutation_scores(reference, test);
    let mut best: Option<(Vec<usize>, f64)> = None;
    while let Some((perm, r)) = scores.advance() {
        if verbose > 1 {
            tracing::trace!(?perm, r, "permutation score");
        }
        if r.is_nan() {
            continue;
        }
        match &mut best {
            Some((p, b)) if r > *b => {
                p.copy_from_slice(perm);
                *b = r;
            }
            Some(_) => {}
            None => best = Some((perm.to_vec(), r)),
        }
    }
    best
}

/// Add jitter below 1% of the smallest gap between distinct test values.
fn jitter_ties<R: Rng>(m: &mut Array2<f64>, rng: &mut R) {
    let mut vals: Vec<f64> = lower_triangle(m).into_iter().filter(|v| v.is_finite()).collect();
    vals.sort_by(f64::total_cmp);
    let min_gap = vals
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !min_gap.is_finite() {
        return;
    }
    let scale = TIEBREAK_FRACTION * min_gap;
    let n = m.nrows();
    for i in 0..n {
        for j in 0..i {
            if m[[i, j]].is_finite() {
                let v = m[[i, j]] + scale * rng.gen::<f64>();
                m[[i, j]] = v;
                m[[j, i]] = v;
            }
        }
    }
}

fn all_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
}

/// Identity vs. single-swap labelling for every pair.
fn pairwise_comparisons(
    reference: &Array2<f64>,
    test: &Array2<f64>,
    labels: &[String],
    opts: &RsaOptions,
) -> Vec<PairComparison> {
    let n = labels.len();
    let target = lower_triangle(reference);
    let identity: Vec<usize> = (0..n).collect();
    let kept = lower_triangle(test);

    all_pairs(n)
        .map(|(first, second)| {
            let touches_missing = (0..n).any(|k| {
                (k != first && test[[first, k]].is_nan()) || (k != second && test[[second, k]].is_nan())
            });
            if touches_missing {
                return PairComparison { first, second, predicted: None };
            }
            let mut swap = identity.clone();
            swap.swap(first, second);
            let swapped = permuted_triangle(test, &swap);

            let (s_keep, s_swap) = if opts.similarity_space {
                (stats::pearson(&target, &kept), stats::pearson(&target, &swapped))
            } else {
                // lower is better: negate distances
                (-stats::euclidean(&target, &kept), -stats::euclidean(&target, &swapped))
            };
            let (a, b) = (labels[first].clone(), labels[second].clone());
            let predicted = if s_keep.is_nan() || s_swap.is_nan() || s_keep == s_swap {
                None
            } else if s_keep > s_swap {
                Some((a, b))
            } else {
                Some((b, a))
            };
            PairComparison { first, second, predicted }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sym(lower: &[f64], n: usize) -> Array2<f64> {
        let mut m = Array2::from_elem((n, n), f64::NAN);
        let mut k = 0;
        for i in 0..n {
            for j in 0..i {
                m[[i, j]] = lower[k];
                m[[j, i]] = lower[k];
                k += 1;
            }
        }
        m
    }

    #[test]
    fn next_permutation_visits_all() {
        let mut p = vec![0, 1, 2];
        let mut seen = vec![p.clone()];
        while next_permutation(&mut p) {
            seen.push(p.clone());
        }
        assert_eq!(
            seen,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0]
            ]
        );
    }

    #[test]
    fn identity_wins_for_identical_structures() {
        // pairs (1,2), (1,3), (2,3) → lower-triangle cells (1,0), (2,0), (2,1)
        let reference = sym(&[0.8, 0.2, 0.1], 3);
        let test = reference.clone();
        let scores: Vec<_> = permutation_scores(&reference, &test).collect();
        assert_eq!(scores.len(), 6);
        let (perm, r) = best_permutation(&reference, &test, 0).unwrap();
        assert_eq!(perm, vec![0, 1, 2]);
        approx::assert_abs_diff_eq!(r, 1.0, epsilon = 1e-12);
        assert!(scores.iter().all(|(_, s)| *s <= r));
    }

    #[test]
    fn metric_must_match_space() {
        let o = RsaOptions { metric: Metric::Euclidean, ..RsaOptions::default() };
        assert!(matches!(o.validate(), Err(McpaError::MetricSpace { .. })));
        let o = RsaOptions { metric: Metric::Euclidean, similarity_space: false, ..RsaOptions::default() };
        assert!(o.validate().is_ok());
        assert!("mahalanobis".parse::<Metric>().is_err());
    }

    #[test]
    fn similarity_matrix_is_fisher_z() {
        let p = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.5], [3.0, 2.0, 1.0]];
        let m = pairwise_matrix(&p, &RsaOptions::default());
        let r = stats::pearson(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.5]);
        approx::assert_abs_diff_eq!(m[[1, 0]], r.atanh(), epsilon = 1e-12);
        approx::assert_abs_diff_eq!(m[[0, 1]], m[[1, 0]]);
        assert!(m[[0, 0]].is_nan());
    }

    #[test]
    fn dissimilarity_matrix_has_zero_diagonal() {
        let p = array![[0.0, 0.0], [3.0, 4.0]];
        let o = RsaOptions { similarity_space: false, metric: Metric::Euclidean, ..RsaOptions::default() };
        let m = pairwise_matrix(&p, &o);
        assert_eq!(m, array![[0.0, 5.0], [5.0, 0.0]]);
    }

    #[test]
    fn degenerate_detection() {
        let empty = Array2::from_elem((4, 4), f64::NAN);
        assert!(is_degenerate(&empty));
        let full = sym(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 4);
        assert!(!is_degenerate(&full));
    }

    #[test]
    fn jitter_stays_below_one_percent_of_gap() {
        let mut m = sym(&[0.5, 0.5, 0.7], 3);
        let before = m.clone();
        jitter_ties(&mut m, &mut ChaCha8Rng::seed_from_u64(1));
        for (a, b) in lower_triangle(&m).iter().zip(lower_triangle(&before)) {
            assert!((a - b).abs() < 0.01 * 0.2);
        }
        for i in 0..3 {
            for j in 0..i {
                assert_eq!(m[[i, j]], m[[j, i]]);
            }
        }
    }

    #[test]
    fn walk_matches_collected_scores() {
        let reference = sym(&[0.9, 0.1, 0.3, 0.5, 0.2, 0.7], 4);
        let test = sym(&[0.4, f64::NAN, 0.3, 0.8, 0.6, 0.1], 4);
        let collected: Vec<_> = permutation_scores(&reference, &test).collect();
        assert_eq!(collected.len(), 24);
        let mut walk = permutation_scores(&reference, &test);
        let mut k = 0;
        while let Some((perm, r)) = walk.advance() {
            assert_eq!(perm, collected[k].0.as_slice());
            assert_eq!(r.to_bits(), collected[k].1.to_bits());
            k += 1;
        }
        assert_eq!(k, 24);
        assert!(walk.advance().is_none());
    }

    #[test]
    fn exact_tie_keeps_first_permutation_in_lexicographic_order() {
        // the low test cell (1,0) must land on the low reference cell (2,1):
        // [2, 0, 1] and [2, 1, 0] both give a perfect match
        let reference = sym(&[0.9, 0.9, 0.2], 3);
        let test = sym(&[0.2, 0.9, 0.9], 3);
        let scores: Vec<_> = permutation_scores(&reference, &test).collect();
        let top = scores.iter().map(|(_, r)| *r).fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<&[usize]> = scores.iter().filter(|(_, r)| *r == top).map(|(p, _)| p.as_slice()).collect();
        assert_eq!(tied, vec![&[2, 0, 1][..], &[2, 1, 0][..]]);
        let (perm, r) = best_permutation(&reference, &test, 0).unwrap();
        assert_eq!(perm, vec![2, 0, 1]);
        assert_eq!(r, top);
    }

    #[test]
    fn missing_pair_is_indeterminate() {
        let reference = sym(&[0.9, 0.1, 0.3, 0.5, 0.2, 0.7], 4);
        let mut test = reference.clone();
        test[[3, 2]] = f64::NAN;
        test[[2, 3]] = f64::NAN;
        let labels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let c = pairwise_comparisons(&reference, &test, &labels, &RsaOptions::default());
        assert_eq!(c.len(), 6);
        for cmp in &c {
            let involves = [cmp.first, cmp.second].iter().any(|&x| x == 2 || x == 3);
            assert_eq!(cmp.predicted.is_none(), involves, "{cmp:?}");
        }
        assert_eq!(c[0].is_correct(&labels), Some(true));
    }

    #[test]
    fn confusion_cells_for_permutation() {
        let outcome = RsaOutcome::Permutation(PermutationResult {
            labels: vec!["a".into(), "b".into(), "c".into()],
            assignment: vec![Some("b".into()), Some("a".into()), None],
            predicted: vec![],
            permutation: vec![1, 0, 2],
            correlation: 0.5,
            usable: true,
        });
        let cells = outcome.cells();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&((0, 1), 1.0)));
        assert!(cells.contains(&((0, 0), 0.0)));
        assert!(cells.iter().filter(|((i, _), _)| *i == 2).all(|(_, v)| v.is_nan()));
    }
}
