//! Leave-one-subject-out cross-validation.
//!
//! ```text
//! Initialized ──run()──▶ Summarizing ──▶ Folding{subject 0} ─▶ … ─▶ Folding{subject n−1} ──▶ Complete
//!                           │                    │
//!                           │                    └─ for each feature subset:
//!                           │                         2 conditions  → split + injected classifier
//!                           │                         3+ conditions → RSA
//!                           └─ baseline/window, summarize, reorder, enumerate subsets
//! ```
//!
//! The two-vs-many dispatch depends only on the number of conditions.  Any
//! error, including a failing classifier, aborts the whole run; results are
//! only returned once every fold has finished.
use std::time::Instant;

use ndarray::{concatenate, s, Array3, Array4, ArrayView2, Axis};

use crate::classify::{score_binary, PatternClassifier};
use crate::config::{McpaConfig, ResolvedConfig};
use crate::dataset::PatternSet;
use crate::epoch::prepare_epochs;
use crate::error::{McpaError, Result};
use crate::events::{resolve_conditions, ResolvedCondition};
use crate::rsa::{rsa_classify, RsaInput};
use crate::split::split_fold;
use crate::subsets::{enumerate_subsets, SubsetList};
use crate::summarize::nan_mean;
use crate::tensor::{Dimension, LabeledTensor};

macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose { tracing::info!($($arg)+) } else { tracing::debug!($($arg)+) }
    };
}

/// Where a [`CrossValidator`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initialized,
    Summarizing,
    /// `fold` counts from 0; `subject` is the held-out subject index.
    Folding { fold: usize, subject: usize },
    Complete,
}

/// Two-condition results.
#[derive(Debug, Clone)]
pub struct BinaryResults {
    pub conditions: Vec<String>,
    /// Held-out subject of every fold.
    pub subjects: Vec<usize>,
    /// Included feature indices.
    pub features: Vec<usize>,
    pub subsets: SubsetList,
    /// `[condition, subset, fold]` fraction of held-out instances correct.
    pub accuracy: Array3<f64>,
    /// `[condition, fold, feature]` mean accuracy of the subsets containing
    /// each feature.
    pub subj_x_feature: Array3<f64>,
}

impl BinaryResults {
    /// `[subset, fold]` accuracy for one condition.
    pub fn subset_x_subj(&self, condition: usize) -> ArrayView2<'_, f64> {
        self.accuracy.index_axis(Axis(0), condition)
    }

    fn finalize(&mut self) {
        let (n_cond, _, n_fold) = self.accuracy.dim();
        let mut out = Array3::from_elem((n_cond, n_fold, self.features.len()), f64::NAN);
        for (fi, &feat) in self.features.iter().enumerate() {
            let containing: Vec<usize> = self
                .subsets
                .iter()
                .enumerate()
                .filter(|(_, set)| set.contains(&feat))
                .map(|(k, _)| k)
                .collect();
            for c in 0..n_cond {
                for f in 0..n_fold {
                    out[[c, f, fi]] = nan_mean(containing.iter().map(|&k| self.accuracy[[c, k, f]]));
                }
            }
        }
        self.subj_x_feature = out;
    }
}

/// Three-or-more-condition (RSA) results.
#[derive(Debug, Clone)]
pub struct MulticlassResults {
    pub conditions: Vec<String>,
    pub subjects: Vec<usize>,
    pub subsets: SubsetList,
    pub pairwise: bool,
    /// `[condition, condition, subset, fold]`.
    ///
    /// n-way: confusion rows (true condition × assigned condition).
    /// Pairwise: 1 if the pair was labelled correctly, 0 if swapped.
    /// `NaN` where no decision was possible.
    pub accuracy: Array4<f64>,
}

impl MulticlassResults {
    /// Mean accuracy per fold over subsets.
    ///
    /// n-way: fraction of conditions given their own label.  Pairwise:
    /// fraction of decided pairs labelled correctly.
    pub fn mean_accuracy(&self) -> Vec<f64> {
        let (n, _, n_sets, n_fold) = self.accuracy.dim();
        (0..n_fold)
            .map(|f| {
                nan_mean((0..n_sets).map(|k| {
                    let cells = self.accuracy.slice(s![.., .., k, f]);
                    if self.pairwise {
                        nan_mean((0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).map(|(i, j)| cells[[i, j]]))
                    } else if (0..n).any(|i| cells[[i, i]].is_nan()) {
                        f64::NAN
                    } else {
                        (0..n).map(|i| cells[[i, i]]).sum::<f64>() / n as f64
                    }
                }))
            })
            .collect()
    }
}

/// Results of a run, by path.
#[derive(Debug, Clone)]
pub enum McpaResults {
    Binary(BinaryResults),
    Multiclass(MulticlassResults),
}

impl McpaResults {
    pub fn subsets(&self) -> &SubsetList {
        match self {
            Self::Binary(r) => &r.subsets,
            Self::Multiclass(r) => &r.subsets,
        }
    }

    pub fn subjects(&self) -> &[usize] {
        match self {
            Self::Binary(r) => &r.subjects,
            Self::Multiclass(r) => &r.subjects,
        }
    }
}

/// Leave-one-subject-out driver.
pub struct CrossValidator<'a> {
    config: McpaConfig,
    resolved: ResolvedConfig,
    conditions: Vec<ResolvedCondition>,
    data: &'a PatternSet,
    classifier: &'a dyn PatternClassifier,
    state: DriverState,
}

impl<'a> CrossValidator<'a> {
    /// Validate `config` against `data`; nothing is computed yet.
    ///
    /// `classifier` is only called when exactly two conditions are configured.
    pub fn new(config: McpaConfig, data: &'a PatternSet, classifier: &'a dyn PatternClassifier) -> Result<Self> {
        let resolved = config.validate(data, classifier.kind())?;
        let conditions = resolve_conditions(&config.conditions, &data.events)?;
        for c in &conditions {
            if c.instances.is_empty() {
                return Err(McpaError::UnknownEvent(c.label.clone()));
            }
        }
        Ok(Self { config, resolved, conditions, data, classifier, state: DriverState::Initialized })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub fn conditions(&self) -> &[ResolvedCondition] {
        &self.conditions
    }

    /// Run every fold.
    pub fn run(&mut self) -> Result<McpaResults> {
        self.state = DriverState::Summarizing;
        let prepared = prepare_epochs(self.data, self.config.baseline_window, self.config.time_window)?;
        let summarized = self.resolved.recipe.apply(&prepared.patterns, &self.config.summary)?;
        tracing::debug!(dims = ?summarized.dims(), shape = ?summarized.shape(), "patterns summarized");

        let subsets = if self.resolved.setsize == self.resolved.channels.len() {
            SubsetList::single(&self.resolved.channels)
        } else {
            enumerate_subsets(&self.resolved.channels, self.resolved.setsize, self.config.max_sets, self.config.seed)?
        };
        progress!(
            self.config.verbose,
            folds = self.resolved.subjects.len(),
            subsets = subsets.len(),
            conditions = self.conditions.len(),
            "starting cross-validation"
        );

        let results = if self.resolved.multiclass {
            McpaResults::Multiclass(self.run_multiclass(&summarized, subsets)?)
        } else {
            McpaResults::Binary(self.run_binary(&summarized, subsets)?)
        };
        self.state = DriverState::Complete;
        Ok(results)
    }

    fn run_binary(&mut self, patterns: &LabeledTensor, subsets: SubsetList) -> Result<BinaryResults> {
        let labels: Vec<String> = self.conditions.iter().map(|c| c.label.clone()).collect();
        let subjects = self.resolved.subjects.clone();
        let mut accuracy = Array3::from_elem((labels.len(), subsets.len(), subjects.len()), f64::NAN);
        let started = Instant::now();

        for (fold, &held_out) in subjects.iter().enumerate() {
            self.state = DriverState::Folding { fold, subject: held_out };
            let t0 = Instant::now();
            let train: Vec<usize> = subjects.iter().copied().filter(|&t| t != held_out).collect();

            for (k, subset) in subsets.iter().enumerate() {
                let split = split_fold(patterns, &self.conditions, held_out, &train, subset)?;
                if split.subj_labels.is_empty() || split.group_labels.is_empty() {
                    tracing::warn!(subject = held_out, subset = k, "fold has no usable instances");
                    continue;
                }
                let (mut group, mut test) = (split.group_data, split.subj_data);
                if let Some(norm) = self.config.norm_data {
                    norm.apply_inplace(&mut group);
                    norm.apply_inplace(&mut test);
                }
                let predicted = self
                    .classifier
                    .classify(group.view(), &split.group_labels, test.view())
                    .map_err(|source| McpaError::Classifier { subject: held_out, source })?;
                if predicted.len() != split.subj_labels.len() {
                    return Err(McpaError::Classifier {
                        subject: held_out,
                        source: anyhow::anyhow!(
                            "returned {} labels for {} test instances",
                            predicted.len(),
                            split.subj_labels.len()
                        ),
                    });
                }
                let acc = score_binary(&predicted, &split.subj_labels, &labels);
                for (c, a) in acc.into_iter().enumerate() {
                    accuracy[[c, k, fold]] = a;
                }
                tracing::trace!(subject = held_out, subset = k, "subset classified");
            }
            self.report_fold(fold, held_out, t0, started);
        }

        let mut results = BinaryResults {
            conditions: labels,
            subjects,
            features: self.resolved.channels.clone(),
            subsets,
            accuracy,
            subj_x_feature: Array3::zeros((0, 0, 0)),
        };
        results.finalize();
        Ok(results)
    }

    fn run_multiclass(&mut self, patterns: &LabeledTensor, subsets: SubsetList) -> Result<MulticlassResults> {
        let labels: Vec<String> = self.conditions.iter().map(|c| c.label.clone()).collect();
        let n = labels.len();
        let subjects = self.resolved.subjects.clone();
        let mut accuracy = Array4::from_elem((n, n, subsets.len(), subjects.len()), f64::NAN);
        let started = Instant::now();

        for (fold, &held_out) in subjects.iter().enumerate() {
            self.state = DriverState::Folding { fold, subject: held_out };
            let t0 = Instant::now();
            let train: Vec<usize> = subjects.iter().copied().filter(|&t| t != held_out).collect();

            for (k, subset) in subsets.iter().enumerate() {
                let train_input = rsa_input(patterns, &self.conditions, &train, subset)?;
                let test_input = rsa_input(patterns, &self.conditions, &[held_out], subset)?;
                let outcome = rsa_classify(
                    &train_input,
                    &test_input,
                    self.config.reference_model.as_ref(),
                    &self.config.rsa,
                )?;
                if !outcome.is_usable() {
                    tracing::warn!(subject = held_out, subset = k, "RSA structure unusable; leaving results missing");
                }
                // outcome indices are in sorted-label order
                let to_cond: Vec<Option<usize>> = outcome
                    .labels()
                    .iter()
                    .map(|l| labels.iter().position(|c| c == l))
                    .collect();
                for ((i, j), v) in outcome.cells() {
                    if let (Some(ci), Some(cj)) = (to_cond[i], to_cond[j]) {
                        accuracy[[ci, cj, k, fold]] = v;
                    }
                }
            }
            self.report_fold(fold, held_out, t0, started);
        }

        Ok(MulticlassResults { conditions: labels, subjects, subsets, pairwise: self.config.rsa.pairwise, accuracy })
    }

    fn report_fold(&self, fold: usize, subject: usize, t0: Instant, started: Instant) {
        let n_folds = self.resolved.subjects.len();
        let done = fold + 1;
        let per_fold = started.elapsed().as_secs_f64() / done as f64;
        progress!(
            self.config.verbose,
            subject,
            fold = done,
            of = n_folds,
            secs = format!("{:.2}", t0.elapsed().as_secs_f64()),
            eta_secs = format!("{:.1}", per_fold * (n_folds - done) as f64),
            "fold complete"
        );
    }
}

/// `[instance, feature, replicate]` input for the RSA path.
///
/// Instances are those of the configured conditions, grouped by condition;
/// replicates are every remaining (session, …) slot of every listed subject.
fn rsa_input(
    patterns: &LabeledTensor,
    conditions: &[ResolvedCondition],
    subjects: &[usize],
    features: &[usize],
) -> Result<RsaInput> {
    let mut instances = Vec::new();
    let mut labels = Vec::new();
    for c in conditions {
        instances.extend_from_slice(&c.instances);
        labels.extend(std::iter::repeat(c.label.clone()).take(c.instances.len()));
    }

    let mut blocks: Vec<Array3<f64>> = Vec::with_capacity(subjects.len());
    for &t in subjects {
        let sub = patterns
            .index(Dimension::Subject, t)?
            .select(Dimension::Instance, &instances)?
            .select(Dimension::Feature, features)?;
        let mut order = vec![Dimension::Instance, Dimension::Feature];
        order.extend(
            sub.dims()
                .iter()
                .copied()
                .filter(|d| !matches!(d, Dimension::Instance | Dimension::Feature)),
        );
        let sub = sub.reorder(&order)?;
        let (n_inst, n_feat) = (instances.len(), features.len());
        let n_rep = if n_inst * n_feat == 0 { 0 } else { sub.data().len() / (n_inst * n_feat) };
        let (data, _) = sub.into_parts();
        blocks.push(data.into_shape_with_order((n_inst, n_feat, n_rep))?);
    }
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    let patterns = concatenate(Axis(2), &views)?;
    RsaInput::new(patterns, labels)
}
