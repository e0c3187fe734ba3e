//! Analysis configuration.
//!
//! [`McpaConfig`] holds every option of a cross-validation run.  All fields
//! have defaults, and [`McpaConfig::validate`] checks them once against the
//! data, producing the [`ResolvedConfig`] that the rest of the run reads.
//!
//! The classifier itself is not part of the configuration: it is injected
//! into [`CrossValidator::new`](crate::crossval::CrossValidator::new).
use std::collections::HashSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::classify::ClassifierKind;
use crate::dataset::PatternSet;
use crate::error::{McpaError, Result};
use crate::events::Condition;
use crate::normalize::Normalization;
use crate::rsa::{ReferenceModel, RsaOptions, MAX_PERMUTATION_LABELS};
use crate::subsets::DEFAULT_MAX_SETS;
use crate::summarize::{recommend_dimensions, DimensionRecipe, SummaryFn};
use crate::tensor::Dimension;

/// Between- or within-participant analysis; selects the default dimension
/// recipe (within-participant keeps the session axis for every classifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisScope {
    #[default]
    BetweenSubjects,
    WithinSubjects,
}

/// Configuration of a cross-validation run.
///
/// All fields are `pub`; construct with struct-update syntax:
///
/// ```
/// use mcpa::{Condition, McpaConfig};
///
/// let cfg = McpaConfig {
///     conditions: vec![Condition::named("house"), Condition::named("face")],
///     setsize: Some(4),
///     ..McpaConfig::default()
/// };
/// assert_eq!(cfg.max_sets, 1_000_000);
/// ```
#[derive(Debug, Clone)]
pub struct McpaConfig {
    /// Feature indices to analyse.  Default: all.
    pub incl_channels: Option<Vec<usize>>,

    /// Subject indices to analyse; each becomes one fold.  Default: all.
    pub incl_subjects: Option<Vec<usize>>,

    /// Baseline interval (s) subtracted from every time course.
    ///
    /// Default: `(-5.0, 0.0)`.
    pub baseline_window: (f64, f64),

    /// Analysis interval (s) kept after baseline correction.
    ///
    /// Default: `(2.0, 6.0)`.
    pub time_window: (f64, f64),

    /// Conditions to discriminate.  Two conditions use the injected binary
    /// classifier; three or more always use RSA.
    ///
    /// Default: event types 0 and 1.
    pub conditions: Vec<Condition>,

    /// Reduction used by the summarize step.  Default: mean ignoring `NaN`.
    pub summary: SummaryFn,

    /// Features per subset.  Default: all included features (one subset).
    pub setsize: Option<usize>,

    /// Cap on the number of subsets; larger enumerations are sampled.
    ///
    /// Default: `1_000_000`.
    pub max_sets: usize,

    /// Axes to collapse, in order.  Default: recommended for the classifier.
    pub summarize_dimensions: Option<Vec<Dimension>>,

    /// Axis order after summarizing.  Default: recommended for the classifier.
    pub final_dimensions: Option<Vec<Dimension>>,

    /// Default: between subjects.
    pub scope: AnalysisScope,

    /// Options of the RSA path (similarity space, metric, pairwise, tiebreak).
    ///
    /// Default: Pearson similarity, n-way, tiebreak on.
    pub rsa: RsaOptions,

    /// Report per-fold progress at `info` level (otherwise `debug`).
    ///
    /// Default: `true`.
    pub verbose: bool,

    /// Feature scaling before the binary classifier.  Default: none.
    pub norm_data: Option<Normalization>,

    /// External structure replacing the training-data structure in RSA.
    pub reference_model: Option<ReferenceModel>,

    /// Seed for subset sampling.
    pub seed: u64,
}

impl Default for McpaConfig {
    fn default() -> Self {
        Self {
            incl_channels: None,
            incl_subjects: None,
            baseline_window: (-5.0, 0.0),
            time_window: (2.0, 6.0),
            conditions: vec![Condition::Index(vec![0]), Condition::Index(vec![1])],
            summary: SummaryFn::NanMean,
            setsize: None,
            max_sets: DEFAULT_MAX_SETS,
            summarize_dimensions: None,
            final_dimensions: None,
            scope: AnalysisScope::BetweenSubjects,
            rsa: RsaOptions::default(),
            verbose: true,
            norm_data: None,
            reference_model: None,
            seed: 0,
        }
    }
}

/// Validated, fully concrete view of a [`McpaConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Sorted, de-duplicated feature indices.
    pub channels: Vec<usize>,
    /// Subject indices in the order folds run.
    pub subjects: Vec<usize>,
    pub setsize: usize,
    pub recipe: DimensionRecipe,
    /// Three or more conditions (RSA path).
    pub multiclass: bool,
}

impl McpaConfig {
    /// Check the configuration against `data` for a classifier of `kind`.
    pub fn validate(&self, data: &PatternSet, kind: ClassifierKind) -> Result<ResolvedConfig> {
        let n_cond = self.conditions.len();
        if n_cond < 2 {
            return Err(McpaError::InvalidConfig(format!("need at least 2 conditions, got {n_cond}")));
        }
        let multiclass = n_cond >= 3;
        if multiclass {
            self.rsa.validate()?;
            if !self.rsa.pairwise && n_cond > MAX_PERMUTATION_LABELS {
                return Err(McpaError::TooManyLabels { n_labels: n_cond, max: MAX_PERMUTATION_LABELS });
            }
        }
        if self.max_sets == 0 {
            return Err(McpaError::InvalidConfig("max_sets must be at least 1".into()));
        }

        let n_feat = data.n_features();
        let mut channels = checked_indices(self.incl_channels.as_deref(), n_feat, "channel")?;
        channels.sort_unstable();
        channels.dedup();

        let n_subj = data.n_subjects();
        let mut subjects = checked_indices(self.incl_subjects.as_deref(), n_subj, "subject")?;
        // one fold per subject; keep first-seen order
        let requested = subjects.len();
        let mut seen = HashSet::new();
        subjects.retain(|s| seen.insert(*s));
        if subjects.len() < requested {
            tracing::warn!(dropped = requested - subjects.len(), "duplicate entries in incl_subjects ignored");
        }
        if subjects.len() < 2 {
            return Err(McpaError::InvalidConfig(format!(
                "leave-one-subject-out needs at least 2 subjects, got {}",
                subjects.len()
            )));
        }

        let setsize = self.setsize.unwrap_or(channels.len());
        if setsize > channels.len() {
            return Err(McpaError::SetSizeTooLarge { setsize, available: channels.len() });
        }
        if setsize == 0 {
            return Err(McpaError::EmptySubset { setsize, available: channels.len() });
        }

        let kind = if multiclass { ClassifierKind::Rsa } else { kind };
        let recipe = self.resolve_recipe(data, kind)?;

        Ok(ResolvedConfig { channels, subjects, setsize, recipe, multiclass })
    }

    fn resolve_recipe(&self, data: &PatternSet, kind: ClassifierKind) -> Result<DimensionRecipe> {
        let present = data.patterns.dims();
        let recommended = recommend_dimensions(kind, self.scope);

        let summarize = match &self.summarize_dimensions {
            Some(dims) => {
                for &d in dims {
                    if !present.contains(&d) {
                        return Err(McpaError::UnknownDimension { dim: d, available: present.to_vec() });
                    }
                }
                dims.clone()
            }
            // recommended axes the data never had are skipped
            None => recommended.summarize.into_iter().filter(|d| present.contains(d)).collect(),
        };

        let remaining: Vec<Dimension> = present.iter().copied().filter(|d| !summarize.contains(d)).collect();
        let final_order = match &self.final_dimensions {
            Some(dims) => dims.clone(),
            None => recommended
                .final_order
                .into_iter()
                .filter(|d| remaining.contains(d) || (*d == Dimension::Session && !present.contains(d)))
                .chain(remaining.iter().copied().filter(|d| {
                    !matches!(d, Dimension::Instance | Dimension::Feature | Dimension::Session | Dimension::Subject)
                }))
                .collect(),
        };

        if let Some(d) = final_order.iter().find(|d| summarize.contains(d)) {
            return Err(McpaError::InvalidConfig(format!(
                "the '{d}' axis is summarized and cannot appear in final_dimensions"
            )));
        }
        for d in [Dimension::Instance, Dimension::Feature, Dimension::Subject] {
            if summarize.contains(&d) || !final_order.contains(&d) {
                return Err(McpaError::InvalidConfig(format!(
                    "the '{d}' axis must survive summarization and appear in final_dimensions"
                )));
            }
        }
        for d in &remaining {
            if !final_order.contains(d) {
                return Err(McpaError::DimensionMismatch(format!(
                    "final_dimensions {final_order:?} omit remaining axis '{d}'"
                )));
            }
        }
        Ok(DimensionRecipe { summarize, final_order })
    }
}

fn checked_indices(requested: Option<&[usize]>, size: usize, what: &'static str) -> Result<Vec<usize>> {
    match requested {
        None => Ok((0..size).collect()),
        Some(idx) => {
            if let Some(&bad) = idx.iter().find(|&&i| i >= size) {
                return Err(McpaError::IndexOutOfRange { what, index: bad, size });
            }
            Ok(idx.to_vec())
        }
    }
}

// ── JSON configuration file ───────────────────────────────────────────────────

/// On-disk configuration read by the `mcpa` binary.
///
/// Every key is optional and falls back to [`McpaConfig::default`].
///
/// ```json
/// {
///   "conditions": [["house"], ["face"], ["tool"]],
///   "setsize": 3,
///   "summarize_dimensions": ["time"],
///   "rsa": { "pairwise": true }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub incl_channels: Option<Vec<usize>>,
    pub incl_subjects: Option<Vec<usize>>,
    pub baseline_window: Option<(f64, f64)>,
    pub time_window: Option<(f64, f64)>,
    pub conditions: Option<Vec<Condition>>,
    /// `"mean"`, `"median"` or `"max"`.
    pub summary: Option<String>,
    pub setsize: Option<usize>,
    pub max_sets: Option<usize>,
    pub summarize_dimensions: Option<Vec<Dimension>>,
    pub final_dimensions: Option<Vec<Dimension>>,
    pub scope: Option<AnalysisScope>,
    pub rsa: Option<RsaOptions>,
    pub verbose: Option<bool>,
    pub norm_data: Option<Normalization>,
    pub reference_model: Option<ReferenceFile>,
    pub seed: Option<u64>,
}

/// Precomputed reference structure in a configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceFile {
    pub labels: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

impl ConfigFile {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Overlay the file's keys onto the defaults.
    pub fn into_config(self) -> Result<McpaConfig> {
        let d = McpaConfig::default();
        let summary = match self.summary.as_deref() {
            None | Some("mean") => SummaryFn::NanMean,
            Some("median") => SummaryFn::NanMedian,
            Some("max") => SummaryFn::NanMax,
            Some(other) => {
                return Err(McpaError::InvalidConfig(format!("unknown summary function '{other}'")));
            }
        };
        let reference_model = match self.reference_model {
            None => None,
            Some(r) => {
                let n = r.matrix.len();
                let flat: Vec<f64> = r.matrix.into_iter().flatten().collect();
                if flat.len() != n * n {
                    return Err(McpaError::InvalidConfig("reference matrix must be square".into()));
                }
                Some(ReferenceModel::Matrix { labels: r.labels, matrix: Array2::from_shape_vec((n, n), flat)? })
            }
        };
        Ok(McpaConfig {
            incl_channels: self.incl_channels,
            incl_subjects: self.incl_subjects,
            baseline_window: self.baseline_window.unwrap_or(d.baseline_window),
            time_window: self.time_window.unwrap_or(d.time_window),
            conditions: self.conditions.unwrap_or(d.conditions),
            summary,
            setsize: self.setsize,
            max_sets: self.max_sets.unwrap_or(d.max_sets),
            summarize_dimensions: self.summarize_dimensions,
            final_dimensions: self.final_dimensions,
            scope: self.scope.unwrap_or(d.scope),
            rsa: self.rsa.unwrap_or(d.rsa),
            verbose: self.verbose.unwrap_or(d.verbose),
            norm_data: self.norm_data,
            reference_model,
            seed: self.seed.unwrap_or(d.seed),
        })
    }
}
