//! # mcpa: multi-dimensional cross-participant pattern analysis
//!
//! `mcpa` asks whether neural patterns generalize across people: a classifier
//! is trained on every participant but one and tested on the one left out,
//! for every participant and for every subset of features.
//!
//! ## Pipeline overview
//!
//! ```text
//! patterns.safetensors           [instance, time, feature, session, subject]
//!   │
//!   ├─ io::load_pattern_set()    tensor + dimension labels + event labels + times
//!   ├─ epoch                     baseline correction, analysis time window
//!   ├─ summarize                 collapse dimensions (NaN-mean by default), reorder
//!   ├─ subsets                   feature subsets of size `setsize` (capped, seeded)
//!   └─ crossval                  leave one subject out
//!        │
//!        ├─ 2 conditions   split → normalize → PatternClassifier → accuracy per condition
//!        └─ 3+ conditions  rsa   → similarity structure matching → confusion / pairwise cells
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use mcpa::{run_mcpa, Condition, CorrelationClassifier, McpaConfig, McpaResults};
//! use std::path::Path;
//!
//! let data = mcpa::io::load_pattern_set(Path::new("patterns.safetensors")).unwrap();
//!
//! let cfg = McpaConfig {
//!     conditions: vec![Condition::named("face"), Condition::named("house")],
//!     setsize: Some(2),
//!     ..McpaConfig::default()
//! };
//! match run_mcpa(cfg, &data, &CorrelationClassifier).unwrap() {
//!     McpaResults::Binary(r) => println!("{:?}", r.subset_x_subj(0)),
//!     McpaResults::Multiclass(r) => println!("{:?}", r.mean_accuracy()),
//! }
//! ```
//!
//! Any `Fn(ArrayView2<f64>, &[String], ArrayView2<f64>) -> anyhow::Result<Vec<Option<String>>>`
//! is a [`PatternClassifier`], so a custom classifier is just a function.

pub mod classify;
pub mod config;
pub mod crossval;
pub mod dataset;
pub mod epoch;
pub mod error;
pub mod events;
pub mod io;
pub mod normalize;
pub mod rsa;
pub mod split;
pub mod stats;
pub mod subsets;
pub mod summarize;
pub mod tensor;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// classify
pub use classify::{ClassifierKind, CorrelationClassifier, DistanceClassifier, PatternClassifier};

// config
pub use config::{AnalysisScope, ConfigFile, McpaConfig, ResolvedConfig};

// crossval
pub use crossval::{BinaryResults, CrossValidator, DriverState, McpaResults, MulticlassResults};

// data model
pub use dataset::PatternSet;
pub use error::{McpaError, Result};
pub use events::{Condition, EventRegistry, ResolvedCondition};
pub use tensor::{Dimension, LabeledTensor};

// stages
pub use normalize::Normalization;
pub use rsa::{rsa_classify, Metric, ReferenceModel, RsaInput, RsaOptions, RsaOutcome};
pub use split::{split_fold, FoldSplit};
pub use subsets::{enumerate_subsets, SubsetList};
pub use summarize::{recommend_dimensions, summarize, DimensionRecipe, SummaryFn};

/// Run the full cross-validation for `data` under `config`.
///
/// Shorthand for [`CrossValidator::new`] followed by [`CrossValidator::run`].
/// `classifier` is only used when exactly two conditions are configured;
/// three or more go through [`rsa_classify`].
///
/// # Errors
///
/// Configuration problems (unknown dimensions, `setsize` larger than the
/// included features, too many labels for a permutation search, a metric
/// that does not match the similarity space, …) are reported before any fold
/// runs.  A classifier failure aborts the run with
/// [`McpaError::Classifier`].
pub fn run_mcpa(config: McpaConfig, data: &PatternSet, classifier: &dyn PatternClassifier) -> Result<McpaResults> {
    CrossValidator::new(config, data, classifier)?.run()
}
