//! Error types for the analysis pipeline.
//!
//! Configuration problems are detected once, before any fold runs, and abort
//! the analysis. Data-quality problems (an empty session, a missing subject)
//! are not errors: they are logged with `tracing::warn!` and surface as `NaN`
//! cells in the results.
use thiserror::Error;

use crate::tensor::Dimension;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, McpaError>;

/// Everything that can abort a cross-validation run.
#[derive(Error, Debug)]
pub enum McpaError {
    /// A dimension was requested that the tensor does not carry (anymore).
    #[error("dimension '{dim}' not present in {available:?}")]
    UnknownDimension {
        /// Requested dimension
        dim: Dimension,
        /// Labels the tensor carried at the time of the request
        available: Vec<Dimension>,
    },

    /// A dimension name that does not parse.
    #[error("unrecognised dimension name '{0}'")]
    UnknownDimensionName(String),

    /// The same dimension label appears twice.
    #[error("dimension '{0}' listed more than once")]
    DuplicateDimension(Dimension),

    /// Tensor rank and label list disagree, or a reorder is not a permutation.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Subset size exceeds the number of included features.
    #[error("subset size {setsize} exceeds the {available} included features")]
    SetSizeTooLarge {
        /// Requested subset size
        setsize: usize,
        /// Number of included features
        available: usize,
    },

    /// Zero-sized subsets or an empty inclusion list.
    #[error("cannot build subsets of size {setsize} from {available} features")]
    EmptySubset {
        /// Requested subset size
        setsize: usize,
        /// Number of included features
        available: usize,
    },

    /// Too many labels for the exhaustive n-way permutation search.
    #[error("{n_labels} labels exceed the n-way permutation limit of {max}; enable pairwise")]
    TooManyLabels {
        /// Number of distinct labels
        n_labels: usize,
        /// Permutation search limit
        max: usize,
    },

    /// Metric not valid for the selected similarity/dissimilarity space.
    #[error("metric '{metric}' cannot be used in {space} space")]
    MetricSpace {
        /// Metric name
        metric: String,
        /// "similarity" or "dissimilarity"
        space: &'static str,
    },

    /// Metric name that does not parse.
    #[error("unrecognised metric '{0}'")]
    UnknownMetric(String),

    /// A named condition selector matched nothing in the event registry.
    #[error("condition '{0}' matches no event type")]
    UnknownEvent(String),

    /// An index (channel, subject, event) outside the tensor.
    #[error("{what} index {index} out of range (size {size})")]
    IndexOutOfRange {
        /// Which index set
        what: &'static str,
        /// Offending index
        index: usize,
        /// Extent of the indexed axis
        size: usize,
    },

    /// Any other invalid combination of options.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// ndarray reshape failure.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// The injected classifier failed; fatal for the whole run.
    #[error("classifier failed on held-out subject {subject}: {source}")]
    Classifier {
        /// Held-out subject of the failing fold
        subject: usize,
        /// Underlying classifier error
        #[source]
        source: anyhow::Error,
    },
}

impl McpaError {
    /// Whether this error belongs to the configuration class.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Classifier { .. } | Self::Shape(_))
    }
}
