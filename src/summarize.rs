//! Dimension reduction of pattern tensors.
//!
//! `summarize` collapses a list of named axes one after another, in exactly
//! the order given.  For mean-type reductions the order is irrelevant, but a
//! custom reduction (e.g. "max over time, then mean over sessions") is not
//! commutative, so the caller's order is preserved.
//!
//! All built-in reductions ignore `NaN`, which marks missing trials, absent
//! sessions and dropped channels.  A lane that is entirely `NaN` reduces to
//! `NaN`.
use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::classify::ClassifierKind;
use crate::config::AnalysisScope;
use crate::error::{McpaError, Result};
use crate::tensor::{Dimension, LabeledTensor};

/// Custom reduction: `(tensor, axis) -> tensor with axis removed`.
pub type ReduceFn = Arc<dyn Fn(ArrayViewD<'_, f64>, Axis) -> ArrayD<f64> + Send + Sync>;

/// Reduction applied along each summarized axis.
#[derive(Clone, Default)]
pub enum SummaryFn {
    /// Mean of the non-`NaN` values.
    #[default]
    NanMean,
    /// Median of the non-`NaN` values.
    NanMedian,
    /// Maximum of the non-`NaN` values.
    NanMax,
    /// Caller-supplied reduction; must tolerate `NaN`.
    Custom(ReduceFn),
}

impl fmt::Debug for SummaryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NanMean => f.write_str("NanMean"),
            Self::NanMedian => f.write_str("NanMedian"),
            Self::NanMax => f.write_str("NanMax"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl SummaryFn {
    /// Wrap a closure as a custom reduction.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(ArrayViewD<'_, f64>, Axis) -> ArrayD<f64> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Reduce `data` along `axis`.
    pub fn apply(&self, data: ArrayViewD<'_, f64>, axis: Axis) -> ArrayD<f64> {
        match self {
            Self::NanMean => data.map_axis(axis, |lane| nan_mean(lane.iter().copied())),
            Self::NanMedian => data.map_axis(axis, |lane| nan_median(lane.iter().copied())),
            Self::NanMax => data.map_axis(axis, |lane| {
                lane.iter()
                    .copied()
                    .filter(|v| !v.is_nan())
                    .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
            }),
            Self::Custom(f) => f(data, axis),
        }
    }
}

/// Mean ignoring `NaN`; `NaN` when nothing is left.
pub fn nan_mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0_f64, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Median ignoring `NaN`; `NaN` when nothing is left.
pub fn nan_median<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut v: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 { 0.5 * (v[mid - 1] + v[mid]) } else { v[mid] }
}

/// Collapse `dims` from `tensor` one at a time, in the given order.
///
/// Every name is checked against the tensor's labels before any reduction
/// runs, so a bad recipe fails without partial work.
pub fn summarize(
    tensor: &LabeledTensor,
    summary: &SummaryFn,
    dims: &[Dimension],
) -> Result<LabeledTensor> {
    for (i, &d) in dims.iter().enumerate() {
        tensor.axis_of(d)?;
        if dims[..i].contains(&d) {
            return Err(McpaError::DuplicateDimension(d));
        }
    }
    let mut out = tensor.clone();
    for &d in dims {
        out = out.reduce_with(d, |data, axis| summary.apply(data, axis))?;
    }
    Ok(out)
}

/// Which axes to collapse, and the axis order of what remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRecipe {
    pub summarize: Vec<Dimension>,
    pub final_order: Vec<Dimension>,
}

impl DimensionRecipe {
    /// Summarize `tensor`, then reorder to `final_order`.
    ///
    /// Axes that are named in `final_order` but absent from the tensor are
    /// added as length-1 axes (a single-session recording has no session axis).
    pub fn apply(&self, tensor: &LabeledTensor, summary: &SummaryFn) -> Result<LabeledTensor> {
        let mut out = summarize(tensor, summary, &self.summarize)?;
        for &d in &self.final_order {
            if !out.has(d) && !tensor.has(d) {
                out = out.with_singleton(d);
            }
        }
        out.reorder(&self.final_order)
    }
}

/// Default recipe for a classifier kind and analysis scope.
///
/// Binary classifiers see one vector per instance, so sessions are averaged
/// away; RSA keeps sessions to average whole similarity structures instead.
pub fn recommend_dimensions(kind: ClassifierKind, scope: AnalysisScope) -> DimensionRecipe {
    use Dimension::*;
    match (scope, kind) {
        (AnalysisScope::BetweenSubjects, ClassifierKind::Rsa) | (AnalysisScope::WithinSubjects, _) => {
            DimensionRecipe {
                summarize: vec![Time],
                final_order: vec![Instance, Feature, Session, Subject],
            }
        }
        (AnalysisScope::BetweenSubjects, _) => DimensionRecipe {
            summarize: vec![Time, Session],
            final_order: vec![Instance, Feature, Subject],
        },
    }
}
