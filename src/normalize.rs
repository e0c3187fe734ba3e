//! Per-feature scaling of fold data.
//!
//! Applied column-wise to the training matrix and to the test matrix
//! independently, right before they reach the classifier:
//!
//! `MinMax`: `(x − min) / (max − min)`  →  `[0, 1]`
//! `ZScore`: `(x − μ) / σ`, `ddof = 0`
//!
//! `NaN` entries are ignored for the statistics and stay `NaN`.  Constant
//! columns map to 0 instead of dividing by zero.
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::summarize::nan_mean;

/// Feature scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    MinMax,
    ZScore,
}

impl Normalization {
    pub fn apply_inplace(self, data: &mut Array2<f64>) {
        match self {
            Self::MinMax => minmax_columns_inplace(data),
            Self::ZScore => {
                zscore_columns_inplace(data);
            }
        }
    }
}

/// Min–max scale every column to `[0, 1]`.
pub fn minmax_columns_inplace(data: &mut Array2<f64>) {
    for mut col in data.axis_iter_mut(Axis(1)) {
        let (lo, hi) = col
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !lo.is_finite() {
            continue;
        }
        let span = hi - lo;
        if span > 0.0 {
            col.mapv_inplace(|v| (v - lo) / span);
        } else {
            col.mapv_inplace(|v| if v.is_nan() { v } else { 0.0 });
        }
    }
}

/// Z-score every column.  Returns the `(mean, std)` used per column.
pub fn zscore_columns_inplace(data: &mut Array2<f64>) -> Vec<(f64, f64)> {
    let mut params = Vec::with_capacity(data.ncols());
    for mut col in data.axis_iter_mut(Axis(1)) {
        let mean = nan_mean(col.iter().copied());
        let var = nan_mean(col.iter().map(|&v| (v - mean) * (v - mean)));
        let std = var.sqrt();
        if std > 0.0 {
            col.mapv_inplace(|v| (v - mean) / std);
        } else if !mean.is_nan() {
            col.mapv_inplace(|v| v - mean);
        }
        params.push((mean, std));
    }
    params
}
