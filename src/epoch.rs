//! Baseline correction and analysis-window selection of epoched patterns.
//!
//! Both operate on the time axis of a [`PatternSet`] and need its sample
//! times:
//!
//! 1. every (instance, feature, session, subject) time course has the mean of
//!    its samples inside `baseline_window` subtracted;
//! 2. only samples inside `time_window` (inclusive) are kept.
//!
//! Patterns without sample times (already windowed upstream) pass through.
use crate::dataset::PatternSet;
use crate::error::{McpaError, Result};
use crate::summarize::nan_mean;
use crate::tensor::{Dimension, LabeledTensor};

/// Indices of `times` inside `[lo, hi]`.
pub fn window_indices(times: &[f64], (lo, hi): (f64, f64)) -> Vec<usize> {
    times
        .iter()
        .enumerate()
        .filter(|(_, &t)| t >= lo && t <= hi)
        .map(|(i, _)| i)
        .collect()
}

/// Subtract the per-lane mean over `baseline` samples, in place.
///
/// Returns `false` (and leaves the data alone) if no sample falls inside the
/// baseline window.
pub fn baseline_correct_inplace(tensor: &mut LabeledTensor, times: &[f64], baseline: (f64, f64)) -> Result<bool> {
    let axis = tensor.axis_of(Dimension::Time)?;
    let idx = window_indices(times, baseline);
    if idx.is_empty() {
        return Ok(false);
    }
    let mut data = tensor.data_mut();
    for mut lane in data.lanes_mut(axis) {
        let m = nan_mean(idx.iter().map(|&i| lane[i]));
        if m.is_nan() {
            continue;
        }
        lane.mapv_inplace(|v| v - m);
    }
    Ok(true)
}

/// Keep only the samples inside `window`.
pub fn select_window(tensor: &LabeledTensor, times: &[f64], window: (f64, f64)) -> Result<(LabeledTensor, Vec<f64>)> {
    if window.0 > window.1 {
        return Err(McpaError::InvalidConfig(format!("time window {window:?} is reversed")));
    }
    let idx = window_indices(times, window);
    if idx.is_empty() {
        return Err(McpaError::InvalidConfig(format!(
            "time window {window:?} contains no samples (data spans {:?}..{:?})",
            times.first(),
            times.last()
        )));
    }
    let out = tensor.select(Dimension::Time, &idx)?;
    Ok((out, idx.iter().map(|&i| times[i]).collect()))
}

/// Baseline-correct and window `set`.
pub fn prepare_epochs(set: &PatternSet, baseline: (f64, f64), window: (f64, f64)) -> Result<PatternSet> {
    let Some(times) = &set.times else {
        tracing::debug!("no sample times; skipping baseline correction and windowing");
        return Ok(set.clone());
    };
    let mut patterns = set.patterns.clone();
    if !baseline_correct_inplace(&mut patterns, times, baseline)? {
        tracing::warn!(?baseline, "no samples inside baseline window; baseline correction skipped");
    }
    let (patterns, times) = select_window(&patterns, times, window)?;
    PatternSet::new(patterns, set.events.clone(), Some(times))
}
