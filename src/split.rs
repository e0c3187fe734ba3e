//! Leave-one-subject-out train/test split for the two-condition path.
//!
//! Training rows are condition means, one per (condition, training subject);
//! test rows are the held-out subject's individual instances.  Any axes other
//! than instance, feature and subject (e.g. an unsummarized session axis) are
//! folded into the rows, so each (instance, session) pair counts as one
//! observation.
use ndarray::{Array2, Axis};

use crate::error::{McpaError, Result};
use crate::events::ResolvedCondition;
use crate::summarize::nan_mean;
use crate::tensor::{Dimension, LabeledTensor};

/// Data for one fold of the binary path.
#[derive(Debug, Clone)]
pub struct FoldSplit {
    /// `[n_train_rows, n_features]` condition-mean patterns.
    pub group_data: Array2<f64>,
    pub group_labels: Vec<String>,
    /// Subject of every `group_data` row.
    pub group_subjects: Vec<usize>,
    /// `[n_test_rows, n_features]` held-out instances.
    pub subj_data: Array2<f64>,
    pub subj_labels: Vec<String>,
}

/// Split `patterns` for held-out subject `held_out`.
///
/// `features` are feature-axis indices (already restricted to the analysed
/// subset); `train_subjects` must not contain `held_out`.  Rows that are
/// entirely `NaN` (missing trials, absent subjects) are dropped.
pub fn split_fold(
    patterns: &LabeledTensor,
    conditions: &[ResolvedCondition],
    held_out: usize,
    train_subjects: &[usize],
    features: &[usize],
) -> Result<FoldSplit> {
    if train_subjects.contains(&held_out) {
        return Err(McpaError::InvalidConfig(format!(
            "held-out subject {held_out} listed among training subjects"
        )));
    }
    let n_feat = features.len();
    let mut group_rows: Vec<f64> = Vec::new();
    let mut group_labels = Vec::new();
    let mut group_subjects = Vec::new();
    let mut subj_rows: Vec<f64> = Vec::new();
    let mut subj_labels = Vec::new();

    for cond in conditions {
        for &t in train_subjects {
            let rows = subject_rows(patterns, t, &cond.instances, features)?;
            let mean: Vec<f64> = rows
                .axis_iter(Axis(1))
                .map(|col| nan_mean(col.iter().copied()))
                .collect();
            if mean.iter().all(|v| v.is_nan()) {
                tracing::debug!(subject = t, condition = %cond.label, "no data; skipping training row");
                continue;
            }
            group_rows.extend(mean);
            group_labels.push(cond.label.clone());
            group_subjects.push(t);
        }

        let rows = subject_rows(patterns, held_out, &cond.instances, features)?;
        for row in rows.rows() {
            if row.iter().all(|v| v.is_nan()) {
                continue;
            }
            subj_rows.extend(row.iter().copied());
            subj_labels.push(cond.label.clone());
        }
    }

    Ok(FoldSplit {
        group_data: Array2::from_shape_vec((group_labels.len(), n_feat), group_rows)?,
        group_labels,
        group_subjects,
        subj_data: Array2::from_shape_vec((subj_labels.len(), n_feat), subj_rows)?,
        subj_labels,
    })
}

/// `[n_rows, n_features]` view of one subject's selected instances.
///
/// Rows enumerate instances (outer) and any remaining axes (inner).
pub fn subject_rows(
    patterns: &LabeledTensor,
    subject: usize,
    instances: &[usize],
    features: &[usize],
) -> Result<Array2<f64>> {
    let sub = patterns
        .index(Dimension::Subject, subject)?
        .select(Dimension::Instance, instances)?
        .select(Dimension::Feature, features)?;

    let mut order = vec![Dimension::Instance];
    order.extend(
        sub.dims()
            .iter()
            .copied()
            .filter(|d| !matches!(d, Dimension::Instance | Dimension::Feature)),
    );
    order.push(Dimension::Feature);
    let sub = sub.reorder(&order)?;

    let n_feat = features.len();
    let n_rows = if n_feat == 0 { 0 } else { sub.data().len() / n_feat };
    let (data, _) = sub.into_parts();
    Ok(data.into_shape_with_order((n_rows, n_feat))?)
}
