//! Epoched patterns for a group of participants.
use crate::error::{McpaError, Result};
use crate::events::EventRegistry;
use crate::tensor::{Dimension, LabeledTensor};

/// Pattern tensor plus the event label of every instance.
///
/// The instance axis is shared by all subjects and sessions: instance `i`
/// has event type `events[i]` everywhere, and missing trials are `NaN`.
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub patterns: LabeledTensor,
    pub events: Vec<String>,
    /// Sample times (s) along the time axis, relative to event onset.
    pub times: Option<Vec<f64>>,
}

impl PatternSet {
    /// Check that labels and times agree with the tensor.
    pub fn new(patterns: LabeledTensor, events: Vec<String>, times: Option<Vec<f64>>) -> Result<Self> {
        let n_inst = patterns.len_of(Dimension::Instance)?;
        if events.len() != n_inst {
            return Err(McpaError::DimensionMismatch(format!(
                "{} event labels for {n_inst} instances",
                events.len()
            )));
        }
        patterns.axis_of(Dimension::Feature)?;
        patterns.axis_of(Dimension::Subject)?;
        if let Some(t) = &times {
            let n_t = patterns.len_of(Dimension::Time)?;
            if t.len() != n_t {
                return Err(McpaError::DimensionMismatch(format!(
                    "{} sample times for {n_t} time points",
                    t.len()
                )));
            }
        }
        Ok(Self { patterns, events, times })
    }

    pub fn registry(&self) -> EventRegistry {
        EventRegistry::from_instances(&self.events)
    }

    pub fn n_features(&self) -> usize {
        self.patterns.len_of(Dimension::Feature).unwrap_or(0)
    }

    pub fn n_subjects(&self) -> usize {
        self.patterns.len_of(Dimension::Subject).unwrap_or(0)
    }
}
