//! Event types and condition selectors.
//!
//! The [`EventRegistry`] keeps event types in first-seen order and is never
//! re-sorted: registry positions double as row/column indices elsewhere.
//! A [`Condition`] groups one or more event types under a single label, either
//! by name or by registry position.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{McpaError, Result};

/// Separator used when joining a condition's selectors into its label.
pub const LABEL_SEPARATOR: &str = "+";

/// Unique event types in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventRegistry {
    names: Vec<String>,
}

impl EventRegistry {
    /// Build from the per-instance event labels.
    pub fn from_instances<S: AsRef<str>>(events: &[S]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for e in events {
            let e = e.as_ref();
            if !names.iter().any(|n| n == e) {
                names.push(e.to_string());
            }
        }
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// One analysis condition: a set of event-type selectors.
///
/// In JSON a condition is either a list of event names (`["A", "B"]`) or a
/// list of zero-based registry positions (`[0, 1]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Named(Vec<String>),
    Index(Vec<usize>),
}

impl Condition {
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self::Named(vec![name.into()])
    }

    /// Joined selector string; this is the class label handed to classifiers.
    pub fn label(&self) -> String {
        match self {
            Self::Named(v) => v.join(LABEL_SEPARATOR),
            Self::Index(v) => v
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(LABEL_SEPARATOR),
        }
    }

    /// Registry positions selected by this condition, in registry order.
    ///
    /// Names are intersected with the registry (unmatched names are logged);
    /// an empty intersection is an error.  Positions are used as given.
    pub fn resolve(&self, registry: &EventRegistry) -> Result<Vec<usize>> {
        match self {
            Self::Named(names) => {
                for n in names.iter().filter(|n| registry.position(n).is_none()) {
                    tracing::warn!(event = %n, "condition selector matches no event type");
                }
                let hits: Vec<usize> = (0..registry.len())
                    .filter(|&i| names.iter().any(|n| *n == registry.names[i]))
                    .collect();
                if hits.is_empty() {
                    return Err(McpaError::UnknownEvent(self.label()));
                }
                Ok(hits)
            }
            Self::Index(idx) => {
                if let Some(&bad) = idx.iter().find(|&&i| i >= registry.len()) {
                    return Err(McpaError::IndexOutOfRange {
                        what: "event type",
                        index: bad,
                        size: registry.len(),
                    });
                }
                if idx.is_empty() {
                    return Err(McpaError::InvalidConfig("empty condition selector".into()));
                }
                Ok(idx.clone())
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A condition bound to a concrete dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCondition {
    pub label: String,
    /// Registry positions of the selected event types.
    pub events: Vec<usize>,
    /// Instance indices carrying one of those event types.
    pub instances: Vec<usize>,
}

/// Resolve every condition against the per-instance event labels.
///
/// Conditions may not share event types: every instance must map to at most
/// one label.
pub fn resolve_conditions<S: AsRef<str>>(
    conditions: &[Condition],
    instance_events: &[S],
) -> Result<Vec<ResolvedCondition>> {
    let registry = EventRegistry::from_instances(instance_events);
    let mut out: Vec<ResolvedCondition> = Vec::with_capacity(conditions.len());
    for c in conditions {
        let events = c.resolve(&registry)?;
        if let Some(prev) = out.iter().find(|r| r.events.iter().any(|e| events.contains(e))) {
            return Err(McpaError::InvalidConfig(format!(
                "conditions '{}' and '{}' share an event type",
                prev.label,
                c.label()
            )));
        }
        let instances = instance_events
            .iter()
            .enumerate()
            .filter(|(_, e)| registry.position(e.as_ref()).is_some_and(|p| events.contains(&p)))
            .map(|(i, _)| i)
            .collect();
        out.push(ResolvedCondition { label: c.label(), events, instances });
    }
    Ok(out)
}
