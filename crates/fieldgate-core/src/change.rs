//! Tolerance-based change detection.
//!
//! The detector keeps the last-published snapshot per field and decides once per
//! sampling cycle whether the cycle is worth publishing. The snapshot advances on
//! the decision, not on transmission: an unreachable broker must not make the next
//! cycles re-evaluate against stale values.

use std::collections::HashMap;

/// Default absolute tolerance on a field's native unit.
pub const DEFAULT_THRESHOLD: f64 = 0.001;

/// Outcome of observing one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// At least one field moved outside tolerance; publish all fields together.
    Publish,
    /// No significant change; publish nothing, mutate nothing.
    Hold,
}

/// Per-field snapshot comparator.
///
/// Fields are batched: if any single field crosses the threshold, the whole cycle
/// publishes and every field's snapshot is refreshed, so the downstream payload
/// stays self-consistent.
#[derive(Debug)]
pub struct ChangeDetector {
    threshold: f64,
    last_published: HashMap<String, f64>,
}

impl ChangeDetector {
    /// Create a detector with the given absolute threshold.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_published: HashMap::new(),
        }
    }

    /// Observe the current values of one sampling cycle.
    ///
    /// A field with no snapshot yet is always publish-worthy. On
    /// [`Decision::Publish`] the snapshot of every field is set to its current
    /// value, including fields individually under threshold.
    pub fn observe(&mut self, current: &[(String, f64)]) -> Decision {
        let worthy = current.iter().any(|(name, value)| {
            match self.last_published.get(name) {
                None => true,
                Some(snapshot) => (value - snapshot).abs() > self.threshold,
            }
        });

        if !worthy {
            return Decision::Hold;
        }

        for (name, value) in current {
            self.last_published.insert(name.clone(), *value);
        }
        Decision::Publish
    }

    /// Last-published value of a field, if any cycle has published it.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<f64> {
        self.last_published.get(name).copied()
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
