//! Repeated lazy-load detection.
//!
//! Reading a deferred attribute on N instances one by one issues N extra
//! round trips: the N+1 pattern for columns. The tracker counts lazy loads
//! per `(entity, attribute)` and warns once the count reaches a threshold,
//! naming the option that would have loaded the column with the row.
//!
//! ```ignore
//! for book in &mut books {
//!     session.load_attribute(&cx, book, "summary").await?; // one fetch each
//! }
//!
//! // Fix: load it with the statement.
//! Select::new::<Book>().options([undefer("summary")]);
//! ```

use std::collections::HashMap;

/// Counts lazy attribute loads per entity and attribute.
#[derive(Debug)]
pub struct LazyLoadTracker {
    counts: HashMap<(&'static str, &'static str), LoadCount>,
    threshold: usize,
    enabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct LoadCount {
    loads: usize,
    group: Option<&'static str>,
}

/// Summary of recorded lazy loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LazyLoadStats {
    /// Lazy loads recorded.
    pub total_loads: usize,
    /// Distinct `(entity, attribute)` pairs loaded lazily.
    pub attributes_loaded: usize,
    /// Pairs whose count reached the threshold.
    pub repeated: usize,
}

impl Default for LazyLoadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyLoadTracker {
    /// Tracker with the default threshold of 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
        }
    }

    /// Set the warning threshold. Zero disables warnings but keeps counting.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Current threshold.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether loads are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop recording.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Resume recording.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one lazy load of `attribute` (member of `group`, if grouped).
    ///
    /// Returns true when this load made the pair reach the threshold.
    pub fn record_load(
        &mut self,
        entity: &'static str,
        attribute: &'static str,
        group: Option<&'static str>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let count = self.counts.entry((entity, attribute)).or_default();
        count.loads += 1;
        count.group = group;
        let loads = count.loads;

        let reached = self.threshold > 0 && loads == self.threshold;
        if reached {
            self.emit_warning(entity, attribute, group, loads);
        }
        reached
    }

    fn emit_warning(
        &self,
        entity: &'static str,
        attribute: &'static str,
        group: Option<&'static str>,
        loads: usize,
    ) {
        let suggestion = match group {
            Some(g) => format!("undefer_group(\"{g}\")"),
            None => format!("undefer(\"{attribute}\")"),
        };
        tracing::warn!(
            target: "sqlmodel::n1",
            entity = entity,
            attribute = attribute,
            loads = loads,
            threshold = self.threshold,
            suggestion = %suggestion,
            "Repeated lazy loads of a deferred attribute; load it with the statement using {suggestion}"
        );
    }

    /// Forget all counts.
    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Loads recorded for one pair.
    #[must_use]
    pub fn count_for(&self, entity: &str, attribute: &str) -> usize {
        self.counts
            .iter()
            .find(|((e, a), _)| *e == entity && *a == attribute)
            .map_or(0, |(_, c)| c.loads)
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> LazyLoadStats {
        LazyLoadStats {
            total_loads: self.counts.values().map(|c| c.loads).sum(),
            attributes_loaded: self.counts.len(),
            repeated: self
                .counts
                .values()
                .filter(|c| self.threshold > 0 && c.loads >= self.threshold)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_defaults() {
        let tracker = LazyLoadTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.stats(), LazyLoadStats::default());
    }

    #[test]
    fn test_threshold_reached_once() {
        let mut tracker = LazyLoadTracker::new().with_threshold(2);
        assert!(!tracker.record_load("books", "summary", None));
        assert!(tracker.record_load("books", "summary", None));
        assert!(!tracker.record_load("books", "summary", None));
        assert_eq!(tracker.count_for("books", "summary"), 3);
    }

    #[test]
    fn test_pairs_counted_separately() {
        let mut tracker = LazyLoadTracker::new().with_threshold(10);
        tracker.record_load("books", "summary", None);
        tracker.record_load("books", "cover", Some("media"));
        tracker.record_load("authors", "bio", None);
        tracker.record_load("books", "summary", None);

        assert_eq!(tracker.count_for("books", "summary"), 2);
        assert_eq!(tracker.count_for("authors", "bio"), 1);
        let stats = tracker.stats();
        assert_eq!(stats.total_loads, 4);
        assert_eq!(stats.attributes_loaded, 3);
        assert_eq!(stats.repeated, 0);
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let mut tracker = LazyLoadTracker::new();
        tracker.disable();
        assert!(!tracker.record_load("books", "summary", None));
        assert_eq!(tracker.count_for("books", "summary"), 0);
        tracker.enable();
        tracker.record_load("books", "summary", None);
        assert_eq!(tracker.count_for("books", "summary"), 1);
    }

    #[test]
    fn test_zero_threshold_never_warns() {
        let mut tracker = LazyLoadTracker::new().with_threshold(0);
        for _ in 0..5 {
            assert!(!tracker.record_load("books", "summary", None));
        }
        assert_eq!(tracker.stats().repeated, 0);
    }

    #[test]
    fn test_reset_clears_counts() {
        let mut tracker = LazyLoadTracker::new().with_threshold(1);
        tracker.record_load("books", "summary", None);
        assert_eq!(tracker.stats().repeated, 1);
        tracker.reset();
        assert_eq!(tracker.count_for("books", "summary"), 0);
    }
}
