//! Tool result tracker.
//!
//! Process-wide. Counts tool results the first time any request carries
//! them and drives nudge frequency. The count only goes back to zero after
//! a successful prune.

use std::collections::HashSet;

use dcp_core::CallId;
use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot of the tracker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    /// Distinct result ids seen so far.
    pub seen: usize,
    /// Counted results since the last prune.
    pub tool_result_count: usize,
    /// Whether the next idle analysis will be skipped.
    pub skip_next_idle: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    seen_ids: HashSet<CallId>,
    tool_result_count: usize,
    skip_next_idle: bool,
}

/// Deduplicating counter of tool results.
#[derive(Debug, Default)]
pub struct ToolResultTracker {
    state: Mutex<TrackerState>,
}

impl ToolResultTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record result ids and return how many were new and counted.
    ///
    /// Internal results are remembered but never counted and never clear
    /// the idle-skip flag.
    pub fn record(&self, ids: &[CallId], is_internal: bool) -> usize {
        let mut state = self.state.lock();
        let fresh = ids
            .iter()
            .filter(|id| state.seen_ids.insert((*id).clone()))
            .count();
        if is_internal || fresh == 0 {
            return 0;
        }
        state.tool_result_count += fresh;
        state.skip_next_idle = false;
        fresh
    }

    /// Whether requests should carry a nudge.
    pub fn should_nudge(&self, frequency: usize) -> bool {
        self.state.lock().tool_result_count > frequency
    }

    /// Counted results since the last prune.
    pub fn count(&self) -> usize {
        self.state.lock().tool_result_count
    }

    /// Zero the count. Seen ids are kept.
    pub fn reset(&self) {
        self.state.lock().tool_result_count = 0;
    }

    /// The prune tool ran: skip the idle analysis that follows and reset.
    pub fn mark_tool_prune(&self) {
        let mut state = self.state.lock();
        state.skip_next_idle = true;
        state.tool_result_count = 0;
    }

    /// Skip the next idle analysis without touching the count.
    pub fn skip_next_idle(&self) {
        self.state.lock().skip_next_idle = true;
    }

    /// Consume the idle-skip flag.
    pub fn take_skip_idle(&self) -> bool {
        std::mem::take(&mut self.state.lock().skip_next_idle)
    }

    /// Current counters.
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock();
        TrackerSnapshot {
            seen: state.seen_ids.len(),
            tool_result_count: state.tool_result_count,
            skip_next_idle: state.skip_next_idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<CallId> {
        raw.iter().map(|s| CallId::new(s)).collect()
    }

    #[test]
    fn counts_each_id_once_case_insensitively() {
        let tracker = ToolResultTracker::new();
        assert_eq!(tracker.record(&ids(&["a", "b"]), false), 2);
        assert_eq!(tracker.record(&ids(&["A", "c"]), false), 1);
        assert_eq!(tracker.count(), 3);
    }

    #[test]
    fn nudge_threshold_is_strictly_greater() {
        let tracker = ToolResultTracker::new();
        let _ = tracker.record(&ids(&["a", "b"]), false);
        assert!(!tracker.should_nudge(2));
        let _ = tracker.record(&ids(&["c"]), false);
        assert!(tracker.should_nudge(2));
    }

    #[test]
    fn reset_keeps_seen_ids() {
        let tracker = ToolResultTracker::new();
        let _ = tracker.record(&ids(&["a"]), false);
        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.record(&ids(&["a"]), false), 0);
        assert_eq!(tracker.snapshot().seen, 1);
    }

    #[test]
    fn skip_flag_lifecycle() {
        let tracker = ToolResultTracker::new();
        tracker.mark_tool_prune();
        let _ = tracker.record(&ids(&["p"]), true);
        assert!(tracker.snapshot().skip_next_idle);

        let _ = tracker.record(&ids(&["x"]), false);
        assert!(!tracker.take_skip_idle());

        tracker.mark_tool_prune();
        assert!(tracker.take_skip_idle());
        assert!(!tracker.take_skip_idle());
    }
}
