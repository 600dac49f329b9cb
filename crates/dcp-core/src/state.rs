//! Per-session prune state.
//!
//! [`SessionPruneState`] is the persisted record for one session. It is only
//! ever replaced wholesale; callers compute the union of a freshly-read copy
//! and their own new ids with [`SessionPruneState::merge_ids`] before writing
//! it back, which keeps `pruned_ids` monotonically non-decreasing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CallId;

/// Cumulative pruning statistics for a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PruneStats {
    /// Tool results pruned over the session's lifetime.
    pub total_tools_pruned: u64,
    /// Estimated tokens saved by pruning.
    pub total_tokens_saved: u64,
    /// Messages covered by squash ranges.
    pub total_messages_squashed: u64,
    /// Completed analysis passes that pruned something.
    pub analysis_runs: u64,
}

/// A contiguous message range replaced by one caller-supplied summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquashRange {
    /// First message of the range; the summary is displayed in its place.
    pub anchor_message_id: String,
    /// Caller-supplied summary text.
    pub summary_text: String,
    /// Tool calls inside the range.
    pub contained_tool_ids: Vec<CallId>,
    /// Messages inside the range, in transcript order.
    pub contained_message_ids: Vec<String>,
    /// When the squash was recorded.
    pub created_at: DateTime<Utc>,
}

/// Persisted prune state for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPruneState {
    /// Session this state belongs to.
    pub session_id: String,
    /// Pruned call ids in the order they were first pruned.
    #[serde(default)]
    pub pruned_ids: Vec<CallId>,
    /// Cumulative statistics.
    #[serde(default)]
    pub stats: PruneStats,
    /// Squashed ranges, append-only.
    #[serde(default)]
    pub squashes: Vec<SquashRange>,
    /// Last successful mutation.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SessionPruneState {
    /// Empty state for a session seen for the first time.
    #[must_use]
    pub fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_owned(),
            pruned_ids: Vec::new(),
            stats: PruneStats::default(),
            squashes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Ordered union: existing ids keep their order, new ids are appended in
    /// the order given, duplicates dropped.
    #[must_use]
    pub fn merge_ids(existing: &[CallId], new: &[CallId]) -> Vec<CallId> {
        let mut seen: HashSet<&CallId> = HashSet::with_capacity(existing.len() + new.len());
        let mut merged = Vec::with_capacity(existing.len() + new.len());
        for id in existing.iter().chain(new) {
            if seen.insert(id) {
                merged.push(id.clone());
            }
        }
        merged
    }

    /// Ids in `candidates` that are not yet pruned.
    #[must_use]
    pub fn delta(&self, candidates: &[CallId]) -> Vec<CallId> {
        let pruned: HashSet<&CallId> = self.pruned_ids.iter().collect();
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|id| !pruned.contains(id) && seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Whether a call id has been pruned.
    #[must_use]
    pub fn is_pruned(&self, id: &str) -> bool {
        let id = crate::ids::normalize_call_id(id);
        self.pruned_ids.iter().any(|p| p.as_str() == id)
    }

    /// Message ids covered by any squash range.
    pub fn squashed_message_ids(&self) -> impl Iterator<Item = &str> {
        self.squashes
            .iter()
            .flat_map(|s| s.contained_message_ids.iter().map(String::as_str))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
