//! Agent-invoked range pruning.
//!
//! The agent quotes a snippet from the first and the last message of a
//! finished stretch of conversation. Each snippet must occur exactly once
//! across the transcript, and the start message must not come after the end
//! message. Subagent sessions are refused.
//!
//! `squash` replaces the range with a summary for display and prunes the
//! tool results inside it; `discard` only prunes the tool results.

use std::sync::Arc;

use chrono::Utc;
use dcp_core::{
    CallId, MessagePart, MessageRole, PruneError, RangeBoundary, Result, SessionMessage,
    SessionPruneState, SquashRange,
};
use dcp_settings::{PruneSettings, SummaryMode};
use tracing::{debug, info, instrument};

use crate::host::SessionHost;
use crate::notification::{Notifier, PruneSource, PruneSummary};
use crate::state::PruneStateStore;
use crate::tracker::ToolResultTracker;

/// Message and byte offset of a unique snippet match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangePoint {
    /// Index of the matching message.
    pub message_index: usize,
    /// Byte offset of the match within the message's searchable text.
    pub offset: usize,
}

/// Located inclusive message range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageRange {
    /// Where the start snippet matched.
    pub start: RangePoint,
    /// Where the end snippet matched.
    pub end: RangePoint,
}

impl MessageRange {
    /// Messages covered, inclusive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.message_index - self.start.message_index + 1
    }

    /// Always false; a range covers at least one message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Result of a squash or discard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeOutcome {
    /// First message of the range.
    pub anchor_message_id: String,
    /// `end - start + 1`.
    pub messages_squashed: usize,
    /// Tool ids newly added to the prune set.
    pub tools_pruned: Vec<CallId>,
    /// Estimated tokens saved by the newly pruned tools.
    pub tokens_saved: u64,
}

/// Find the unique message range delimited by two snippets.
///
/// Only message order matters: both snippets may come from one message in
/// either order.
pub fn locate_range(messages: &[SessionMessage], start: &str, end: &str) -> Result<MessageRange> {
    let texts: Vec<String> = messages.iter().map(SessionMessage::searchable_text).collect();
    let start = locate_unique(&texts, start, RangeBoundary::Start)?;
    let end = locate_unique(&texts, end, RangeBoundary::End)?;
    if start.message_index > end.message_index {
        return Err(PruneError::InvalidRange {
            start_index: start.message_index,
            end_index: end.message_index,
        });
    }
    Ok(MessageRange { start, end })
}

fn locate_unique(texts: &[String], needle: &str, boundary: RangeBoundary) -> Result<RangePoint> {
    let not_found = |matches| PruneError::RangeNotFound {
        boundary,
        needle: needle.to_owned(),
        matches,
    };
    if needle.trim().is_empty() {
        return Err(not_found(0));
    }

    let mut found = None;
    let mut matches = 0;
    for (message_index, text) in texts.iter().enumerate() {
        for (offset, _) in text.match_indices(needle) {
            matches += 1;
            found = Some(RangePoint {
                message_index,
                offset,
            });
        }
    }
    match (matches, found) {
        (1, Some(point)) => Ok(point),
        _ => Err(not_found(matches)),
    }
}

/// Substitute one summary message for every squashed span.
///
/// Messages inside a squash are dropped; the anchor is replaced by a user
/// message carrying the summary. Everything else passes through.
pub fn render_squashed(messages: &[SessionMessage], state: &SessionPruneState) -> Vec<SessionMessage> {
    if state.squashes.is_empty() {
        return messages.to_vec();
    }
    let covered: std::collections::HashSet<&str> = state.squashed_message_ids().collect();
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        if let Some(squash) = state
            .squashes
            .iter()
            .find(|s| s.anchor_message_id == message.id)
        {
            out.push(SessionMessage {
                id: message.id.clone(),
                role: MessageRole::User,
                parts: vec![MessagePart::Text {
                    text: format!(
                        "[Squashed {} messages]\n{}",
                        squash.contained_message_ids.len(),
                        squash.summary_text
                    ),
                    synthetic: true,
                }],
            });
        } else if !covered.contains(message.id.as_str()) {
            out.push(message.clone());
        }
    }
    out
}

/// Squash and discard tool handlers.
pub struct RangeHandler {
    settings: Arc<PruneSettings>,
    host: Arc<dyn SessionHost>,
    store: Arc<PruneStateStore>,
    tracker: Arc<ToolResultTracker>,
    notifier: Arc<dyn Notifier>,
}

impl RangeHandler {
    /// Create a handler over shared state.
    pub fn new(
        settings: Arc<PruneSettings>,
        host: Arc<dyn SessionHost>,
        store: Arc<PruneStateStore>,
        tracker: Arc<ToolResultTracker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            host,
            store,
            tracker,
            notifier,
        }
    }

    /// Replace a range with `summary` and prune its tool results.
    #[instrument(skip(self, start, end, summary))]
    pub async fn squash(
        &self,
        session_id: &str,
        start: &str,
        end: &str,
        summary: &str,
    ) -> Result<RangeOutcome> {
        self.apply(session_id, start, end, Some(summary)).await
    }

    /// Prune the tool results inside a range.
    #[instrument(skip(self, start, end))]
    pub async fn discard(&self, session_id: &str, start: &str, end: &str) -> Result<RangeOutcome> {
        self.apply(session_id, start, end, None).await
    }

    async fn apply(
        &self,
        session_id: &str,
        start: &str,
        end: &str,
        summary: Option<&str>,
    ) -> Result<RangeOutcome> {
        let info = self.host.session_info(session_id).await?;
        self.store.note_session_kind(session_id, info.is_subagent());
        if info.is_subagent() {
            return Err(PruneError::SubagentSession {
                session_id: session_id.to_owned(),
            });
        }

        let messages = self.host.messages(session_id).await?;
        let range = locate_range(&messages, start, end)?;
        let span = &messages[range.start.message_index..=range.end.message_index];

        let tool_parts: Vec<_> = span
            .iter()
            .flat_map(SessionMessage::tool_parts)
            .filter(|p| !self.settings.is_protected(&p.tool))
            .collect();
        let tool_ids: Vec<CallId> = SessionPruneState::merge_ids(
            &[],
            &tool_parts.iter().map(|p| p.call_id.clone()).collect::<Vec<_>>(),
        );
        let anchor_message_id = span[0].id.clone();

        let guard = self.store.lock(session_id).await;
        let fresh = self.store.get_state(session_id).await;
        let delta = fresh.delta(&tool_ids);
        let tokens_saved: u64 = tool_parts
            .iter()
            .filter(|p| delta.contains(&p.call_id))
            .map(|p| dcp_core::constants::estimate_tokens(p.state.result_text()))
            .sum();

        let mut next = fresh.clone();
        next.pruned_ids = SessionPruneState::merge_ids(&fresh.pruned_ids, &tool_ids);
        next.stats.total_tools_pruned += delta.len() as u64;
        next.stats.total_tokens_saved += tokens_saved;
        if let Some(summary) = summary {
            next.squashes.push(SquashRange {
                anchor_message_id: anchor_message_id.clone(),
                summary_text: summary.trim().to_owned(),
                contained_tool_ids: tool_ids.clone(),
                contained_message_ids: span.iter().map(|m| m.id.clone()).collect(),
                created_at: Utc::now(),
            });
            next.stats.total_messages_squashed += range.len() as u64;
        }
        let total_pruned = next.pruned_ids.len();
        // The in-memory state is already updated; the next write retries persistence.
        let _ = self.store.set_state(next).await;
        drop(guard);

        self.tracker.mark_tool_prune();

        let source = if summary.is_some() {
            PruneSource::Squash
        } else {
            PruneSource::Discard
        };
        if self.settings.pruning_summary != SummaryMode::Off && !delta.is_empty() {
            self.notifier.notify(&PruneSummary {
                session_id: session_id.to_owned(),
                source,
                pruned_count: delta.len(),
                total_pruned,
                tokens_saved,
                groups: Vec::new(),
                reasoning: None,
            });
        }
        info!(
            ?source,
            messages = range.len(),
            tools = delta.len(),
            "range pruned"
        );
        debug!(anchor = %anchor_message_id, "range anchor");

        Ok(RangeOutcome {
            anchor_message_id,
            messages_squashed: range.len(),
            tools_pruned: delta,
            tokens_saved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::TracingNotifier;
    use crate::state::MemoryPersister;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use dcp_core::{SessionInfo, ToolPart};
    use serde_json::json;

    fn transcript() -> Vec<SessionMessage> {
        vec![
            SessionMessage::user("m0", "please refactor the parser"),
            SessionMessage::assistant(
                "m1",
                vec![MessagePart::Tool(ToolPart::completed(
                    "t1",
                    "read",
                    json!({"filePath": "parser.rs"}),
                    "fn parse() {}",
                ))],
            ),
            SessionMessage::user("m2", "now add tests"),
            SessionMessage::assistant("m3", vec![MessagePart::Text {
                text: "tests added".into(),
                synthetic: false,
            }]),
        ]
    }

    #[test]
    fn locates_unique_snippets() {
        let range = locate_range(&transcript(), "refactor the parser", "now add").unwrap();
        assert_eq!(range.start.message_index, 0);
        assert_eq!(range.end.message_index, 2);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn snippets_may_quote_tool_io() {
        let range = locate_range(&transcript(), "parser.rs", "fn parse()").unwrap();
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn missing_snippet_is_reported() {
        assert_matches!(
            locate_range(&transcript(), "nowhere", "tests added"),
            Err(PruneError::RangeNotFound { boundary: RangeBoundary::Start, matches: 0, .. })
        );
    }

    #[test]
    fn ambiguous_snippet_is_reported() {
        assert_matches!(
            locate_range(&transcript(), "please", "test"),
            Err(PruneError::RangeNotFound { boundary: RangeBoundary::End, matches: 2, .. })
        );
    }

    #[test]
    fn reversed_range_is_invalid() {
        assert_matches!(
            locate_range(&transcript(), "tests added", "please refactor"),
            Err(PruneError::InvalidRange { start_index: 3, end_index: 0 })
        );
    }

    #[test]
    fn snippets_in_one_message_match_in_either_order() {
        let messages = vec![SessionMessage::user("m0", "alpha then beta")];
        let range = locate_range(&messages, "beta", "alpha").unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.start.message_index, 0);
    }

    struct Host {
        parent: Option<&'static str>,
    }

    #[async_trait]
    impl SessionHost for Host {
        async fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
            Ok(SessionInfo {
                id: session_id.into(),
                parent_id: self.parent.map(String::from),
                model: None,
            })
        }

        async fn messages(&self, _session_id: &str) -> Result<Vec<SessionMessage>> {
            Ok(transcript())
        }
    }

    fn handler(parent: Option<&'static str>) -> (RangeHandler, Arc<PruneStateStore>, Arc<ToolResultTracker>) {
        let store = Arc::new(PruneStateStore::new(Arc::new(MemoryPersister::new())));
        let tracker = Arc::new(ToolResultTracker::new());
        let handler = RangeHandler::new(
            Arc::new(PruneSettings::default()),
            Arc::new(Host { parent }),
            store.clone(),
            tracker.clone(),
            Arc::new(TracingNotifier),
        );
        (handler, store, tracker)
    }

    #[tokio::test]
    async fn squash_records_range_and_prunes_tools() {
        let (handler, store, tracker) = handler(None);
        let outcome = handler
            .squash("s1", "please refactor", "now add tests", "parser refactored")
            .await
            .unwrap();
        assert_eq!(outcome.messages_squashed, 3);
        assert_eq!(outcome.tools_pruned, vec![CallId::new("t1")]);

        let state = store.get_state("s1").await;
        assert_eq!(state.squashes.len(), 1);
        assert_eq!(state.squashes[0].summary_text, "parser refactored");
        assert!(tracker.snapshot().skip_next_idle);
    }

    #[tokio::test]
    async fn subagent_sessions_are_refused() {
        let (handler, store, tracker) = handler(Some("parent"));
        assert_matches!(
            handler
                .squash("child", "please refactor", "now add tests", "summary")
                .await,
            Err(PruneError::SubagentSession { .. })
        );
        assert_matches!(
            handler.discard("child", "please refactor", "now add tests").await,
            Err(PruneError::SubagentSession { .. })
        );

        let state = store.get_state("child").await;
        assert!(state.pruned_ids.is_empty());
        assert!(state.squashes.is_empty());
        assert_eq!(store.is_subagent("child"), Some(true));
        assert!(!tracker.snapshot().skip_next_idle);
    }

    #[test]
    fn render_replaces_span_with_summary() {
        let mut state = SessionPruneState::empty("s1");
        state.squashes.push(SquashRange {
            anchor_message_id: "m0".into(),
            summary_text: "refactored parser".into(),
            contained_tool_ids: vec![CallId::new("t1")],
            contained_message_ids: vec!["m0".into(), "m1".into(), "m2".into()],
            created_at: Utc::now(),
        });
        let rendered = render_squashed(&transcript(), &state);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].id, "m0");
        assert!(rendered[0].text().ends_with("refactored parser"));
        assert_eq!(rendered[1].id, "m3");
    }
}
