//! Outbound request rewriting.
//!
//! Runs on every request body, synchronously: nothing here awaits, so the
//! prune set read at the start is the one the whole body is rewritten
//! against. Pruned results keep their position and every field except
//! their content, which becomes the placeholder.

use std::collections::HashSet;
use std::sync::Arc;

use dcp_core::CallId;
use dcp_core::constants::PRUNED_PLACEHOLDER;
use dcp_settings::PruneSettings;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::format::{ObservedResult, WireFormat};
use crate::prompts::{NUDGE_TEXT, PRUNING_INSTRUCTION};
use crate::state::PruneStateStore;
use crate::tool_cache::ToolParameterCache;
use crate::tracker::ToolResultTracker;

/// Which prune set applies to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteScope<'a> {
    /// The request belongs to one known session.
    Session(&'a str),
    /// Session unknown: union of every loaded non-subagent session.
    AllSessions,
}

/// What a rewrite did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteReport {
    /// Detected body shape, if any.
    #[serde(skip)]
    pub format: Option<WireFormat>,
    /// The session is a subagent and the body was left alone.
    pub skipped_subagent: bool,
    /// Tool calls written to the parameter cache.
    pub cached_calls: usize,
    /// Results counted for the first time.
    pub new_results: usize,
    /// Results whose content was replaced.
    pub replaced: usize,
    /// The pruning instruction was added.
    pub instruction_injected: bool,
    /// A nudge entry was appended.
    pub nudge_appended: bool,
}

/// Rewrites request bodies against the prune state.
pub struct RequestRewriter {
    settings: Arc<PruneSettings>,
    store: Arc<PruneStateStore>,
    tracker: Arc<ToolResultTracker>,
    cache: Arc<ToolParameterCache>,
}

impl RequestRewriter {
    /// Create a rewriter over shared state.
    pub fn new(
        settings: Arc<PruneSettings>,
        store: Arc<PruneStateStore>,
        tracker: Arc<ToolResultTracker>,
        cache: Arc<ToolParameterCache>,
    ) -> Self {
        Self {
            settings,
            store,
            tracker,
            cache,
        }
    }

    /// Rewrite `body` in place.
    pub fn rewrite(&self, scope: RewriteScope<'_>, body: &mut Value) -> RewriteReport {
        let mut report = RewriteReport::default();
        if !self.settings.enabled {
            return report;
        }
        let Some(format) = WireFormat::detect(body) else {
            return report;
        };
        report.format = Some(format);

        if let RewriteScope::Session(session_id) = scope {
            if self.store.is_subagent(session_id) == Some(true) {
                report.skipped_subagent = true;
                return report;
            }
        }

        let adapter = format.adapter();

        for call in adapter.tool_calls(body) {
            self.cache.insert(call.id, &call.tool_name, call.arguments);
            report.cached_calls += 1;
        }

        report.new_results =
            adapter.count_tool_results(body, &self.tracker, &|id| self.cache.tool_name(id));

        let pruned: HashSet<CallId> = match scope {
            RewriteScope::Session(session_id) => self
                .store
                .cached_ids(session_id)
                .unwrap_or_default()
                .into_iter()
                .collect(),
            RewriteScope::AllSessions => self.store.union_ids(),
        };

        if !pruned.is_empty() {
            let is_pruned = |result: &ObservedResult| {
                if pruned.contains(&result.id) {
                    return true;
                }
                match (scope, result.synthetic_id, result.tool_name.as_deref()) {
                    (RewriteScope::Session(session_id), true, Some(name)) => self
                        .store
                        .nth_call(session_id, name, result.ordinal)
                        .is_some_and(|id| pruned.contains(&id)),
                    _ => false,
                }
            };
            report.replaced = adapter.replace_pruned(body, &is_pruned, PRUNED_PLACEHOLDER);
        }

        if self.settings.inject_instruction {
            report.instruction_injected = adapter.inject_instruction(body, PRUNING_INSTRUCTION);
        }

        if self.settings.nudge.enabled && self.tracker.should_nudge(self.settings.nudge.frequency) {
            report.nudge_appended = adapter.append_nudge(body, NUDGE_TEXT);
        }

        debug!(
            format = format.as_str(),
            cached = report.cached_calls,
            new_results = report.new_results,
            replaced = report.replaced,
            nudge = report.nudge_appended,
            "request rewritten"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryPersister;
    use serde_json::json;

    fn rewriter(settings: PruneSettings) -> (RequestRewriter, Arc<PruneStateStore>, Arc<ToolResultTracker>) {
        let store = Arc::new(PruneStateStore::new(Arc::new(MemoryPersister::new())));
        let tracker = Arc::new(ToolResultTracker::new());
        let cache = Arc::new(ToolParameterCache::new(settings.tool_cache_capacity));
        let rewriter = RequestRewriter::new(Arc::new(settings), store.clone(), tracker.clone(), cache);
        (rewriter, store, tracker)
    }

    fn chat_body() -> Value {
        json!({"messages": [
            {"role": "user", "content": "go"},
            {"role": "assistant", "tool_calls": [
                {"id": "a", "function": {"name": "read", "arguments": "{}"}},
                {"id": "b", "function": {"name": "read", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "a", "content": "A"},
            {"role": "tool", "tool_call_id": "b", "content": "B"}
        ]})
    }

    #[tokio::test]
    async fn replaces_pruned_results_for_session() {
        let (rewriter, store, _) = rewriter(PruneSettings::default());
        store.set("s1", vec![CallId::new("A")]).await.unwrap();

        let mut body = chat_body();
        let report = rewriter.rewrite(RewriteScope::Session("s1"), &mut body);
        assert_eq!(report.replaced, 1);
        assert_eq!(report.cached_calls, 2);
        assert_eq!(report.new_results, 2);
        assert!(report.instruction_injected);
        assert_eq!(body["messages"][2]["content"], PRUNED_PLACEHOLDER);
        assert_eq!(body["messages"][3]["content"], "B");
    }

    #[tokio::test]
    async fn subagent_sessions_are_untouched() {
        let (rewriter, store, tracker) = rewriter(PruneSettings::default());
        store.set("child", vec![CallId::new("a")]).await.unwrap();
        store.note_session_kind("child", true);

        let mut body = chat_body();
        let before = body.clone();
        let report = rewriter.rewrite(RewriteScope::Session("child"), &mut body);
        assert!(report.skipped_subagent);
        assert_eq!(body, before);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn nudge_is_appended_once_past_frequency() {
        let mut settings = PruneSettings::default();
        settings.nudge.frequency = 1;
        settings.inject_instruction = false;
        let (rewriter, _, _) = rewriter(settings);

        let mut body = chat_body();
        let first = rewriter.rewrite(RewriteScope::AllSessions, &mut body);
        assert!(first.nudge_appended);
        let second = rewriter.rewrite(RewriteScope::AllSessions, &mut body);
        assert!(!second.nudge_appended);
        assert_eq!(body["messages"].as_array().unwrap().len(), 5);

        let mut fresh = chat_body();
        let third = rewriter.rewrite(RewriteScope::AllSessions, &mut fresh);
        assert!(third.nudge_appended);
        assert_eq!(third.new_results, 0);
    }

    #[tokio::test]
    async fn gemini_results_align_to_session_call_order() {
        let (rewriter, store, _) = rewriter(PruneSettings::default());
        store.set("s1", vec![CallId::new("call_2")]).await.unwrap();
        store.record_call_order(
            "s1",
            vec![
                (CallId::new("call_1"), "read".into()),
                (CallId::new("call_2"), "read".into()),
            ],
        );

        let mut body = json!({"contents": [
            {"role": "user", "parts": [{"text": "go"}]},
            {"role": "model", "parts": [
                {"functionCall": {"name": "read", "args": {}}},
                {"functionCall": {"name": "read", "args": {}}}
            ]},
            {"role": "user", "parts": [
                {"functionResponse": {"name": "read", "response": {"output": "1"}}},
                {"functionResponse": {"name": "read", "response": {"output": "2"}}}
            ]}
        ]});
        let report = rewriter.rewrite(RewriteScope::Session("s1"), &mut body);
        assert_eq!(report.replaced, 1);
        let parts = &body["contents"][2]["parts"];
        assert_eq!(parts[0]["functionResponse"]["response"]["output"], "1");
        assert_eq!(
            parts[1]["functionResponse"]["response"]["content"],
            PRUNED_PLACEHOLDER
        );
    }

    #[test]
    fn unknown_shapes_pass_through() {
        let (rewriter, _, _) = rewriter(PruneSettings::default());
        let mut body = json!({"prompt": "hello"});
        let report = rewriter.rewrite(RewriteScope::AllSessions, &mut body);
        assert_eq!(report, RewriteReport::default());
        assert_eq!(body, json!({"prompt": "hello"}));
    }

    #[test]
    fn disabled_engine_does_nothing() {
        let settings = PruneSettings {
            enabled: false,
            ..PruneSettings::default()
        };
        let (rewriter, _, tracker) = rewriter(settings);
        let mut body = chat_body();
        let _ = rewriter.rewrite(RewriteScope::AllSessions, &mut body);
        assert_eq!(body, chat_body());
        assert_eq!(tracker.count(), 0);
    }
}
