//! Analysis orchestrator.
//!
//! Decides which finished tool results a session no longer needs:
//!
//! 1. skip subagent sessions and short transcripts
//! 2. collect tool records in emission order and derive batch groups
//! 3. candidates = finished calls that are neither pruned nor protected
//! 4. run the configured strategies (deduplication, model analysis)
//! 5. expand batch parents to their children
//! 6. merge into a freshly read state under the session lock and persist
//! 7. reset the tracker and notify
//!
//! Idle passes are best-effort: every failure is logged and dropped, and
//! the next idle event starts over. Tool-triggered passes return their
//! error to the agent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dcp_core::constants::{BATCH_CHILD_PREFIX, BATCH_TOOL_NAME};
use dcp_core::records::truncate_chars;
use dcp_core::{
    CallId, MessageRole, Result, SessionInfo, SessionMessage, SessionPruneState, ToolCallRecord,
};
use dcp_llm::{DecisionRequest, ModelSelector, PruneDecider, PruneDecision};
use dcp_settings::{PruneSettings, Strategy, SummaryMode};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::batch::BatchRelations;
use crate::dedup::find_duplicates;
use crate::host::SessionHost;
use crate::notification::{Notifier, PruneSource, PruneSummary};
use crate::state::PruneStateStore;
use crate::tool_cache::ToolParameterCache;
use crate::tracker::ToolResultTracker;

const SUMMARY_TEXT_CHARS: usize = 400;
const SUMMARY_LABEL_CHARS: usize = 80;

/// Why an analysis pass runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisTrigger {
    /// The session went idle.
    Idle,
    /// The agent called the prune tool.
    Tool {
        /// Reason given by the agent.
        reason: Option<String>,
    },
}

impl AnalysisTrigger {
    fn source(&self) -> PruneSource {
        match self {
            Self::Idle => PruneSource::Idle,
            Self::Tool { .. } => PruneSource::Tool,
        }
    }
}

/// Result of a pass that pruned something.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Ids added to the prune set by this pass.
    pub newly_pruned: Vec<CallId>,
    /// Summary handed to the notifier.
    pub summary: PruneSummary,
}

/// Collaborators of the janitor.
pub struct JanitorDeps {
    /// Engine settings.
    pub settings: Arc<PruneSettings>,
    /// Transcript source.
    pub host: Arc<dyn SessionHost>,
    /// Shared prune state.
    pub store: Arc<PruneStateStore>,
    /// Shared result tracker.
    pub tracker: Arc<ToolResultTracker>,
    /// Shared parameter cache.
    pub cache: Arc<ToolParameterCache>,
    /// Analysis model selection.
    pub selector: ModelSelector,
    /// Decision call.
    pub decider: Arc<dyn PruneDecider>,
    /// Summary sink.
    pub notifier: Arc<dyn Notifier>,
}

/// Runs analysis passes.
pub struct Janitor {
    settings: Arc<PruneSettings>,
    host: Arc<dyn SessionHost>,
    store: Arc<PruneStateStore>,
    tracker: Arc<ToolResultTracker>,
    cache: Arc<ToolParameterCache>,
    selector: ModelSelector,
    decider: Arc<dyn PruneDecider>,
    notifier: Arc<dyn Notifier>,
}

impl Janitor {
    /// Assemble a janitor.
    pub fn new(deps: JanitorDeps) -> Self {
        Self {
            settings: deps.settings,
            host: deps.host,
            store: deps.store,
            tracker: deps.tracker,
            cache: deps.cache,
            selector: deps.selector,
            decider: deps.decider,
            notifier: deps.notifier,
        }
    }

    /// Idle hook. Never fails; skipped once right after the prune tool ran.
    pub async fn on_idle(&self, session_id: &str) {
        if !self.settings.enabled {
            return;
        }
        if self.tracker.take_skip_idle() {
            debug!(session_id, "prune tool just ran, skipping idle analysis");
            return;
        }
        match self.analyze(session_id, AnalysisTrigger::Idle).await {
            Ok(Some(outcome)) => {
                debug!(session_id, pruned = outcome.newly_pruned.len(), "idle analysis pruned");
            }
            Ok(None) => debug!(session_id, "idle analysis found nothing to prune"),
            Err(e) => warn!(session_id, kind = e.kind(), error = %e, "idle analysis failed"),
        }
    }

    /// Run [`Janitor::on_idle`] in the background.
    pub fn spawn_idle(self: &Arc<Self>, session_id: String) -> JoinHandle<()> {
        let janitor = Arc::clone(self);
        tokio::spawn(async move { janitor.on_idle(&session_id).await })
    }

    /// Prune tool entry point.
    pub async fn on_prune_tool(
        &self,
        session_id: &str,
        reason: Option<String>,
    ) -> Result<Option<PruneOutcome>> {
        let outcome = self
            .analyze(session_id, AnalysisTrigger::Tool { reason })
            .await?;
        if outcome.is_some() {
            self.tracker.mark_tool_prune();
        } else {
            self.tracker.skip_next_idle();
        }
        Ok(outcome)
    }

    /// One analysis pass. `Ok(None)` when there was nothing to do.
    #[instrument(skip(self))]
    pub async fn analyze(
        &self,
        session_id: &str,
        trigger: AnalysisTrigger,
    ) -> Result<Option<PruneOutcome>> {
        let info = self.host.session_info(session_id).await?;
        self.store.note_session_kind(session_id, info.is_subagent());
        if info.is_subagent() {
            debug!("subagent session, not analyzing");
            return Ok(None);
        }

        let messages = self.host.messages(session_id).await?;
        if messages.len() < self.settings.min_messages {
            debug!(messages = messages.len(), "transcript too short");
            return Ok(None);
        }

        let (records, relations) = collect_tool_records(&messages, &self.cache);

        let previous = self.store.get_state(session_id).await;
        let candidates: Vec<&ToolCallRecord> = records
            .iter()
            .filter(|r| {
                r.status.is_finished()
                    && !previous.is_pruned(&r.id)
                    && !self.settings.is_protected(&r.tool_name)
            })
            .collect();
        if candidates.is_empty() {
            debug!("no prunable candidates");
            return Ok(None);
        }
        self.store.record_call_order(
            session_id,
            records
                .iter()
                .map(|r| (r.id.clone(), r.tool_name.clone()))
                .collect(),
        );

        let (chosen, reasoning) = self
            .run_strategies(&info, &messages, &records, &candidates, &trigger)
            .await?;

        let candidate_ids: HashSet<&CallId> = candidates.iter().map(|r| &r.id).collect();
        let (accepted, rejected): (Vec<CallId>, Vec<CallId>) = chosen
            .into_iter()
            .partition(|id| candidate_ids.contains(id));
        if !rejected.is_empty() {
            debug!(dropped = rejected.len(), "ignoring ids outside the candidate set");
        }

        let by_id: HashMap<&CallId, &ToolCallRecord> = records.iter().map(|r| (&r.id, r)).collect();
        let expanded: Vec<CallId> = relations
            .expand(&SessionPruneState::merge_ids(&[], &accepted))
            .into_iter()
            .filter(|id| {
                by_id
                    .get(id)
                    .is_none_or(|r| !self.settings.is_protected(&r.tool_name))
            })
            .collect();
        if expanded.is_empty() {
            return Ok(None);
        }

        let guard = self.store.lock(session_id).await;
        let fresh = self.store.get_state(session_id).await;
        let delta = fresh.delta(&expanded);
        if delta.is_empty() {
            return Ok(None);
        }
        let delta_records: Vec<&ToolCallRecord> =
            delta.iter().filter_map(|id| by_id.get(id).copied()).collect();
        let tokens_saved: u64 = delta_records.iter().map(|r| r.estimated_tokens()).sum();

        let mut next = fresh.clone();
        next.pruned_ids = SessionPruneState::merge_ids(&fresh.pruned_ids, &expanded);
        next.stats.total_tools_pruned += delta.len() as u64;
        next.stats.total_tokens_saved += tokens_saved;
        next.stats.analysis_runs += 1;
        let total_pruned = next.pruned_ids.len();
        // The in-memory state is already updated; the next write retries persistence.
        let _ = self.store.set_state(next).await;
        drop(guard);

        self.tracker.reset();

        let mode = self.settings.pruning_summary;
        let mut summary = PruneSummary::from_records(
            session_id,
            trigger.source(),
            &delta_records,
            total_pruned,
            mode,
        );
        summary.reasoning = reasoning;
        if mode != SummaryMode::Off {
            self.notifier.notify(&summary);
        }
        info!(
            pruned = delta.len(),
            total_pruned,
            tokens_saved,
            "analysis pass complete"
        );

        Ok(Some(PruneOutcome {
            newly_pruned: delta,
            summary,
        }))
    }

    async fn run_strategies(
        &self,
        info: &SessionInfo,
        messages: &[SessionMessage],
        records: &[ToolCallRecord],
        candidates: &[&ToolCallRecord],
        trigger: &AnalysisTrigger,
    ) -> Result<(Vec<CallId>, Option<String>)> {
        let strategies = match trigger {
            AnalysisTrigger::Idle => &self.settings.strategies.on_idle,
            AnalysisTrigger::Tool { .. } => &self.settings.strategies.on_tool,
        };

        let mut chosen = Vec::new();
        let mut reasoning = None;

        if strategies.contains(&Strategy::Deduplication) {
            let duplicates = find_duplicates(candidates);
            debug!(duplicates = duplicates.len(), "deduplication strategy");
            chosen.extend(duplicates);
        }

        if strategies.contains(&Strategy::AiAnalysis) {
            let remaining: Vec<CallId> = candidates
                .iter()
                .map(|r| r.id.clone())
                .filter(|id| !chosen.contains(id))
                .collect();
            if !remaining.is_empty() {
                let reason = match trigger {
                    AnalysisTrigger::Tool { reason } => reason.clone(),
                    AnalysisTrigger::Idle => None,
                };
                let decision = self
                    .request_decision(info, messages, records, remaining, reason)
                    .await?;
                chosen.extend(decision.pruned_tool_call_ids);
                reasoning = Some(decision.reasoning).filter(|r| !r.is_empty());
            }
        }

        Ok((chosen, reasoning))
    }

    async fn request_decision(
        &self,
        info: &SessionInfo,
        messages: &[SessionMessage],
        records: &[ToolCallRecord],
        candidate_ids: Vec<CallId>,
        reason: Option<String>,
    ) -> Result<PruneDecision> {
        let model = self.selector.select(info.model.as_ref()).await?;
        let request = DecisionRequest {
            session_id: info.id.clone(),
            candidate_ids,
            session_summary: render_session_summary(messages, records),
            reason,
        };
        let decision = self.decider.decide(&model, &request).await.map_err(|e| {
            warn!(category = e.category(), error = %e, model = %model.model, "decision call failed");
            e
        })?;
        debug!(
            model = %model.model,
            returned = decision.pruned_tool_call_ids.len(),
            "decision received"
        );
        Ok(decision)
    }
}

/// Tool records in emission order plus batch groups.
///
/// Parameters missing from the transcript are filled from `cache`. Batch
/// children come from explicit `parentCallID` metadata when present;
/// otherwise a `batch` call opens a group that collects the following
/// `prt_`-prefixed ids until a call without the prefix closes it.
pub fn collect_tool_records(
    messages: &[SessionMessage],
    cache: &ToolParameterCache,
) -> (Vec<ToolCallRecord>, BatchRelations) {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut open_batch: Option<CallId> = None;

    for (message_index, message) in messages.iter().enumerate() {
        for part in message.tool_parts() {
            if !seen.insert(part.call_id.clone()) {
                continue;
            }
            let prefixed = part.call_id.starts_with(BATCH_CHILD_PREFIX);
            let batch_parent_id = match &part.parent_call_id {
                Some(parent) => Some(parent.clone()),
                None if prefixed => open_batch.clone(),
                None => None,
            };
            if part.tool.eq_ignore_ascii_case(BATCH_TOOL_NAME) {
                open_batch = Some(part.call_id.clone());
            } else if part.parent_call_id.is_none() && !prefixed {
                open_batch = None;
            }

            let mut parameters = part.state.input.clone();
            if is_blank(&parameters) {
                if let Some(cached) = cache.get(&part.call_id) {
                    parameters = cached.parameters;
                }
            }

            records.push(ToolCallRecord {
                id: part.call_id.clone(),
                tool_name: part.tool.clone(),
                parameters,
                output_text: part.state.result_text().to_owned(),
                status: part.state.status,
                batch_parent_id,
                message_index,
            });
        }
    }

    let relations = BatchRelations::from_records(&records);
    (records, relations)
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Compact transcript rendering for the decision call.
pub fn render_session_summary(messages: &[SessionMessage], records: &[ToolCallRecord]) -> String {
    let by_id: HashMap<&CallId, &ToolCallRecord> = records.iter().map(|r| (&r.id, r)).collect();
    let mut out = String::new();
    for message in messages {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        let text = message.text();
        if !text.trim().is_empty() {
            out.push_str(&format!("[{role}] {}\n", truncate_chars(text.trim(), SUMMARY_TEXT_CHARS)));
        }
        for part in message.tool_parts() {
            let Some(record) = by_id.get(&part.call_id) else {
                continue;
            };
            out.push_str(&format!(
                "  - {} {}({}) {:?}, ~{} tokens\n",
                record.id,
                record.tool_name,
                record.parameter_label(SUMMARY_LABEL_CHARS),
                record.status,
                record.estimated_tokens()
            ));
        }
    }
    out
}
