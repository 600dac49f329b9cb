//! Post-prune summaries.

use std::collections::BTreeMap;

use dcp_core::ToolCallRecord;
use dcp_settings::SummaryMode;
use serde::Serialize;
use tracing::info;

/// At most this many parameter samples are kept per tool.
pub const MAX_SAMPLES_PER_TOOL: usize = 5;

/// Parameter labels are cut to this many characters.
pub const SAMPLE_CHARS: usize = 60;

/// What caused a prune.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneSource {
    /// Background analysis after the session went idle.
    Idle,
    /// The agent called the prune tool.
    Tool,
    /// The agent squashed a range.
    Squash,
    /// The agent discarded a range.
    Discard,
}

/// Pruned calls of one tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroup {
    /// Tool name.
    pub tool_name: String,
    /// Number of pruned calls.
    pub count: usize,
    /// Short parameter labels of the first few calls.
    pub samples: Vec<String>,
}

/// Structured result of one prune, handed to the [`Notifier`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneSummary {
    /// Session that was pruned.
    pub session_id: String,
    /// Trigger.
    pub source: PruneSource,
    /// Ids newly pruned by this pass.
    pub pruned_count: usize,
    /// Size of the session's prune set afterwards.
    pub total_pruned: usize,
    /// Estimated tokens saved by this pass.
    pub tokens_saved: u64,
    /// Per-tool breakdown (empty in minimal mode).
    pub groups: Vec<ToolGroup>,
    /// Model reasoning, when an analysis model was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl PruneSummary {
    /// Build a summary from the records pruned in this pass.
    pub fn from_records(
        session_id: &str,
        source: PruneSource,
        pruned: &[&ToolCallRecord],
        total_pruned: usize,
        mode: SummaryMode,
    ) -> Self {
        let tokens_saved = pruned.iter().map(|r| r.estimated_tokens()).sum();
        let groups = if mode == SummaryMode::Detailed {
            group_by_tool(pruned)
        } else {
            Vec::new()
        };
        Self {
            session_id: session_id.to_owned(),
            source,
            pruned_count: pruned.len(),
            total_pruned,
            tokens_saved,
            groups,
            reasoning: None,
        }
    }

    /// One-line description for tool responses and logs.
    #[must_use]
    pub fn headline(&self) -> String {
        let noun = if self.pruned_count == 1 { "output" } else { "outputs" };
        format!(
            "Pruned {} tool {noun} (~{} tokens saved, {} pruned in session)",
            self.pruned_count,
            format_tokens(self.tokens_saved),
            self.total_pruned
        )
    }
}

fn group_by_tool(pruned: &[&ToolCallRecord]) -> Vec<ToolGroup> {
    let mut groups: BTreeMap<&str, ToolGroup> = BTreeMap::new();
    for record in pruned {
        let group = groups
            .entry(record.tool_name.as_str())
            .or_insert_with(|| ToolGroup {
                tool_name: record.tool_name.clone(),
                count: 0,
                samples: Vec::new(),
            });
        group.count += 1;
        let label = record.parameter_label(SAMPLE_CHARS);
        if group.samples.len() < MAX_SAMPLES_PER_TOOL && !label.is_empty() {
            group.samples.push(label);
        }
    }
    groups.into_values().collect()
}

/// Compact token count: `950`, `1.2k`, `3.4M`.
#[must_use]
pub fn format_tokens(tokens: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let value = tokens as f64;
    if tokens >= 1_000_000 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Receives prune summaries. Rendering is up to the host.
pub trait Notifier: Send + Sync {
    /// Deliver a summary.
    fn notify(&self, summary: &PruneSummary);
}

/// Logs summaries through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, summary: &PruneSummary) {
        info!(
            session_id = %summary.session_id,
            source = ?summary.source,
            pruned = summary.pruned_count,
            total_pruned = summary.total_pruned,
            tokens_saved = summary.tokens_saved,
            tools = summary.groups.len(),
            "{}",
            summary.headline()
        );
    }
}
