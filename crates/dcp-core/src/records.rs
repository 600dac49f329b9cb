//! Tool-call records observed during one analysis pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::estimate_tokens;
use crate::ids::CallId;
use crate::transcript::ToolStatus;

/// Everything the analysis pass knows about one tool call.
///
/// Built when a tool part is first observed in the transcript and read-only
/// for the rest of the pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    /// Normalized call id.
    pub id: CallId,
    /// Tool name.
    pub tool_name: String,
    /// Call arguments (from the transcript, or the parameter cache when the
    /// transcript omitted them).
    pub parameters: Value,
    /// Result text (output or error).
    pub output_text: String,
    /// Execution status at collection time.
    pub status: ToolStatus,
    /// Batch call that grouped this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_parent_id: Option<CallId>,
    /// Index of the transcript message that holds the call.
    pub message_index: usize,
}

impl ToolCallRecord {
    /// Estimated tokens that pruning this result saves.
    #[must_use]
    pub fn estimated_tokens(&self) -> u64 {
        estimate_tokens(&self.output_text)
    }

    /// Short human-readable description of the call arguments.
    ///
    /// Prefers well-known path/command keys, falls back to compact JSON,
    /// truncated to `max_chars`.
    #[must_use]
    pub fn parameter_label(&self, max_chars: usize) -> String {
        const PREFERRED: &[&str] = &["filePath", "path", "command", "pattern", "url", "query"];
        let label = self
            .parameters
            .as_object()
            .and_then(|obj| {
                PREFERRED
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
            })
            .map_or_else(|| compact_json(&self.parameters), str::to_owned);
        truncate_chars(&label, max_chars)
    }
}

fn compact_json(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Truncate to at most `max_chars` characters, appending `…` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
