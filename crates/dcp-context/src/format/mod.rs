//! Wire format adapters.
//!
//! Outbound request bodies arrive in one of three shapes:
//!
//! - **Chat completions** (`messages`): results are `role: "tool"` entries
//!   keyed by `tool_call_id`, or `tool_result` blocks inside user entries
//!   keyed by `tool_use_id`.
//! - **Gemini** (`contents`): results are `functionResponse` parts. When the
//!   part has no native `id`, a positional pseudo-id `gemini:<name>:<n>` is
//!   assigned, where `n` counts occurrences of that function name in the
//!   body. Calls and responses are counted separately, so the n-th call of a
//!   name and the n-th response of that name share a pseudo-id.
//! - **Responses** (`input`): `function_call` / `function_call_output` items
//!   keyed by `call_id`.
//!
//! [`WireFormat::detect`] picks the shape once per request and every
//! operation then goes through the matching [`FormatAdapter`].

mod chat;
mod gemini;
mod responses;

use dcp_core::CallId;
use dcp_core::constants::is_internal_tool;
use serde_json::Value;

pub use chat::ChatAdapter;
pub use gemini::GeminiAdapter;
pub use responses::ResponsesAdapter;

use crate::prompts::NUDGE_TEXT;
use crate::tracker::ToolResultTracker;

/// A tool call found in a request body.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedCall {
    /// Normalized call id (native or pseudo).
    pub id: CallId,
    /// Tool or function name.
    pub tool_name: String,
    /// Parsed call arguments.
    pub arguments: Value,
}

/// A tool result found in a request body.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedResult {
    /// Normalized call id (native or pseudo).
    pub id: CallId,
    /// Tool name, when the entry carries one.
    pub tool_name: Option<String>,
    /// Occurrence index among results with the same tool name.
    pub ordinal: usize,
    /// Whether `id` was synthesized from position.
    pub synthetic_id: bool,
}

/// Body shape of an outbound request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `messages` array.
    ChatCompletions,
    /// `contents` array.
    Gemini,
    /// `input` array.
    Responses,
}

impl WireFormat {
    /// Inspect a body. Returns `None` for shapes pruning does not touch.
    #[must_use]
    pub fn detect(body: &Value) -> Option<Self> {
        if body.get("input").is_some_and(Value::is_array) {
            Some(Self::Responses)
        } else if body.get("contents").is_some_and(Value::is_array) {
            Some(Self::Gemini)
        } else if body.get("messages").is_some_and(Value::is_array) {
            Some(Self::ChatCompletions)
        } else {
            None
        }
    }

    /// The adapter for this format.
    #[must_use]
    pub fn adapter(self) -> &'static dyn FormatAdapter {
        match self {
            Self::ChatCompletions => &ChatAdapter,
            Self::Gemini => &GeminiAdapter,
            Self::Responses => &ResponsesAdapter,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat",
            Self::Gemini => "gemini",
            Self::Responses => "responses",
        }
    }
}

/// Format-specific body operations.
pub trait FormatAdapter: Send + Sync {
    /// Every tool call in the body, in order.
    fn tool_calls(&self, body: &Value) -> Vec<ObservedCall>;

    /// Every tool result in the body, in order.
    fn tool_results(&self, body: &Value) -> Vec<ObservedResult>;

    /// Append `text` as a trailing user entry.
    fn push_user_text(&self, body: &mut Value, text: &str) -> bool;

    /// The text of `entry` if it is a user entry made only of text.
    fn user_text_only(&self, entry: &Value) -> Option<String>;

    /// All text carried by `entry`, newline-separated.
    fn entry_text(&self, entry: &Value) -> String;

    /// Whether `entry` is a user turn typed by a person, as opposed to a
    /// turn that only carries tool results.
    fn is_genuine_user_turn(&self, entry: &Value) -> bool;

    /// Append `text` to the content of a user entry.
    fn append_text_to_entry(&self, entry: &mut Value, text: &str);

    /// Replace the content of every result for which `predicate` holds.
    /// Returns how many entries changed.
    fn replace_pruned(
        &self,
        body: &mut Value,
        predicate: &dyn Fn(&ObservedResult) -> bool,
        placeholder: &str,
    ) -> usize;

    /// The top-level entry list.
    fn entries<'a>(&self, body: &'a Value) -> &'a [Value];

    /// The top-level entry list, mutably.
    fn entries_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Vec<Value>>;

    /// Record results with the tracker and return how many were new and
    /// counted. Results of the pruning tools are marked seen but not
    /// counted. `lookup_name` resolves tool names for results that do not
    /// carry one.
    fn count_tool_results(
        &self,
        body: &Value,
        tracker: &ToolResultTracker,
        lookup_name: &dyn Fn(&CallId) -> Option<String>,
    ) -> usize {
        let names: std::collections::HashMap<CallId, String> = self
            .tool_calls(body)
            .into_iter()
            .map(|c| (c.id, c.tool_name))
            .collect();

        let mut internal = Vec::new();
        let mut external = Vec::new();
        for result in self.tool_results(body) {
            let is_internal = result
                .tool_name
                .clone()
                .or_else(|| names.get(&result.id).cloned())
                .or_else(|| lookup_name(&result.id))
                .is_some_and(|n| is_internal_tool(&n));
            if is_internal {
                internal.push(result.id);
            } else {
                external.push(result.id);
            }
        }

        let _ = tracker.record(&internal, true);
        tracker.record(&external, false)
    }

    /// Whether `entry` is exactly the nudge `text`.
    fn is_nudge_entry(&self, entry: &Value, text: &str) -> bool {
        self.user_text_only(entry)
            .is_some_and(|t| t.trim() == text.trim())
    }

    /// Append the nudge as the last entry unless it already is.
    fn append_nudge(&self, body: &mut Value, text: &str) -> bool {
        if self
            .entries(body)
            .last()
            .is_some_and(|last| self.is_nudge_entry(last, text))
        {
            return false;
        }
        self.push_user_text(body, text)
    }

    /// Add `text` to the most recent genuine user turn, skipping trailing
    /// nudge-only turns. No-op if that turn already contains it.
    fn inject_instruction(&self, body: &mut Value, text: &str) -> bool {
        let target = self.entries(body).iter().rposition(|entry| {
            self.is_genuine_user_turn(entry) && !self.is_nudge_entry(entry, NUDGE_TEXT)
        });
        let Some(index) = target else {
            return false;
        };
        let Some(entries) = self.entries_mut(body) else {
            return false;
        };
        let entry = &mut entries[index];
        if self.entry_text(entry).contains(text.trim()) {
            return false;
        }
        self.append_text_to_entry(entry, text);
        true
    }
}

/// Parse call arguments that may arrive as a JSON-encoded string.
pub(crate) fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

/// Whether a content value already equals the placeholder.
pub(crate) fn is_placeholder(content: &Value, placeholder: &str) -> bool {
    content.as_str() == Some(placeholder)
}
