//! Host transcript model.
//!
//! The host returns ordered session messages, each carrying typed parts.
//! Only the fields pruning needs are modelled; unknown part types
//! deserialize to [`MessagePart::Other`] so new host features never break
//! analysis.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CallId;

/// Role of a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User turn.
    User,
    /// Assistant turn (tool calls live here).
    Assistant,
}

/// Execution status of a tool part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Queued, not started.
    Pending,
    /// Executing.
    Running,
    /// Finished with output.
    Completed,
    /// Finished with an error.
    Error,
}

impl ToolStatus {
    /// Whether the call has produced a result that could be pruned.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Execution state of a tool part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolState {
    /// Current status.
    pub status: ToolStatus,
    /// Call arguments as reported by the host (may be empty).
    #[serde(default)]
    pub input: Value,
    /// Output text once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error text when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolState {
    /// Result text regardless of success: output, else error, else empty.
    #[must_use]
    pub fn result_text(&self) -> &str {
        self.output
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("")
    }
}

/// A tool invocation part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    /// Correlation id shared with the wire-level tool result.
    #[serde(rename = "callID")]
    pub call_id: CallId,
    /// Tool name.
    pub tool: String,
    /// Execution state.
    pub state: ToolState,
    /// Parent call when the host exposes batch grouping explicitly.
    #[serde(
        rename = "parentCallID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_call_id: Option<CallId>,
}

/// One typed part of a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
        /// Whether the host injected this text rather than the user typing it.
        #[serde(default)]
        synthetic: bool,
    },
    /// Tool invocation with its state.
    Tool(ToolPart),
    /// Any part type pruning does not inspect.
    #[serde(other)]
    Other,
}

/// A transcript message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Host message id.
    pub id: String,
    /// Author role.
    pub role: MessageRole,
    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl SessionMessage {
    /// Build a user message with a single text part.
    #[must_use]
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::User,
            parts: vec![MessagePart::Text {
                text: text.into(),
                synthetic: false,
            }],
        }
    }

    /// Build an assistant message from parts.
    #[must_use]
    pub fn assistant(id: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            parts,
        }
    }

    /// Iterate the tool parts of this message in order.
    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(|p| match p {
            MessagePart::Tool(tool) => Some(tool),
            _ => None,
        })
    }

    /// Concatenated text parts, newline-separated.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text the agent can quote when addressing a range: text parts, tool
    /// inputs, and tool results, newline-separated.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        let mut chunks: Vec<String> = Vec::new();
        for part in &self.parts {
            match part {
                MessagePart::Text { text, .. } => chunks.push(text.clone()),
                MessagePart::Tool(tool) => {
                    if !tool.state.input.is_null() {
                        chunks.push(tool.state.input.to_string());
                    }
                    let result = tool.state.result_text();
                    if !result.is_empty() {
                        chunks.push(result.to_owned());
                    }
                }
                MessagePart::Other => {}
            }
        }
        chunks.join("\n")
    }
}

impl ToolPart {
    /// Build a completed tool part.
    #[must_use]
    pub fn completed(call_id: &str, tool: &str, input: Value, output: &str) -> Self {
        Self {
            call_id: CallId::new(call_id),
            tool: tool.to_owned(),
            state: ToolState {
                status: ToolStatus::Completed,
                input,
                output: Some(output.to_owned()),
                error: None,
            },
            parent_call_id: None,
        }
    }
}

/// Provider/model pair, written `provider/model` in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    /// Provider id (e.g. `"openai"`).
    pub provider_id: String,
    /// Model id (e.g. `"gpt-5-mini"`).
    pub model_id: String,
}

impl ModelRef {
    /// Build from parts.
    #[must_use]
    pub fn new(provider_id: &str, model_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_owned(),
            model_id: model_id.to_owned(),
        }
    }

    /// Parse `provider/model`. The model part may itself contain slashes.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (provider, model) = raw.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

/// Session metadata from the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id.
    pub id: String,
    /// Parent session when this is a subagent session.
    #[serde(default, rename = "parentID", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Model the session is currently using.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
}

impl SessionInfo {
    /// Subagent sessions carry a non-empty parent reference.
    #[must_use]
    pub fn is_subagent(&self) -> bool {
        self.parent_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_host_message() {
        let msg: SessionMessage = serde_json::from_value(json!({
            "id": "msg_1",
            "role": "assistant",
            "parts": [
                {"type": "text", "text": "Reading file"},
                {"type": "step-start"},
                {
                    "type": "tool",
                    "callID": "Call_ABC",
                    "tool": "read",
                    "state": {"status": "completed", "input": {"path": "a.rs"}, "output": "fn main() {}"}
                }
            ]
        }))
        .unwrap();

        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.parts[1], MessagePart::Other);
        let tool = msg.tool_parts().next().unwrap();
        assert_eq!(tool.call_id.as_str(), "call_abc");
        assert_eq!(tool.state.status, ToolStatus::Completed);
        assert_eq!(tool.state.result_text(), "fn main() {}");
    }

    #[test]
    fn result_text_falls_back_to_error() {
        let state = ToolState {
            status: ToolStatus::Error,
            input: Value::Null,
            output: None,
            error: Some("permission denied".into()),
        };
        assert_eq!(state.result_text(), "permission denied");
        assert!(state.status.is_finished());
        assert!(!ToolStatus::Pending.is_finished());
    }

    #[test]
    fn searchable_text_includes_tool_io() {
        let msg = SessionMessage::assistant(
            "m1",
            vec![
                MessagePart::Text {
                    text: "looking".into(),
                    synthetic: false,
                },
                MessagePart::Tool(ToolPart::completed(
                    "c1",
                    "grep",
                    json!({"pattern": "TODO"}),
                    "src/lib.rs:10",
                )),
            ],
        );
        let text = msg.searchable_text();
        assert!(text.contains("looking"));
        assert!(text.contains("\"pattern\":\"TODO\""));
        assert!(text.contains("src/lib.rs:10"));
        assert_eq!(msg.text(), "looking");
    }

    #[test]
    fn model_ref_parse() {
        let m = ModelRef::parse("openrouter/anthropic/claude-haiku").unwrap();
        assert_eq!(m.provider_id, "openrouter");
        assert_eq!(m.model_id, "anthropic/claude-haiku");
        assert_eq!(m.to_string(), "openrouter/anthropic/claude-haiku");
        assert!(ModelRef::parse("no-slash").is_none());
        assert!(ModelRef::parse("/model").is_none());
    }

    #[test]
    fn subagent_detection() {
        let mut info = SessionInfo {
            id: "ses_child".into(),
            ..Default::default()
        };
        assert!(!info.is_subagent());
        info.parent_id = Some(String::new());
        assert!(!info.is_subagent());
        info.parent_id = Some("ses_parent".into());
        assert!(info.is_subagent());
    }
}
