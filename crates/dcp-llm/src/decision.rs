//! Structured prune decision.
//!
//! The decision call receives the prunable candidate ids and a compact
//! rendering of the session, and must answer with
//! `{"pruned_tool_call_ids": [...], "reasoning": "..."}`. Its internal
//! reasoning is opaque; only this structure is consumed.

use async_trait::async_trait;
use dcp_core::CallId;
use serde::{Deserialize, Serialize};

use crate::errors::DecisionError;
use crate::model_selector::ModelHandle;

/// Input to the decision call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    /// Session being analyzed.
    pub session_id: String,
    /// Ids the model may choose from.
    pub candidate_ids: Vec<CallId>,
    /// Compact rendering of the session transcript.
    pub session_summary: String,
    /// Free-form reason from the agent when triggered by the prune tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Output of the decision call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneDecision {
    /// Ids the model judged obsolete.
    pub pruned_tool_call_ids: Vec<CallId>,
    /// The model's explanation.
    #[serde(default)]
    pub reasoning: String,
}

/// The external decision call.
///
/// Implementors must be `Send + Sync`; the orchestrator shares one instance
/// across sessions.
#[async_trait]
pub trait PruneDecider: Send + Sync {
    /// Ask `model` which candidates are obsolete.
    async fn decide(
        &self,
        model: &ModelHandle,
        request: &DecisionRequest,
    ) -> Result<PruneDecision, DecisionError>;
}

/// Parse the model's structured output.
///
/// Tolerates markdown code fences and prose around the JSON object. Fails
/// when no object is present, the JSON is invalid, or
/// `pruned_tool_call_ids` is missing or not a list of strings.
pub fn parse_decision(text: &str) -> Result<PruneDecision, DecisionError> {
    let cleaned = strip_code_fences(text);
    let object = extract_object(cleaned)
        .ok_or_else(|| DecisionError::malformed("no JSON object in response"))?;

    let value: serde_json::Value = serde_json::from_str(object)
        .map_err(|e| DecisionError::malformed(format!("invalid JSON: {e}")))?;

    if value.get("pruned_tool_call_ids").is_none() {
        return Err(DecisionError::malformed(
            "missing 'pruned_tool_call_ids' field",
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| DecisionError::malformed(format!("unexpected shape: {e}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_plain_json() {
        let d = parse_decision(r#"{"pruned_tool_call_ids": ["Call_A", "call_c"], "reasoning": "stale reads"}"#)
            .unwrap();
        assert_eq!(
            d.pruned_tool_call_ids,
            vec![CallId::new("call_a"), CallId::new("call_c")]
        );
        assert_eq!(d.reasoning, "stale reads");
    }

    #[test]
    fn parse_fenced_json() {
        let text = "```json\n{\"pruned_tool_call_ids\": [], \"reasoning\": \"nothing\"}\n```";
        let d = parse_decision(text).unwrap();
        assert!(d.pruned_tool_call_ids.is_empty());
    }

    #[test]
    fn parse_with_surrounding_prose() {
        let text = "Here you go: {\"pruned_tool_call_ids\": [\"x\"]} hope that helps";
        let d = parse_decision(text).unwrap();
        assert_eq!(d.pruned_tool_call_ids, vec![CallId::new("x")]);
        assert_eq!(d.reasoning, "");
    }

    #[test]
    fn parse_missing_ids_is_malformed() {
        let err = parse_decision(r#"{"reasoning": "forgot"}"#).unwrap_err();
        assert_matches!(err, DecisionError::Malformed { ref reason } if reason.contains("pruned_tool_call_ids"));
    }

    #[test]
    fn parse_wrong_type_is_malformed() {
        let err = parse_decision(r#"{"pruned_tool_call_ids": [1, 2]}"#).unwrap_err();
        assert_matches!(err, DecisionError::Malformed { .. });
    }

    #[test]
    fn parse_no_object_is_malformed() {
        assert_matches!(
            parse_decision("I cannot help with that").unwrap_err(),
            DecisionError::Malformed { .. }
        );
    }
}
