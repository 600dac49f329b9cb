//! Prompt assembly for the decision call.

use crate::decision::DecisionRequest;

/// Instructions for the analysis model.
pub const DECISION_SYSTEM_PROMPT: &str = "You review an AI coding session and decide which tool \
outputs are no longer needed. A tool output is obsolete when a later call superseded it, when it \
was an exploratory dead end, or when its information has already been acted on. Keep anything \
the assistant may still need to finish the current task. Only choose ids from the candidate list. \
Respond with JSON: {\"pruned_tool_call_ids\": [..], \"reasoning\": \"..\"}.";

/// JSON schema for the structured output.
#[must_use]
pub fn decision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "pruned_tool_call_ids": {"type": "array", "items": {"type": "string"}},
            "reasoning": {"type": "string"}
        },
        "required": ["pruned_tool_call_ids", "reasoning"],
        "additionalProperties": false
    })
}

/// Render the user-turn prompt for a decision request.
#[must_use]
pub fn render_user_prompt(request: &DecisionRequest) -> String {
    let ids = request
        .candidate_ids
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Candidate tool call ids: [{ids}]\n\nSession:\n{}",
        request.session_summary
    );
    if let Some(reason) = request.reason.as_deref().filter(|r| !r.is_empty()) {
        prompt.push_str("\n\nThe assistant asked for pruning because: ");
        prompt.push_str(reason);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcp_core::CallId;

    #[test]
    fn prompt_lists_candidates_and_reason() {
        let request = DecisionRequest {
            session_id: "ses_1".into(),
            candidate_ids: vec![CallId::new("A"), CallId::new("b")],
            session_summary: "[user] fix the bug".into(),
            reason: Some("finished exploring".into()),
        };
        let prompt = render_user_prompt(&request);
        assert!(prompt.starts_with("Candidate tool call ids: [a, b]"));
        assert!(prompt.contains("[user] fix the bug"));
        assert!(prompt.ends_with("finished exploring"));
    }

    #[test]
    fn schema_requires_ids() {
        let schema = decision_schema();
        assert_eq!(schema["required"][0], "pruned_tool_call_ids");
    }
}
