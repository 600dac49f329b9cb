//! Gemini bodies (`contents` / `parts`).

use std::collections::HashMap;

use dcp_core::CallId;
use serde_json::{Value, json};

use super::{FormatAdapter, ObservedCall, ObservedResult, is_placeholder};

/// Pseudo-id source tag.
pub const PSEUDO_ID_TAG: &str = "gemini";

/// Adapter for `contents` bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeminiAdapter;

/// Positional pseudo-id for the `ordinal`-th occurrence of `name`.
#[must_use]
pub fn pseudo_id(name: &str, ordinal: usize) -> CallId {
    CallId::new(&format!("{PSEUDO_ID_TAG}:{name}:{ordinal}"))
}

fn parts(entry: &Value) -> &[Value] {
    entry
        .get("parts")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn is_user(entry: &Value) -> bool {
    entry.get("role").and_then(Value::as_str) == Some("user")
}

/// Resolve the id of a `functionCall` / `functionResponse` payload.
fn resolve_id(
    payload: &Value,
    counters: &mut HashMap<String, usize>,
) -> (CallId, String, usize, bool) {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let slot = counters.entry(name.clone()).or_default();
    let ordinal = *slot;
    *slot += 1;
    match payload.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(id) => (CallId::new(id), name, ordinal, false),
        None => (pseudo_id(&name, ordinal), name, ordinal, true),
    }
}

impl FormatAdapter for GeminiAdapter {
    fn tool_calls(&self, body: &Value) -> Vec<ObservedCall> {
        let mut counters = HashMap::new();
        self.entries(body)
            .iter()
            .flat_map(parts)
            .filter_map(|part| part.get("functionCall"))
            .map(|call| {
                let (id, tool_name, _, _) = resolve_id(call, &mut counters);
                ObservedCall {
                    id,
                    tool_name,
                    arguments: call.get("args").cloned().unwrap_or(Value::Null),
                }
            })
            .collect()
    }

    fn tool_results(&self, body: &Value) -> Vec<ObservedResult> {
        let mut counters = HashMap::new();
        self.entries(body)
            .iter()
            .flat_map(parts)
            .filter_map(|part| part.get("functionResponse"))
            .map(|response| {
                let (id, name, ordinal, synthetic_id) = resolve_id(response, &mut counters);
                ObservedResult {
                    id,
                    tool_name: Some(name),
                    ordinal,
                    synthetic_id,
                }
            })
            .collect()
    }

    fn push_user_text(&self, body: &mut Value, text: &str) -> bool {
        let Some(entries) = self.entries_mut(body) else {
            return false;
        };
        entries.push(json!({"role": "user", "parts": [{"text": text}]}));
        true
    }

    fn user_text_only(&self, entry: &Value) -> Option<String> {
        if !is_user(entry) || parts(entry).is_empty() {
            return None;
        }
        parts(entry)
            .iter()
            .map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Option<Vec<_>>>()
            .map(|texts| texts.join("\n"))
    }

    fn entry_text(&self, entry: &Value) -> String {
        parts(entry)
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn is_genuine_user_turn(&self, entry: &Value) -> bool {
        is_user(entry) && !parts(entry).iter().any(|p| p.get("functionResponse").is_some())
    }

    fn append_text_to_entry(&self, entry: &mut Value, text: &str) {
        match entry.get_mut("parts").and_then(Value::as_array_mut) {
            Some(parts) => parts.push(json!({"text": text})),
            None => entry["parts"] = json!([{"text": text}]),
        }
    }

    fn replace_pruned(
        &self,
        body: &mut Value,
        predicate: &dyn Fn(&ObservedResult) -> bool,
        placeholder: &str,
    ) -> usize {
        let Some(entries) = self.entries_mut(body) else {
            return 0;
        };
        let mut counters = HashMap::new();
        let mut replaced = 0;
        for entry in entries {
            let Some(parts) = entry.get_mut("parts").and_then(Value::as_array_mut) else {
                continue;
            };
            for part in parts {
                let Some(response) = part.get_mut("functionResponse") else {
                    continue;
                };
                let (id, name, ordinal, synthetic_id) = resolve_id(response, &mut counters);
                let observed = ObservedResult {
                    id,
                    tool_name: Some(name),
                    ordinal,
                    synthetic_id,
                };
                if !predicate(&observed) {
                    continue;
                }
                let slot = &mut response["response"];
                if slot.get("content").is_some_and(|c| is_placeholder(c, placeholder))
                    && slot.as_object().is_some_and(|o| o.len() == 1)
                {
                    continue;
                }
                *slot = json!({"content": placeholder});
                replaced += 1;
            }
        }
        replaced
    }

    fn entries<'a>(&self, body: &'a Value) -> &'a [Value] {
        body.get("contents")
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    fn entries_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Vec<Value>> {
        body.get_mut("contents").and_then(Value::as_array_mut)
    }
}
