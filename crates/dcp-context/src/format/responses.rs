//! Responses API bodies (`input` items).

use dcp_core::CallId;
use serde_json::{Value, json};

use super::{FormatAdapter, ObservedCall, ObservedResult, is_placeholder, parse_arguments};

/// Adapter for `input` bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponsesAdapter;

fn item_type(item: &Value) -> Option<&str> {
    item.get("type").and_then(Value::as_str)
}

fn is_user_message(item: &Value) -> bool {
    matches!(item_type(item), None | Some("message"))
        && item.get("role").and_then(Value::as_str) == Some("user")
}

fn text_of(block: &Value) -> Option<&str> {
    matches!(block.get("type").and_then(Value::as_str), Some("input_text" | "text"))
        .then(|| block.get("text").and_then(Value::as_str))
        .flatten()
}

impl FormatAdapter for ResponsesAdapter {
    fn tool_calls(&self, body: &Value) -> Vec<ObservedCall> {
        self.entries(body)
            .iter()
            .filter(|item| item_type(item) == Some("function_call"))
            .filter_map(|item| {
                let id = item.get("call_id").and_then(Value::as_str)?;
                Some(ObservedCall {
                    id: CallId::new(id),
                    tool_name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    arguments: parse_arguments(item.get("arguments")),
                })
            })
            .collect()
    }

    fn tool_results(&self, body: &Value) -> Vec<ObservedResult> {
        self.entries(body)
            .iter()
            .filter(|item| item_type(item) == Some("function_call_output"))
            .filter_map(|item| item.get("call_id").and_then(Value::as_str))
            .enumerate()
            .map(|(ordinal, id)| ObservedResult {
                id: CallId::new(id),
                tool_name: None,
                ordinal,
                synthetic_id: false,
            })
            .collect()
    }

    fn push_user_text(&self, body: &mut Value, text: &str) -> bool {
        let Some(items) = self.entries_mut(body) else {
            return false;
        };
        items.push(json!({
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": text}]
        }));
        true
    }

    fn user_text_only(&self, entry: &Value) -> Option<String> {
        if !is_user_message(entry) {
            return None;
        }
        match entry.get("content")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(blocks) if !blocks.is_empty() => blocks
                .iter()
                .map(text_of)
                .collect::<Option<Vec<_>>>()
                .map(|texts| texts.join("\n")),
            _ => None,
        }
    }

    fn entry_text(&self, entry: &Value) -> String {
        match entry.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(blocks)) => blocks
                .iter()
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }

    fn is_genuine_user_turn(&self, entry: &Value) -> bool {
        is_user_message(entry)
    }

    fn append_text_to_entry(&self, entry: &mut Value, text: &str) {
        match entry.get_mut("content") {
            Some(Value::String(s)) => {
                s.push_str("\n\n");
                s.push_str(text);
            }
            Some(Value::Array(blocks)) => {
                blocks.push(json!({"type": "input_text", "text": text}));
            }
            _ => entry["content"] = json!([{"type": "input_text", "text": text}]),
        }
    }

    fn replace_pruned(
        &self,
        body: &mut Value,
        predicate: &dyn Fn(&ObservedResult) -> bool,
        placeholder: &str,
    ) -> usize {
        let Some(items) = self.entries_mut(body) else {
            return 0;
        };
        let mut ordinal = 0;
        let mut replaced = 0;
        for item in items {
            if item_type(item) != Some("function_call_output") {
                continue;
            }
            let Some(id) = item.get("call_id").and_then(Value::as_str) else {
                continue;
            };
            let observed = ObservedResult {
                id: CallId::new(id),
                tool_name: None,
                ordinal,
                synthetic_id: false,
            };
            ordinal += 1;
            if !predicate(&observed) || is_placeholder(&item["output"], placeholder) {
                continue;
            }
            item["output"] = Value::String(placeholder.to_owned());
            replaced += 1;
        }
        replaced
    }

    fn entries<'a>(&self, body: &'a Value) -> &'a [Value] {
        body.get("input")
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    fn entries_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Vec<Value>> {
        body.get_mut("input").and_then(Value::as_array_mut)
    }
}
