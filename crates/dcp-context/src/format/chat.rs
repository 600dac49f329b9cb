//! Chat-completions bodies (`messages`), including inline
//! `tool_use` / `tool_result` content blocks.

use std::collections::HashMap;

use dcp_core::CallId;
use serde_json::{Value, json};

use super::{FormatAdapter, ObservedCall, ObservedResult, is_placeholder, parse_arguments};

/// Adapter for `messages` bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChatAdapter;

fn role(entry: &Value) -> Option<&str> {
    entry.get("role").and_then(Value::as_str)
}

fn blocks(entry: &Value) -> &[Value] {
    entry
        .get("content")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}

fn next_ordinal(counters: &mut HashMap<String, usize>, name: Option<&str>) -> usize {
    let slot = counters.entry(name.unwrap_or_default().to_owned()).or_default();
    let ordinal = *slot;
    *slot += 1;
    ordinal
}

impl ChatAdapter {
    /// Visit every result slot in order. The callback gets the observed
    /// result and the JSON object whose `content` holds the output.
    fn visit_results(&self, body: &mut Value, mut visit: impl FnMut(&ObservedResult, &mut Value)) {
        let Some(entries) = self.entries_mut(body) else {
            return;
        };
        let mut counters = HashMap::new();
        for entry in entries {
            match role(entry) {
                Some("tool") => {
                    let Some(id) = entry.get("tool_call_id").and_then(Value::as_str) else {
                        continue;
                    };
                    let tool_name = entry.get("name").and_then(Value::as_str).map(String::from);
                    let result = ObservedResult {
                        id: CallId::new(id),
                        ordinal: next_ordinal(&mut counters, tool_name.as_deref()),
                        tool_name,
                        synthetic_id: false,
                    };
                    visit(&result, entry);
                }
                Some("user") => {
                    let Some(blocks) = entry.get_mut("content").and_then(Value::as_array_mut)
                    else {
                        continue;
                    };
                    for block in blocks {
                        if block_type(block) != Some("tool_result") {
                            continue;
                        }
                        let Some(id) = block.get("tool_use_id").and_then(Value::as_str) else {
                            continue;
                        };
                        let result = ObservedResult {
                            id: CallId::new(id),
                            tool_name: None,
                            ordinal: next_ordinal(&mut counters, None),
                            synthetic_id: false,
                        };
                        visit(&result, block);
                    }
                }
                _ => {}
            }
        }
    }
}

impl FormatAdapter for ChatAdapter {
    fn tool_calls(&self, body: &Value) -> Vec<ObservedCall> {
        let mut calls = Vec::new();
        for entry in self.entries(body) {
            if role(entry) != Some("assistant") {
                continue;
            }
            if let Some(tool_calls) = entry.get("tool_calls").and_then(Value::as_array) {
                for call in tool_calls {
                    let Some(id) = call.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    let function = call.get("function");
                    calls.push(ObservedCall {
                        id: CallId::new(id),
                        tool_name: function
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                        arguments: parse_arguments(function.and_then(|f| f.get("arguments"))),
                    });
                }
            }
            for block in blocks(entry) {
                if block_type(block) != Some("tool_use") {
                    continue;
                }
                let Some(id) = block.get("id").and_then(Value::as_str) else {
                    continue;
                };
                calls.push(ObservedCall {
                    id: CallId::new(id),
                    tool_name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    arguments: parse_arguments(block.get("input")),
                });
            }
        }
        calls
    }

    fn tool_results(&self, body: &Value) -> Vec<ObservedResult> {
        // Visiting needs a mutable body; scan a copy of the entry list only.
        let mut scratch = json!({ "messages": self.entries(body) });
        let mut results = Vec::new();
        self.visit_results(&mut scratch, |r, _| results.push(r.clone()));
        results
    }

    fn push_user_text(&self, body: &mut Value, text: &str) -> bool {
        let Some(entries) = self.entries_mut(body) else {
            return false;
        };
        entries.push(json!({"role": "user", "content": text}));
        true
    }

    fn user_text_only(&self, entry: &Value) -> Option<String> {
        if role(entry) != Some("user") {
            return None;
        }
        match entry.get("content")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(blocks) if !blocks.is_empty() => blocks
                .iter()
                .map(|b| {
                    (block_type(b) == Some("text"))
                        .then(|| b.get("text").and_then(Value::as_str))
                        .flatten()
                })
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
                .filter(|b| block_type(b) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }

    fn is_genuine_user_turn(&self, entry: &Value) -> bool {
        role(entry) == Some("user")
            && !blocks(entry)
                .iter()
                .any(|b| block_type(b) == Some("tool_result"))
    }

    fn append_text_to_entry(&self, entry: &mut Value, text: &str) {
        match entry.get_mut("content") {
            Some(Value::String(s)) => {
                s.push_str("\n\n");
                s.push_str(text);
            }
            Some(Value::Array(blocks)) => blocks.push(json!({"type": "text", "text": text})),
            _ => entry["content"] = Value::String(text.to_owned()),
        }
    }

    fn replace_pruned(
        &self,
        body: &mut Value,
        predicate: &dyn Fn(&ObservedResult) -> bool,
        placeholder: &str,
    ) -> usize {
        let mut replaced = 0;
        self.visit_results(body, |result, slot| {
            if !predicate(result) {
                return;
            }
            let content = &mut slot["content"];
            if !is_placeholder(content, placeholder) {
                *content = Value::String(placeholder.to_owned());
                replaced += 1;
            }
        });
        replaced
    }

    fn entries<'a>(&self, body: &'a Value) -> &'a [Value] {
        body.get("messages")
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    fn entries_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Vec<Value>> {
        body.get_mut("messages").and_then(Value::as_array_mut)
    }
}
