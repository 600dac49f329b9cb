//! Deduplication strategy: when the same tool ran with identical
//! parameters more than once, every result but the latest is obsolete.

use std::collections::HashMap;

use dcp_core::{CallId, ToolCallRecord};
use serde_json::Value;

/// Ids of records superseded by a later identical call, in emission order.
///
/// Records without known parameters never match anything.
#[must_use]
pub fn find_duplicates(records: &[&ToolCallRecord]) -> Vec<CallId> {
    let mut latest: HashMap<(String, String), usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        if let Some(key) = signature(record) {
            let _ = latest.insert(key, index);
        }
    }

    records
        .iter()
        .enumerate()
        .filter(|(index, record)| {
            signature(record).is_some_and(|key| latest.get(&key) != Some(index))
        })
        .map(|(_, record)| record.id.clone())
        .collect()
}

fn signature(record: &ToolCallRecord) -> Option<(String, String)> {
    match &record.parameters {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        params => Some((record.tool_name.to_ascii_lowercase(), params.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcp_core::ToolStatus;
    use serde_json::json;

    fn record(id: &str, tool: &str, params: Value) -> ToolCallRecord {
        ToolCallRecord {
            id: CallId::new(id),
            tool_name: tool.into(),
            parameters: params,
            output_text: "out".into(),
            status: ToolStatus::Completed,
            batch_parent_id: None,
            message_index: 0,
        }
    }

    #[test]
    fn older_identical_calls_are_obsolete() {
        let records = [
            record("r1", "read", json!({"filePath": "a.rs"})),
            record("r2", "read", json!({"filePath": "b.rs"})),
            record("r3", "read", json!({"filePath": "a.rs"})),
            record("r4", "Read", json!({"filePath": "a.rs"})),
        ];
        let refs: Vec<&ToolCallRecord> = records.iter().collect();
        assert_eq!(find_duplicates(&refs), vec![CallId::new("r1"), CallId::new("r3")]);
    }

    #[test]
    fn different_tools_do_not_collide() {
        let records = [
            record("a", "read", json!({"path": "x"})),
            record("b", "list", json!({"path": "x"})),
        ];
        let refs: Vec<&ToolCallRecord> = records.iter().collect();
        assert!(find_duplicates(&refs).is_empty());
    }

    #[test]
    fn unknown_parameters_never_match() {
        let records = [
            record("a", "read", Value::Null),
            record("b", "read", Value::Null),
            record("c", "read", json!({})),
            record("d", "read", json!({})),
        ];
        let refs: Vec<&ToolCallRecord> = records.iter().collect();
        assert!(find_duplicates(&refs).is_empty());
    }
}
