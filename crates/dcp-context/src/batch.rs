//! Batch call grouping.

use std::collections::{HashMap, HashSet};

use dcp_core::{CallId, ToolCallRecord};

/// Parent batch id → child ids in emission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchRelations {
    children: HashMap<CallId, Vec<CallId>>,
}

impl BatchRelations {
    /// Build from records whose `batch_parent_id` is set.
    #[must_use]
    pub fn from_records(records: &[ToolCallRecord]) -> Self {
        let mut relations = Self::default();
        for record in records {
            if let Some(parent) = &record.batch_parent_id {
                relations.add_child(parent.clone(), record.id.clone());
            }
        }
        relations
    }

    /// Record `child` under `parent`.
    pub fn add_child(&mut self, parent: CallId, child: CallId) {
        let children = self.children.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    /// Children of a batch call.
    #[must_use]
    pub fn children_of(&self, parent: &CallId) -> &[CallId] {
        self.children.get(parent).map_or(&[], Vec::as_slice)
    }

    /// Whether any batch was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// `ids` plus the children of every batch parent among them, in order
    /// and without duplicates.
    #[must_use]
    pub fn expand(&self, ids: &[CallId]) -> Vec<CallId> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.insert(id.clone()) {
                expanded.push(id.clone());
            }
            for child in self.children_of(id) {
                if seen.insert(child.clone()) {
                    expanded.push(child.clone());
                }
            }
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(raw: &[&str]) -> Vec<CallId> {
        raw.iter().map(|s| CallId::new(s)).collect()
    }

    fn relations() -> BatchRelations {
        let mut relations = BatchRelations::default();
        relations.add_child(CallId::new("batch_1"), CallId::new("prt_1"));
        relations.add_child(CallId::new("batch_1"), CallId::new("prt_2"));
        relations
    }

    #[test]
    fn parent_expands_to_children() {
        assert_eq!(
            relations().expand(&ids(&["batch_1"])),
            ids(&["batch_1", "prt_1", "prt_2"])
        );
    }

    #[test]
    fn non_parents_pass_through() {
        assert_eq!(relations().expand(&ids(&["x", "prt_1"])), ids(&["x", "prt_1"]));
    }

    #[test]
    fn mixed_case_parent_matches() {
        assert_eq!(relations().expand(&ids(&["BATCH_1"])).len(), 3);
    }

    proptest! {
        #[test]
        fn expansion_is_pure_and_closed(picks in proptest::collection::vec("batch_1|prt_1|prt_2|[a-d]", 0..8)) {
            let relations = relations();
            let input: Vec<CallId> = picks.iter().map(|s| CallId::new(s)).collect();
            let first = relations.expand(&input);
            let second = relations.expand(&input);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(relations.expand(&first), first.clone());
            if first.contains(&CallId::new("batch_1")) {
                prop_assert!(first.contains(&CallId::new("prt_1")));
                prop_assert!(first.contains(&CallId::new("prt_2")));
            }
        }
    }
}
