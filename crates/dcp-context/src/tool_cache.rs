//! Bounded cache of tool-call parameters seen in outbound requests.
//!
//! The transcript does not always carry call arguments, but request bodies
//! do. Entries are keyed by normalized call id and evicted oldest-first.

use std::collections::{HashMap, VecDeque};

use dcp_core::CallId;
use parking_lot::Mutex;
use serde_json::Value;

/// A cached tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedCall {
    /// Tool name.
    pub tool_name: String,
    /// Call arguments.
    pub parameters: Value,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CallId, CachedCall>,
    order: VecDeque<CallId>,
}

/// Shared by the rewriter (writes) and the janitor (reads).
#[derive(Debug)]
pub struct ToolParameterCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ToolParameterCache {
    /// Create a cache holding at most `capacity` calls (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Insert or update a call. Updating keeps the original age.
    pub fn insert(&self, id: CallId, tool_name: &str, parameters: Value) {
        let mut inner = self.inner.lock();
        let entry = CachedCall {
            tool_name: tool_name.to_owned(),
            parameters,
        };
        if let Some(existing) = inner.entries.get_mut(&id) {
            *existing = entry;
            return;
        }
        inner.order.push_back(id.clone());
        let _ = inner.entries.insert(id, entry);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                let _ = inner.entries.remove(&oldest);
            }
        }
    }

    /// Cached call by id.
    pub fn get(&self, id: &CallId) -> Option<CachedCall> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// Cached tool name by id.
    pub fn tool_name(&self, id: &CallId) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(id)
            .map(|c| c.tool_name.clone())
    }

    /// Number of cached calls.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached calls.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
