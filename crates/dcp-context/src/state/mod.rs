//! Per-session prune state store.
//!
//! The store never merges. Writers take [`PruneStateStore::lock`], re-read
//! with [`PruneStateStore::get_state`], union their own ids into the fresh
//! copy and write it back with [`PruneStateStore::set_state`]. Holding the
//! lock across that read-merge-write keeps concurrent writers from
//! dropping each other's ids.
//!
//! Reads made by the request rewriter ([`PruneStateStore::cached_ids`],
//! [`PruneStateStore::union_ids`]) are synchronous and never restore from
//! disk; the async interceptor restores first.

mod persister;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dcp_core::{CallId, Result, SessionPruneState};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

pub use persister::{JsonFilePersister, MemoryPersister, StatePersister};

/// Session-keyed prune state with write-through persistence.
pub struct PruneStateStore {
    sessions: DashMap<String, SessionPruneState>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    kinds: DashMap<String, bool>,
    call_orders: DashMap<String, Vec<(CallId, String)>>,
    persister: Arc<dyn StatePersister>,
}

impl PruneStateStore {
    /// Create a store backed by `persister`.
    pub fn new(persister: Arc<dyn StatePersister>) -> Self {
        Self {
            sessions: DashMap::new(),
            locks: DashMap::new(),
            kinds: DashMap::new(),
            call_orders: DashMap::new(),
            persister,
        }
    }

    /// Restore a session on first touch. Load failures degrade to an empty
    /// state.
    async fn ensure_loaded(&self, session_id: &str) {
        if self.sessions.contains_key(session_id) {
            return;
        }
        let restored = match self.persister.load(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => SessionPruneState::empty(session_id),
            Err(e) => {
                warn!(session_id, error = %e, "failed to restore prune state, starting empty");
                SessionPruneState::empty(session_id)
            }
        };
        let _ = self
            .sessions
            .entry(session_id.to_owned())
            .or_insert(restored);
    }

    /// Pruned ids for a session, in the order they were pruned.
    pub async fn get(&self, session_id: &str) -> Vec<CallId> {
        self.ensure_loaded(session_id).await;
        self.cached_ids(session_id).unwrap_or_default()
    }

    /// Replace a session's pruned ids and persist.
    ///
    /// The in-memory copy is updated even when persisting fails.
    pub async fn set(&self, session_id: &str, ids: Vec<CallId>) -> Result<()> {
        let mut state = self.get_state(session_id).await;
        state.pruned_ids = ids;
        self.set_state(state).await
    }

    /// Full record for a session.
    pub async fn get_state(&self, session_id: &str) -> SessionPruneState {
        self.ensure_loaded(session_id).await;
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .unwrap_or_else(|| SessionPruneState::empty(session_id))
    }

    /// Replace a session's full record and persist.
    pub async fn set_state(&self, mut state: SessionPruneState) -> Result<()> {
        state.updated_at = Utc::now();
        let session_id = state.session_id.clone();
        let _ = self.sessions.insert(session_id.clone(), state.clone());
        debug!(
            session_id,
            pruned = state.pruned_ids.len(),
            squashes = state.squashes.len(),
            "prune state updated"
        );
        if let Err(e) = self.persister.save(&state).await {
            warn!(session_id, error = %e, "failed to persist prune state");
            return Err(e);
        }
        Ok(())
    }

    /// In-memory pruned ids, without restoring.
    pub fn cached_ids(&self, session_id: &str) -> Option<Vec<CallId>> {
        self.sessions
            .get(session_id)
            .map(|s| s.pruned_ids.clone())
    }

    /// In-memory full record, without restoring.
    pub fn cached_state(&self, session_id: &str) -> Option<SessionPruneState> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Pruned ids across every loaded session not known to be a subagent.
    pub fn union_ids(&self) -> HashSet<CallId> {
        self.sessions
            .iter()
            .filter(|entry| self.is_subagent(entry.key()) != Some(true))
            .flat_map(|entry| entry.pruned_ids.clone())
            .collect()
    }

    /// Per-session write lock.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Remember whether a session is a subagent.
    pub fn note_session_kind(&self, session_id: &str, is_subagent: bool) {
        let _ = self.kinds.insert(session_id.to_owned(), is_subagent);
    }

    /// Whether a session is a subagent, if known.
    pub fn is_subagent(&self, session_id: &str) -> Option<bool> {
        self.kinds.get(session_id).map(|k| *k)
    }

    /// Remember a session's tool calls in transcript order.
    pub fn record_call_order(&self, session_id: &str, calls: Vec<(CallId, String)>) {
        let _ = self.call_orders.insert(session_id.to_owned(), calls);
    }

    /// The `ordinal`-th recorded call of `tool_name` in a session.
    pub fn nth_call(&self, session_id: &str, tool_name: &str, ordinal: usize) -> Option<CallId> {
        self.call_orders.get(session_id).and_then(|calls| {
            calls
                .iter()
                .filter(|(_, name)| name.eq_ignore_ascii_case(tool_name))
                .nth(ordinal)
                .map(|(id, _)| id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dcp_core::PruneError;

    fn ids(raw: &[&str]) -> Vec<CallId> {
        raw.iter().map(|s| CallId::new(s)).collect()
    }

    fn store() -> (PruneStateStore, Arc<MemoryPersister>) {
        let persister = Arc::new(MemoryPersister::new());
        (PruneStateStore::new(persister.clone()), persister)
    }

    #[tokio::test]
    async fn restores_on_first_touch() {
        let (store, persister) = store();
        let mut seeded = SessionPruneState::empty("s1");
        seeded.pruned_ids = ids(&["a"]);
        persister.seed(seeded);

        assert!(store.cached_ids("s1").is_none());
        assert_eq!(store.get("s1").await, ids(&["a"]));
        assert_eq!(store.cached_ids("s1"), Some(ids(&["a"])));
    }

    #[tokio::test]
    async fn set_replaces_and_persists() {
        let (store, persister) = store();
        store.set("s1", ids(&["a", "c"])).await.unwrap();
        store.set("s1", ids(&["b"])).await.unwrap();
        assert_eq!(store.get("s1").await, ids(&["b"]));
        assert_eq!(persister.saved("s1").unwrap().pruned_ids, ids(&["b"]));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_memory_update() {
        let (store, persister) = store();
        persister.set_fail_saves(true);
        let err = store.set("s1", ids(&["a"])).await.unwrap_err();
        assert_matches!(err, PruneError::Persistence { .. });
        assert_eq!(store.cached_ids("s1"), Some(ids(&["a"])));

        persister.set_fail_saves(false);
        store.set("s1", ids(&["a", "b"])).await.unwrap();
        assert_eq!(persister.saved("s1").unwrap().pruned_ids, ids(&["a", "b"]));
    }

    #[tokio::test]
    async fn union_skips_subagents() {
        let (store, _) = store();
        store.set("parent", ids(&["a"])).await.unwrap();
        store.set("child", ids(&["b"])).await.unwrap();
        store.note_session_kind("child", true);
        store.note_session_kind("parent", false);

        let union = store.union_ids();
        assert!(union.contains(&CallId::new("a")));
        assert!(!union.contains(&CallId::new("b")));
    }

    #[tokio::test]
    async fn lock_serializes_writers() {
        let (store, _) = store();
        let store = Arc::new(store);
        let guard = store.lock("s1").await;

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.lock("s1").await;
                let fresh = store.get_state("s1").await;
                let mut next = fresh.clone();
                next.pruned_ids = SessionPruneState::merge_ids(&fresh.pruned_ids, &ids(&["b"]));
                store.set_state(next).await.unwrap();
            })
        };

        tokio::task::yield_now().await;
        let fresh = store.get_state("s1").await;
        let mut next = fresh.clone();
        next.pruned_ids = SessionPruneState::merge_ids(&fresh.pruned_ids, &ids(&["a"]));
        store.set_state(next).await.unwrap();
        drop(guard);

        contender.await.unwrap();
        assert_eq!(store.get("s1").await, ids(&["a", "b"]));
    }

    #[test]
    fn nth_call_filters_by_name() {
        let (store, _) = store();
        store.record_call_order(
            "s1",
            vec![
                (CallId::new("r1"), "read".into()),
                (CallId::new("g1"), "grep".into()),
                (CallId::new("r2"), "read".into()),
            ],
        );
        assert_eq!(store.nth_call("s1", "read", 1), Some(CallId::new("r2")));
        assert_eq!(store.nth_call("s1", "grep", 1), None);
        assert_eq!(store.nth_call("other", "read", 0), None);
    }
}
