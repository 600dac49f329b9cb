//! Durable storage for per-session prune state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dcp_core::{PruneError, Result, SessionPruneState};
use parking_lot::Mutex;
use tracing::debug;

/// Loads and saves one record per session.
#[async_trait]
pub trait StatePersister: Send + Sync {
    /// Load a session's record. `Ok(None)` when none exists yet.
    async fn load(&self, session_id: &str) -> Result<Option<SessionPruneState>>;

    /// Write a session's record, replacing any previous one.
    async fn save(&self, state: &SessionPruneState) -> Result<()>;
}

/// One pretty-printed JSON file per session under a directory.
#[derive(Clone, Debug)]
pub struct JsonFilePersister {
    dir: PathBuf,
}

impl JsonFilePersister {
    /// Persist under `dir` (created on first save).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a session's record.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StatePersister for JsonFilePersister {
    async fn load(&self, session_id: &str) -> Result<Option<SessionPruneState>> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PruneError::persistence(
                    session_id,
                    format!("failed to read {}: {e}", path.display()),
                ));
            }
        };
        let state = serde_json::from_str(&content).map_err(|e| {
            PruneError::persistence(session_id, format!("corrupt {}: {e}", path.display()))
        })?;
        debug!(session_id, path = %path.display(), "prune state restored");
        Ok(Some(state))
    }

    async fn save(&self, state: &SessionPruneState) -> Result<()> {
        let session_id = state.session_id.as_str();
        let path = self.path_for(session_id);
        let io_err = |what: &str, p: &Path, e: std::io::Error| {
            PruneError::persistence(session_id, format!("failed to {what} {}: {e}", p.display()))
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err("create", &self.dir, e))?;

        let content = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::now_v7()));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_err("write", &tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err("replace", &path, e));
        }
        Ok(())
    }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    records: Mutex<HashMap<String, SessionPruneState>>,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemoryPersister {
    /// Create an empty persister.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if it had been saved by an earlier process.
    pub fn seed(&self, state: SessionPruneState) {
        let _ = self.records.lock().insert(state.session_id.clone(), state);
    }

    /// Last saved record for a session.
    pub fn saved(&self, session_id: &str) -> Option<SessionPruneState> {
        self.records.lock().get(session_id).cloned()
    }

    /// Make subsequent saves fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl StatePersister for MemoryPersister {
    async fn load(&self, session_id: &str) -> Result<Option<SessionPruneState>> {
        Ok(self.records.lock().get(session_id).cloned())
    }

    async fn save(&self, state: &SessionPruneState) -> Result<()> {
        if self.fail_saves.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(PruneError::persistence(&state.session_id, "save disabled"));
        }
        let _ = self
            .records
            .lock()
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dcp_core::CallId;

    #[tokio::test]
    async fn json_round_trip_through_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFilePersister::new(dir.path().join("sessions"));

        assert!(persister.load("ses_1").await.unwrap().is_none());

        let mut state = SessionPruneState::empty("ses_1");
        state.pruned_ids = vec![CallId::new("A"), CallId::new("b")];
        state.stats.total_tools_pruned = 2;
        persister.save(&state).await.unwrap();

        let loaded = persister.load("ses_1").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        let leftovers: Vec<_> = std::fs::read_dir(persister.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFilePersister::new(dir.path());
        std::fs::write(persister.path_for("ses_x"), "{not json").unwrap();
        assert_matches!(
            persister.load("ses_x").await,
            Err(PruneError::Persistence { ref session_id, .. }) if session_id == "ses_x"
        );
    }

    #[test]
    fn session_ids_are_sanitized_into_file_names() {
        let persister = JsonFilePersister::new("/tmp/dcp");
        assert_eq!(
            persister.path_for("../ses/1"),
            PathBuf::from("/tmp/dcp/___ses_1.json")
        );
    }

    #[tokio::test]
    async fn memory_persister_can_fail_saves() {
        let persister = MemoryPersister::new();
        persister.set_fail_saves(true);
        let err = persister.save(&SessionPruneState::empty("s")).await.unwrap_err();
        assert_matches!(err, PruneError::Persistence { .. });
        assert!(persister.saved("s").is_none());
    }
}
