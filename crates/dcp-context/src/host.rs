//! Host session interface.

use async_trait::async_trait;
use dcp_core::{Result, SessionInfo, SessionMessage};

/// Read access to the host's sessions and transcripts.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Session metadata (parent reference, current model).
    async fn session_info(&self, session_id: &str) -> Result<SessionInfo>;

    /// The canonical transcript, oldest first.
    async fn messages(&self, session_id: &str) -> Result<Vec<SessionMessage>>;
}
