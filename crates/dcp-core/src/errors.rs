//! Error hierarchy for context pruning.
//!
//! Idle-triggered analysis logs and swallows every [`PruneError`]; tool-invoked
//! operations (prune, squash, discard) surface it to the agent, so each
//! variant's message is written to be actionable.

use thiserror::Error;

/// Which end of a squash/discard range a lookup refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeBoundary {
    /// The start substring.
    Start,
    /// The end substring.
    End,
}

impl std::fmt::Display for RangeBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::End => "end",
        })
    }
}

/// Errors produced by the pruning engine.
#[derive(Debug, Error)]
pub enum PruneError {
    /// The host could not return session info or messages.
    #[error("failed to fetch transcript for session {session_id}: {message}")]
    TranscriptFetch {
        /// Session whose transcript was requested.
        session_id: String,
        /// Error description.
        message: String,
    },

    /// The LLM decision call failed or returned a malformed result.
    #[error("prune decision failed: {0}")]
    Decision(String),

    /// Persisting session state failed. In-memory state is already updated.
    #[error("failed to persist prune state for session {session_id}: {message}")]
    Persistence {
        /// Session whose state could not be written.
        session_id: String,
        /// Error description.
        message: String,
    },

    /// A squash/discard substring matched zero or several locations.
    #[error(
        "{boundary} text matched {matches} locations (expected exactly 1); \
         quote a longer, unique snippet: {needle:?}"
    )]
    RangeNotFound {
        /// Which end of the range failed.
        boundary: RangeBoundary,
        /// The substring that was searched for.
        needle: String,
        /// Number of matches found.
        matches: usize,
    },

    /// The start substring occurs after the end substring.
    #[error("start text occurs after end text (message {start_index} > {end_index})")]
    InvalidRange {
        /// Message index of the start match.
        start_index: usize,
        /// Message index of the end match.
        end_index: usize,
    },

    /// Range tools were invoked from a subagent session, which is never pruned.
    #[error("session {session_id} is a subagent session; its context is managed by the parent")]
    SubagentSession {
        /// The subagent session.
        session_id: String,
    },

    /// No configured, session, or fallback model could be used.
    #[error("no usable model for pruning analysis: {0}")]
    ModelUnavailable(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error outside of state persistence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PruneError {
    /// Short machine-readable kind, used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TranscriptFetch { .. } => "transcript_fetch",
            Self::Decision(_) => "decision",
            Self::Persistence { .. } => "persistence",
            Self::RangeNotFound { .. } => "range_not_found",
            Self::InvalidRange { .. } => "invalid_range",
            Self::SubagentSession { .. } => "subagent_session",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }

    /// Build a transcript fetch error.
    #[must_use]
    pub fn transcript(session_id: &str, message: impl Into<String>) -> Self {
        Self::TranscriptFetch {
            session_id: session_id.to_owned(),
            message: message.into(),
        }
    }

    /// Build a persistence error.
    #[must_use]
    pub fn persistence(session_id: &str, message: impl Into<String>) -> Self {
        Self::Persistence {
            session_id: session_id.to_owned(),
            message: message.into(),
        }
    }
}

/// Result type for pruning operations.
pub type Result<T> = std::result::Result<T, PruneError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
