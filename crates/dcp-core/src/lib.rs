//! # dcp-core
//!
//! Shared vocabulary for dynamic context pruning.
//!
//! - **Call ids**: [`CallId`] newtype with case-insensitive normalization
//! - **Transcript**: [`SessionMessage`] / [`MessagePart`] as returned by the host
//! - **Prune state**: [`SessionPruneState`], [`PruneStats`], [`SquashRange`]
//! - **Records**: [`ToolCallRecord`] built once per analysis pass
//! - **Errors**: [`PruneError`] hierarchy via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod records;
pub mod state;
pub mod transcript;

pub use errors::{PruneError, RangeBoundary, Result};
pub use ids::{CallId, normalize_call_id};
pub use records::ToolCallRecord;
pub use state::{PruneStats, SessionPruneState, SquashRange};
pub use transcript::{
    MessagePart, MessageRole, ModelRef, SessionInfo, SessionMessage, ToolPart, ToolState,
    ToolStatus,
};
