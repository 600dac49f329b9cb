//! # dcp-context
//!
//! Request-time pruning of obsolete tool outputs.
//!
//! - **Format adapters**: chat completions, Gemini and Responses request bodies
//! - **Janitor**: idle and tool-triggered analysis, dedup and model strategies
//! - **State store**: per-session prune sets with JSON file persistence
//! - **Rewriter / transport**: placeholder substitution on every outbound body
//! - **Squash / discard**: agent-addressed message ranges
//! - **Engine**: one wired instance per host process

#![deny(unsafe_code)]

pub mod batch;
pub mod dedup;
pub mod engine;
pub mod format;
pub mod host;
pub mod janitor;
pub mod notification;
pub mod prompts;
pub mod rewriter;
pub mod squash;
pub mod state;
pub mod tool_cache;
pub mod tracker;
pub mod transport;

pub use batch::BatchRelations;
pub use engine::{EngineDeps, PruneEngine};
pub use format::{FormatAdapter, WireFormat};
pub use host::SessionHost;
pub use janitor::{AnalysisTrigger, Janitor, JanitorDeps, PruneOutcome};
pub use notification::{Notifier, PruneSource, PruneSummary, TracingNotifier};
pub use rewriter::{RequestRewriter, RewriteReport, RewriteScope};
pub use squash::{RangeHandler, RangeOutcome, locate_range, render_squashed};
pub use state::{JsonFilePersister, MemoryPersister, PruneStateStore, StatePersister};
pub use tool_cache::ToolParameterCache;
pub use tracker::ToolResultTracker;
pub use transport::{InterceptingTransport, PruningInterceptor, RequestInterceptor};
