//! # dcp-llm
//!
//! The model-facing side of pruning analysis:
//! - [`ModelSelector`]: explicit config → session model → fallback list,
//!   filtered to authenticated providers
//! - [`PruneDecider`]: the structured decision call
//!   (`{pruned_tool_call_ids, reasoning}`)
//! - [`HttpDecider`]: `OpenAI`-compatible chat-completions implementation
//! - [`parse_decision`]: tolerant parser for the structured output

#![deny(unsafe_code)]

pub mod decision;
pub mod errors;
pub mod http_decider;
pub mod model_selector;
pub mod prompt;

pub use decision::{DecisionRequest, PruneDecider, PruneDecision, parse_decision};
pub use errors::DecisionError;
pub use http_decider::HttpDecider;
pub use model_selector::{ModelCatalog, ModelHandle, ModelSelector, SelectionSource};
