//! Shared constants for pruning.

/// Content substituted for a pruned tool result in outbound requests.
pub const PRUNED_PLACEHOLDER: &str =
    "[Output removed to save context - information superseded or no longer needed]";

/// Name of the agent-invoked pruning tool.
pub const PRUNE_TOOL_NAME: &str = "prune";

/// Name of the agent-invoked range squash tool.
pub const SQUASH_TOOL_NAME: &str = "squash";

/// Name of the agent-invoked range discard tool.
pub const DISCARD_TOOL_NAME: &str = "discard";

/// Tools whose results never count toward the nudge and never clear the
/// idle-skip flag.
pub const INTERNAL_TOOLS: &[&str] = &[PRUNE_TOOL_NAME, SQUASH_TOOL_NAME, DISCARD_TOOL_NAME];

/// Tool that groups subsequent calls into a batch.
pub const BATCH_TOOL_NAME: &str = "batch";

/// Call-id prefix carried by children of a batch call (normalized form).
pub const BATCH_CHILD_PREFIX: &str = "prt_";

/// Approximate characters per token for savings estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Tools protected from pruning by default.
pub const DEFAULT_PROTECTED_TOOLS: &[&str] = &[
    "task",
    "todowrite",
    "todoread",
    PRUNE_TOOL_NAME,
    SQUASH_TOOL_NAME,
    DISCARD_TOOL_NAME,
];

/// Whether a tool name belongs to the pruning machinery itself.
#[must_use]
pub fn is_internal_tool(name: &str) -> bool {
    INTERNAL_TOOLS.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// Estimate tokens for a piece of text.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count().div_ceil(CHARS_PER_TOKEN)) as u64
}
