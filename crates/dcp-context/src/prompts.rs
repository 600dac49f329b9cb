//! Text injected into outbound requests.

/// Appended to the latest user turn so the agent knows pruning exists.
pub const PRUNING_INSTRUCTION: &str = "<context-pruning>Tool outputs that are no longer needed may \
be replaced with a placeholder. Call the `prune` tool once a task step is finished to drop \
outputs you will not need again, or `squash` to collapse a finished stretch of the conversation \
into a summary.</context-pruning>";

/// Appended as its own user entry once enough tool results have piled up.
pub const NUDGE_TEXT: &str = "<context-pruning-reminder>Many tool results have accumulated since \
the last prune. Consider calling the `prune` tool.</context-pruning-reminder>";
