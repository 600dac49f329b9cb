//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a config file only needs the keys it overrides.

use dcp_core::ModelRef;
use dcp_core::constants::DEFAULT_PROTECTED_TOOLS;
use serde::{Deserialize, Serialize};

/// One way of choosing obsolete tool results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Older calls with identical tool + parameters are obsolete.
    Deduplication,
    /// Ask an external model which results are obsolete.
    AiAnalysis,
}

/// How much detail the post-prune notification carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// No notification.
    Off,
    /// Counts and token savings only.
    Minimal,
    /// Counts plus parameter samples grouped by tool.
    #[default]
    Detailed,
}

/// Root settings for the pruning engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PruneSettings {
    /// Master switch.
    pub enabled: bool,
    /// Verbose logging.
    pub debug: bool,
    /// Explicit analysis model as `provider/model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// When the explicit model fails, fail the pass instead of falling back.
    pub strict_model_selection: bool,
    /// Tool names that are never pruned, in addition to the built-in list.
    pub protected_tools: Vec<String>,
    /// Transcripts shorter than this are not analyzed.
    pub min_messages: usize,
    /// Nudge injection settings.
    pub nudge: NudgeSettings,
    /// Strategies run per trigger.
    pub strategies: StrategySettings,
    /// Post-prune notification detail.
    pub pruning_summary: SummaryMode,
    /// Capacity of the tool-parameter cache.
    pub tool_cache_capacity: usize,
    /// Inject the pruning instruction into the latest user turn.
    pub inject_instruction: bool,
    /// Directory for persisted session state. Empty means the default.
    pub state_dir: String,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            model: None,
            strict_model_selection: false,
            protected_tools: Vec::new(),
            min_messages: 3,
            nudge: NudgeSettings::default(),
            strategies: StrategySettings::default(),
            pruning_summary: SummaryMode::default(),
            tool_cache_capacity: 500,
            inject_instruction: true,
            state_dir: String::new(),
        }
    }
}

impl PruneSettings {
    /// Parsed explicit model, if configured and well-formed.
    #[must_use]
    pub fn model_ref(&self) -> Option<ModelRef> {
        self.model.as_deref().and_then(ModelRef::parse)
    }

    /// Whether a tool name is protected (case-insensitive). Configured
    /// names extend the built-in list; they never replace it.
    #[must_use]
    pub fn is_protected(&self, tool: &str) -> bool {
        DEFAULT_PROTECTED_TOOLS
            .iter()
            .copied()
            .chain(self.protected_tools.iter().map(String::as_str))
            .any(|p| p.eq_ignore_ascii_case(tool))
    }
}

/// Nudge injection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NudgeSettings {
    /// Whether nudges are appended at all.
    pub enabled: bool,
    /// Tool results since the last prune before every request gets a nudge.
    pub frequency: usize,
}

impl Default for NudgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: 10,
        }
    }
}

/// Strategies per trigger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategySettings {
    /// Run when the session goes idle.
    pub on_idle: Vec<Strategy>,
    /// Run when the agent invokes the prune tool.
    pub on_tool: Vec<Strategy>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            on_idle: vec![Strategy::Deduplication, Strategy::AiAnalysis],
            on_tool: vec![Strategy::Deduplication, Strategy::AiAnalysis],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_produces_defaults() {
        let settings: PruneSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.nudge.frequency, 10);
        assert_eq!(settings.tool_cache_capacity, 500);
        assert_eq!(settings.pruning_summary, SummaryMode::Detailed);
        assert!(settings.is_protected("todowrite"));
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(PruneSettings::default()).unwrap();
        assert!(json.get("protectedTools").is_some());
        assert!(json.get("strictModelSelection").is_some());
        assert_eq!(json["strategies"]["onIdle"][1], "ai-analysis");
        assert!(json.get("model").is_none());
    }

    #[test]
    fn protected_check_ignores_case() {
        let settings = PruneSettings {
            protected_tools: vec!["Task".into()],
            ..Default::default()
        };
        assert!(settings.is_protected("task"));
        assert!(!settings.is_protected("read"));
    }

    #[test]
    fn configured_tools_extend_builtins() {
        let settings = PruneSettings {
            protected_tools: vec!["webfetch".into()],
            ..Default::default()
        };
        assert!(settings.is_protected("WebFetch"));
        assert!(settings.is_protected("todowrite"));
        assert!(!settings.is_protected("batch"));
    }

    #[test]
    fn model_ref_parses_configured_model() {
        let settings = PruneSettings {
            model: Some("anthropic/claude-haiku-4-5".into()),
            ..Default::default()
        };
        let model = settings.model_ref().unwrap();
        assert_eq!(model.provider_id, "anthropic");
        assert_eq!(model.model_id, "claude-haiku-4-5");

        let bad = PruneSettings {
            model: Some("haiku".into()),
            ..Default::default()
        };
        assert!(bad.model_ref().is_none());
    }
}
