//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PruneSettings::default()`]
//! 2. Deep-merge the global file (`~/.config/dcp/dcp.json`) if present
//! 3. Deep-merge the project file (`<project>/.dcp/dcp.json`) if present
//! 4. Apply `DCP_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::PruneSettings;

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Path of the global settings file (`$XDG_CONFIG_HOME/dcp/dcp.json`, else
/// `~/.config/dcp/dcp.json`).
pub fn global_settings_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| home_dir().join(".config"), PathBuf::from);
    base.join("dcp").join("dcp.json")
}

/// Path of the project settings file inside `project_dir`.
pub fn project_settings_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".dcp").join("dcp.json")
}

/// Directory for persisted session state when `stateDir` is unset.
pub fn default_state_dir() -> PathBuf {
    home_dir()
        .join(".local")
        .join("share")
        .join("dcp")
        .join("sessions")
}

/// Resolve the state directory from settings, expanding a leading `~/`.
pub fn resolve_state_dir(settings: &PruneSettings) -> PathBuf {
    if settings.state_dir.is_empty() {
        return default_state_dir();
    }
    match settings.state_dir.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(&settings.state_dir),
    }
}

/// Load settings from the global file and, when given, the project file.
pub fn load_settings(project_dir: Option<&Path>) -> Result<PruneSettings> {
    let mut paths = vec![global_settings_path()];
    if let Some(dir) = project_dir {
        paths.push(project_settings_path(dir));
    }
    load_settings_from_paths(&paths)
}

/// Load settings by deep-merging each existing file in order, then applying
/// env overrides and validating.
///
/// Missing files are skipped. Invalid JSON is an error.
pub fn load_settings_from_paths(paths: &[PathBuf]) -> Result<PruneSettings> {
    let mut merged = serde_json::to_value(PruneSettings::default())?;

    for path in paths {
        if !path.exists() {
            debug!(?path, "settings file not found, skipping");
            continue;
        }
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let layer: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        merged = deep_merge(merged, layer);
    }

    let mut settings: PruneSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values the engine cannot run with.
pub fn validate(settings: &PruneSettings) -> Result<()> {
    if settings.tool_cache_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "toolCacheCapacity must be at least 1".into(),
        ));
    }
    if settings.nudge.enabled && settings.nudge.frequency == 0 {
        return Err(SettingsError::InvalidValue(
            "nudge.frequency must be at least 1 when nudges are enabled".into(),
        ));
    }
    if let Some(model) = &settings.model {
        if settings.model_ref().is_none() {
            return Err(SettingsError::InvalidValue(format!(
                "model must be written provider/model, got {model:?}"
            )));
        }
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_env_overrides(settings: &mut PruneSettings) {
    if let Some(v) = read_env_bool("DCP_ENABLED") {
        settings.enabled = v;
    }
    if let Some(v) = read_env_bool("DCP_DEBUG") {
        settings.debug = v;
    }
    if let Some(v) = read_env_string("DCP_MODEL") {
        settings.model = Some(v);
    }
    if let Some(v) = read_env_usize("DCP_NUDGE_FREQUENCY", 1, 10_000) {
        settings.nudge.frequency = v;
    }
    if let Some(v) = read_env_usize("DCP_MIN_MESSAGES", 0, 10_000) {
        settings.min_messages = v;
    }
    if let Some(v) = read_env_string("DCP_STATE_DIR") {
        settings.state_dir = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Strategy, SummaryMode};

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"nudge": {"enabled": true, "frequency": 10}});
        let source = serde_json::json!({"nudge": {"frequency": 4}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["nudge"]["frequency"], 4);
        assert_eq!(merged["nudge"]["enabled"], true);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"protectedTools": ["task", "todowrite"]});
        let source = serde_json::json!({"protectedTools": ["bash"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["protectedTools"], serde_json::json!(["bash"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_paths ────────────────────────────────────

    #[test]
    fn load_missing_files_returns_defaults() {
        let settings =
            load_settings_from_paths(&[PathBuf::from("/nonexistent/dcp.json")]).unwrap();
        assert_eq!(settings.nudge.frequency, PruneSettings::default().nudge.frequency);
        assert!(settings.enabled);
    }

    #[test]
    fn project_file_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let project = dir.path().join("project.json");
        std::fs::write(
            &global,
            r#"{"model": "openai/gpt-5-mini", "nudge": {"frequency": 20}, "pruningSummary": "minimal"}"#,
        )
        .unwrap();
        std::fs::write(
            &project,
            r#"{"nudge": {"frequency": 5}, "strategies": {"onIdle": ["deduplication"]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_paths(&[global, project]).unwrap();
        assert_eq!(settings.model.as_deref(), Some("openai/gpt-5-mini"));
        assert_eq!(settings.nudge.frequency, 5);
        assert!(settings.nudge.enabled);
        assert_eq!(settings.pruning_summary, SummaryMode::Minimal);
        assert_eq!(settings.strategies.on_idle, vec![Strategy::Deduplication]);
        assert_eq!(settings.strategies.on_tool.len(), 2);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcp.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_paths(&[path]);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Parse { path: p, .. } if p.ends_with("dcp.json")
        ));
    }

    #[test]
    fn load_rejects_zero_cache_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcp.json");
        std::fs::write(&path, r#"{"toolCacheCapacity": 0}"#).unwrap();

        let result = load_settings_from_paths(&[path]);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_malformed_model() {
        let settings = PruneSettings {
            model: Some("gpt-5-mini".into()),
            ..Default::default()
        };
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_allows_zero_frequency_when_nudges_disabled() {
        let mut settings = PruneSettings::default();
        settings.nudge.enabled = false;
        settings.nudge.frequency = 0;
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn state_dir_expands_home() {
        let settings = PruneSettings {
            state_dir: "~/dcp-state".into(),
            ..Default::default()
        };
        let dir = resolve_state_dir(&settings);
        assert!(dir.ends_with("dcp-state"));
        assert!(!dir.to_string_lossy().contains('~'));

        let absolute = PruneSettings {
            state_dir: "/var/lib/dcp".into(),
            ..Default::default()
        };
        assert_eq!(resolve_state_dir(&absolute), PathBuf::from("/var/lib/dcp"));
    }

    #[test]
    fn project_path_layout() {
        let path = project_settings_path(Path::new("/work/repo"));
        assert_eq!(path, PathBuf::from("/work/repo/.dcp/dcp.json"));
        assert!(global_settings_path().ends_with("dcp/dcp.json"));
    }

    // ── parsing helpers ─────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_usize_range_bounds() {
        assert_eq!(parse_usize_range("5", 1, 10), Some(5));
        assert_eq!(parse_usize_range("0", 1, 10), None);
        assert_eq!(parse_usize_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("x", 1, 10), None);
    }
}
