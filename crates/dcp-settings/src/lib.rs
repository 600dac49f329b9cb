//! # dcp-settings
//!
//! Configuration for the pruning engine, loaded from layered sources
//! (in priority order, lowest first):
//! 1. **Compiled defaults**: [`PruneSettings::default()`]
//! 2. **Global file**: `~/.config/dcp/dcp.json`
//! 3. **Project file**: `<project>/.dcp/dcp.json`
//! 4. **Environment variables**: `DCP_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, default_state_dir, global_settings_path, load_settings, load_settings_from_paths,
    project_settings_path, resolve_state_dir,
};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<PruneSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads the global file (no project layer) with env
/// overrides. If loading fails, logs the error and returns compiled defaults.
pub fn get_settings() -> &'static PruneSettings {
    SETTINGS.get_or_init(|| {
        load_settings(None).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            PruneSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: PruneSettings) -> std::result::Result<(), PruneSettings> {
    SETTINGS.set(settings)
}
