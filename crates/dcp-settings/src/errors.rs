//! Settings errors.
//!
//! File errors carry the path so a broken global or project file can be
//! told apart in logs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A settings file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A settings file is not valid JSON.
    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The merged layers do not deserialize into settings.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),

    /// A value the engine cannot run with.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
