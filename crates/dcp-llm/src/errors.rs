//! Decision call errors.

use dcp_core::PruneError;

/// Errors from the structured decision call.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// The response did not contain a usable structured result.
    #[error("malformed decision: {reason}")]
    Malformed {
        /// What was wrong with the output.
        reason: String,
    },
}

impl DecisionError {
    /// Build a malformed-output error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Error category string for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Api { .. } => "api",
            Self::Malformed { .. } => "parse",
        }
    }
}

impl From<DecisionError> for PruneError {
    fn from(err: DecisionError) -> Self {
        PruneError::Decision(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn converts_into_prune_error() {
        let err: PruneError = DecisionError::malformed("missing field").into();
        assert_matches!(err, PruneError::Decision(ref m) if m.contains("missing field"));
    }

    #[test]
    fn api_error_display() {
        let err = DecisionError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "API error (429): slow down");
        assert_eq!(err.category(), "api");
    }
}
