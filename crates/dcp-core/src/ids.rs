//! Branded ID newtypes.
//!
//! Tool-call ids arrive from three providers with inconsistent casing
//! (`call_ABC`, `toolu_01abc`, `prt_...`). [`CallId`] normalizes on
//! construction so every comparison in the crate is case-insensitive and a
//! twice-normalized id equals a once-normalized one.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Normalize a raw tool-call id: trim surrounding whitespace and lowercase.
///
/// Idempotent: `normalize_call_id(&normalize_call_id(x)) == normalize_call_id(x)`.
#[must_use]
pub fn normalize_call_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $normalize:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from a raw string value.
            #[must_use]
            pub fn new(raw: &str) -> Self {
                let normalize: fn(&str) -> String = $normalize;
                Self(normalize(raw))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::new(&raw))
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(&s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Tool-call id, normalized to lowercase. Correlates a call with its result.
    CallId, normalize_call_id
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn call_id_lowercases_and_trims() {
        let id = CallId::new("  Call_ABC123 ");
        assert_eq!(id.as_str(), "call_abc123");
    }

    #[test]
    fn call_ids_differing_by_case_are_equal() {
        assert_eq!(CallId::new("toolu_01ABC"), CallId::new("TOOLU_01abc"));
    }

    #[test]
    fn call_id_hash_lookup_by_str() {
        let mut set = HashSet::new();
        let _ = set.insert(CallId::new("Call_X"));
        assert!(set.contains("call_x"));
    }

    #[test]
    fn call_id_deserialize_normalizes() {
        let id: CallId = serde_json::from_str("\"Prt_ABC\"").unwrap();
        assert_eq!(id.as_str(), "prt_abc");
    }

    #[test]
    fn call_id_serializes_transparently() {
        let json = serde_json::to_string(&CallId::new("call_1")).unwrap();
        assert_eq!(json, "\"call_1\"");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[ a-zA-Z0-9_\\-ÀÉÖäß]{0,40}") {
            let once = normalize_call_id(&raw);
            prop_assert_eq!(normalize_call_id(&once), once);
        }

        #[test]
        fn normalization_ignores_ascii_case(raw in "[a-zA-Z0-9_]{1,30}") {
            prop_assert_eq!(
                normalize_call_id(&raw.to_uppercase()),
                normalize_call_id(&raw.to_lowercase())
            );
        }
    }
}
