//! NewType wrappers for strong typing throughout the API.
//!
//! These keep semantically different strings apart (e.g. passing a username
//! where the stable external user id is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Stable external user identifier (a UUID assigned at registration).
    ///
    /// This is what tokens carry in their `userId` claim and what student
    /// links and activity records are keyed by. It is distinct from the
    /// database record id, which never leaves the storage layer except in
    /// admin routes.
    UserId
);

newtype_string!(
    /// Unique login name; also the `sub` claim of issued tokens.
    Username
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_roundtrip() {
        let id = UserId::new("8f0c");
        assert_eq!(id.as_str(), "8f0c");
        assert_eq!(id.to_string(), "8f0c");
        assert_eq!(id.clone().into_inner(), "8f0c".to_string());
    }

    #[test]
    fn test_newtype_serializes_transparently() {
        let name = Username::from("alice");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"alice\"");

        let back: Username = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(back, name);
    }
}
