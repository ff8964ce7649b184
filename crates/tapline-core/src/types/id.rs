//! Newtype wrappers around backend-issued string identifiers.
//!
//! The backend hands out opaque string ids. Distinct types prevent passing a
//! `MessageId` where a `ConversationId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of ids assigned locally before the backend confirms a message.
const PROVISIONAL_PREFIX: &str = "tmp-";

/// Macro to define a newtype ID wrapper around `String`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a bidding/negotiation conversation.
    ConversationId
);

define_id!(
    /// Identifier of a single chat message.
    MessageId
);

define_id!(
    /// Identifier of a broker or farmer account.
    UserId
);

impl MessageId {
    /// A client-side id for a message the backend has not confirmed yet.
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this id was assigned locally.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_serde() {
        let id = ConversationId::new("lot-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"lot-42\"");
        let back: ConversationId = serde_json::from_str("\"lot-42\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_provisional_ids() {
        let a = MessageId::provisional();
        let b = MessageId::provisional();
        assert!(a.is_provisional());
        assert_ne!(a, b);
        assert!(!MessageId::new("665f1c").is_provisional());
    }
}
