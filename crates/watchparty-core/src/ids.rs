//! Branded ID newtypes for type safety.
//!
//! Connection IDs and party IDs are both strings on the wire, but they are
//! never interchangeable. Each gets its own newtype so a party ID cannot be
//! passed where a connection ID is expected.
//!
//! - [`ConnectionId`] is a UUID v7 with a `conn_` prefix, assigned on connect.
//! - [`PartyId`] is 64 bits of randomness rendered as lowercase hex, so that
//!   party tokens cannot be guessed from each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
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

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Identifies one live WebSocket connection (and its session).
    ConnectionId
);

branded_id!(
    /// Unguessable party token.
    PartyId
);

impl ConnectionId {
    /// Create a new connection ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartyId {
    /// Generate a fresh random party token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }

    #[test]
    fn party_id_is_sixteen_hex_chars() {
        let id = PartyId::generate();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn party_ids_differ() {
        let ids: std::collections::HashSet<_> = (0..256).map(|_| PartyId::generate()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn serde_is_transparent() {
        let id = PartyId::from("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: PartyId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_deref() {
        let id = ConnectionId::from("conn_x");
        assert_eq!(id.to_string(), "conn_x");
        assert_eq!(&*id, "conn_x");
        assert_eq!(id.clone().into_inner(), "conn_x");
    }
}
