//! Error types for registry operations and wire decoding.
//!
//! Registry operations never surface failures to clients. When a request
//! cannot be applied (stale client, non-master sender, unknown party) the
//! operation returns a [`Rejected`] reason instead of mutating state. The
//! dispatcher logs the reason and drops the request.

use thiserror::Error;

use crate::ids::{ConnectionId, PartyId};

/// Why a registry operation was a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    /// The connection has no registered session.
    #[error("unknown session: {0}")]
    UnknownSession(ConnectionId),

    /// Create or join while already a member of a party.
    #[error("session already belongs to party {0}")]
    AlreadyInParty(PartyId),

    /// Join of a party that does not exist.
    #[error("unknown party: {0}")]
    UnknownParty(PartyId),

    /// Leave, promote, action, or sync without a party.
    #[error("session is not in a party")]
    NotInParty,

    /// Master-only request from a non-master member.
    #[error("session is not the master of party {0}")]
    NotMaster(PartyId),

    /// Promotion target is not a current member (or is already master).
    #[error("{0} is not a promotable member")]
    NotAMember(ConnectionId),
}

impl Rejected {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::AlreadyInParty(_) => "already_in_party",
            Self::UnknownParty(_) => "unknown_party",
            Self::NotInParty => "not_in_party",
            Self::NotMaster(_) => "not_master",
            Self::NotAMember(_) => "not_a_member",
        }
    }
}

/// Failure to decode an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a valid envelope or carried an unknown event.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display() {
        let err = Rejected::UnknownParty(PartyId::from("deadbeef"));
        assert_eq!(err.to_string(), "unknown party: deadbeef");
        assert_eq!(Rejected::NotInParty.to_string(), "session is not in a party");
    }

    #[test]
    fn labels_are_snake_case() {
        let all = [
            Rejected::UnknownSession(ConnectionId::from("c")),
            Rejected::AlreadyInParty(PartyId::from("p")),
            Rejected::UnknownParty(PartyId::from("p")),
            Rejected::NotInParty,
            Rejected::NotMaster(PartyId::from("p")),
            Rejected::NotAMember(ConnectionId::from("c")),
        ];
        for r in all {
            assert!(r.label().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.to_string().starts_with("malformed message"));
    }
}
