//! # watchparty-core
//!
//! Foundation types for synchronized group playback.
//!
//! - [`ids`]: branded connection and party IDs
//! - [`protocol`]: WebSocket envelope, playback actions, sync samples, snapshots
//! - [`registry`]: the session/party state machine and its fan-out targets
//! - [`drift`]: follower reconciliation against master sync samples
//! - [`errors`]: rejection reasons and protocol errors
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod drift;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod registry;

pub use errors::{ProtocolError, Rejected};
pub use ids::{ConnectionId, PartyId};
pub use protocol::{
    AppState, ClientMessage, JobUpdate, MemberRef, Movie, MovieId, PartySnapshot, PlaybackAction,
    ServerEvent, Subtitle, SyncSample,
};
pub use registry::{Outbound, Registry, Session};
