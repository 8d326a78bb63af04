//! # watchparty-client
//!
//! Rust client for a watch-party server.
//!
//! - [`connection`]: WebSocket connection with typed send helpers and an event loop
//! - [`follower`]: applies relayed actions and sync samples to a local [`Player`]
//! - [`emitter`]: master-side periodic `party:sync` broadcaster
//! - [`player`]: the seam to whatever renders video
//! - [`errors`]: client error types

#![deny(unsafe_code)]

pub mod connection;
pub mod emitter;
pub mod errors;
pub mod follower;
pub mod player;

pub use connection::PartyConnection;
pub use emitter::SyncEmitter;
pub use errors::{ClientError, Result};
pub use follower::PartyFollower;
pub use player::Player;
