//! # watchparty-server
//!
//! Axum HTTP + `WebSocket` gateway for synchronized group playback.
//!
//! - `WebSocket` gateway at `/ws?username=`: per-connection reader/writer
//!   tasks, heartbeat, bounded outbound queues
//! - Single-writer [`hub`] owning the party registry; every notification is
//!   fanned out after the mutation that caused it
//! - HTTP: `/api/library`, `/api/jobs/{id}/status`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::WatchpartyServer;
