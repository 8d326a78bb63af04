//! WebSocket sessions: admission, per-connection state, heartbeat.

pub mod admission;
pub mod connection;
pub mod heartbeat;
pub mod session;
