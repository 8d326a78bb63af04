//! Server error types.

use thiserror::Error;

/// Failures surfaced by the server outside the WebSocket protocol.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bound listener could not report its address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
    /// The library catalog could not be read.
    #[error("failed to read library at {path}: {source}")]
    Catalog {
        /// Library directory.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    /// The hub task has stopped.
    #[error("party hub is not running")]
    HubClosed,
}

impl ServerError {
    /// Build a bind error for `addr`.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
