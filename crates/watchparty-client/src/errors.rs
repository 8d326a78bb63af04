//! Client error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use watchparty_core::ProtocolError;

/// Failures talking to a watch-party server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket handshake failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Server URL.
        url: String,
        /// Handshake error.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// Reading or writing the socket failed.
    #[error("websocket transport error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),
    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),
    /// The connection closed before the expected frame arrived.
    #[error("connection closed")]
    Closed,
    /// The server's first frame was not `connection:established`.
    #[error("unexpected handshake frame: {0}")]
    Handshake(String),
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display() {
        assert_eq!(ClientError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn transport_from_tungstenite() {
        let err: ClientError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.to_string().starts_with("websocket transport error"));
    }

    #[test]
    fn codec_from_protocol_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClientError = ProtocolError::from(json_err).into();
        assert!(matches!(err, ClientError::Codec(_)));
    }

    #[test]
    fn connect_error_names_url() {
        let err = ClientError::Connect {
            url: "ws://localhost:3000/ws".into(),
            source: Box::new(tungstenite::Error::ConnectionClosed),
        };
        assert!(err.to_string().contains("ws://localhost:3000/ws"));
    }
}
