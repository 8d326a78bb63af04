//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may set any subset of fields; missing fields keep their default.

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 3000 },
///   "sync": { "intervalMs": 1000 },
///   "library": { "path": "/srv/library" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchpartySettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Drift-correction settings shared with clients.
    pub sync: SyncSettings,
    /// Library catalog location.
    pub library: LibrarySettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect clients silent for longer than this, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before dropping.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Drift-correction parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Period between master sync samples, in milliseconds.
    pub interval_ms: u64,
    /// Drift beyond which followers hard-seek, in seconds.
    pub drift_threshold_secs: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            drift_threshold_secs: 3.0,
        }
    }
}

/// Library catalog location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibrarySettings {
    /// Directory holding one folder per movie with a `metadata.json`.
    pub path: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            path: "library".to_string(),
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug output.
    Debug,
    /// Default.
    #[default]
    Info,
    /// Warnings and errors only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}
