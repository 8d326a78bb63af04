//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants shared by the hub and the WebSocket sessions.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the server was full (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "ws_connections_refused_total";
/// Frames dropped because a connection's queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Inbound frames that failed to decode (counter).
pub const WS_MALFORMED_FRAMES_TOTAL: &str = "ws_malformed_frames_total";
/// Active parties (gauge).
pub const PARTIES_ACTIVE: &str = "parties_active";
/// Playback actions relayed (counter, labels: kind).
pub const PARTY_ACTIONS_RELAYED_TOTAL: &str = "party_actions_relayed_total";
/// Sync samples relayed (counter).
pub const PARTY_SYNCS_RELAYED_TOTAL: &str = "party_syncs_relayed_total";
/// Actions or samples dropped because the sender was not master (counter).
pub const PARTY_RELAYS_DROPPED_TOTAL: &str = "party_relays_dropped_total";
/// Requests ignored as invalid for the sender's state (counter, labels: reason).
pub const PARTY_REJECTIONS_TOTAL: &str = "party_rejections_total";
/// Job updates fanned out (counter).
pub const JOB_UPDATES_TOTAL: &str = "job_updates_total";
