//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's alive flag.
///
/// At each `interval` tick the flag is read and reset. Once the client has
/// missed `timeout / interval` consecutive ticks (at least one),
/// [`HeartbeatResult::TimedOut`] is returned. The session's writer sends the
/// pings; any inbound frame marks the client alive.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // first tick completes immediately
    let _ = check_interval.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from((timeout.as_millis() / interval_ms).max(1)).unwrap_or(u32::MAX);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
