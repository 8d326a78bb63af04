//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use watchparty_core::{ClientMessage, ConnectionId};

use super::admission::ConnectionSlot;
use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::hub::HubHandle;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_MALFORMED_FRAMES_TOTAL,
};

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub, which queues
///    `connection:established` and `app:state`
/// 2. Decodes incoming text frames and forwards them to the hub
/// 3. Writes queued frames and periodic pings to the socket
/// 4. Closes the session on client close, heartbeat timeout, or when `closed`
///    is cancelled (server shutdown)
/// 5. Reports the disconnect to the hub, then releases `slot`
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    username: Option<String>,
    hub: HubHandle,
    config: Arc<ServerConfig>,
    closed: CancellationToken,
    slot: ConnectionSlot,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    let connection_start = Instant::now();
    info!(username = username.as_deref().unwrap_or_default(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if hub.connect(connection.clone(), username).await.is_err() {
        warn!("hub unavailable, closing connection");
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        return;
    }

    let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_secs);

    let heartbeat = tokio::spawn({
        let connection = connection.clone();
        let closed = closed.clone();
        async move {
            if run_heartbeat(connection, heartbeat_interval, heartbeat_timeout, closed.clone()).await
                == HeartbeatResult::TimedOut
            {
                warn!(timeout = ?heartbeat_timeout, "client unresponsive, disconnecting");
                closed.cancel();
            }
        }
    });

    // Writer: drains the queue and pings on the heartbeat interval.
    let outbound = tokio::spawn({
        let closed = closed.clone();
        async move {
            let mut ping_interval = tokio::time::interval(heartbeat_interval);
            let _ = ping_interval.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_interval.tick() => {
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    () = closed.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            closed.cancel();
        }
    });

    // Reader: decode and forward to the hub.
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = closed.cancelled() => break,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let text = match msg {
            Message::Text(ref t) => t.as_str().to_owned(),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    s.to_owned()
                } else {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match ClientMessage::decode(&text) {
            Ok(message) => {
                debug!(event = message.event_name(), "frame received");
                if hub.message(conn_id.clone(), message).await.is_err() {
                    warn!("hub unavailable, closing connection");
                    break;
                }
            }
            Err(e) => {
                counter!(WS_MALFORMED_FRAMES_TOTAL).increment(1);
                warn!(error = %e, "dropping malformed frame");
            }
        }
    }

    closed.cancel();
    let _ = hub.disconnect(conn_id).await;
    let _ = tokio::join!(outbound, heartbeat);

    info!(
        dropped = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    drop(slot);
}
