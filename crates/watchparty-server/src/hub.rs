//! Single-writer party hub.
//!
//! One task owns the [`Registry`] and the table of live connections. Every
//! WebSocket session, and the HTTP job-status route, talks to it through a
//! [`HubHandle`]. Commands are applied one at a time in arrival order;
//! mutations never await, and the resulting notifications are pushed into
//! each recipient's bounded queue with `try_send` only after the mutation
//! has been applied.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use watchparty_core::registry::Outcome;
use watchparty_core::{ClientMessage, ConnectionId, JobUpdate, Outbound, Registry, Rejected};

use crate::errors::{Result, ServerError};
use crate::metrics::{
    JOB_UPDATES_TOTAL, PARTIES_ACTIVE, PARTY_ACTIONS_RELAYED_TOTAL, PARTY_REJECTIONS_TOTAL,
    PARTY_RELAYS_DROPPED_TOTAL, PARTY_SYNCS_RELAYED_TOTAL, WS_BROADCAST_DROPS_TOTAL,
};
use crate::websocket::connection::ClientConnection;

/// Queue depth between sessions and the hub.
const COMMAND_QUEUE_CAPACITY: usize = 4096;

/// Counters reported by the hub.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Registered sessions.
    pub connections: usize,
    /// Live parties.
    pub parties: usize,
}

/// Inbound events processed by the hub.
pub enum HubCommand {
    /// A WebSocket was upgraded.
    Connect {
        /// Send half of the new connection.
        connection: Arc<ClientConnection>,
        /// Handshake display name.
        username: Option<String>,
    },
    /// A decoded frame from a connection.
    Message {
        /// Sender.
        conn_id: ConnectionId,
        /// Command.
        message: ClientMessage,
    },
    /// A connection closed.
    Disconnect {
        /// Connection that went away.
        conn_id: ConnectionId,
    },
    /// Job status pushed by an acquisition worker.
    JobUpdate(JobUpdate),
    /// Counter query.
    Stats {
        /// Reply channel.
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable sender side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a new connection. Its welcome frames are queued on it.
    pub async fn connect(
        &self,
        connection: Arc<ClientConnection>,
        username: Option<String>,
    ) -> Result<()> {
        self.send(HubCommand::Connect {
            connection,
            username,
        })
        .await
    }

    /// Submit a decoded frame from `conn_id`.
    pub async fn message(&self, conn_id: ConnectionId, message: ClientMessage) -> Result<()> {
        self.send(HubCommand::Message { conn_id, message }).await
    }

    /// Report that `conn_id` closed. Safe to call more than once.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Result<()> {
        self.send(HubCommand::Disconnect { conn_id }).await
    }

    /// Fan a job status out to every connection.
    pub async fn job_update(&self, job: JobUpdate) -> Result<()> {
        self.send(HubCommand::JobUpdate(job)).await
    }

    /// Current counters, answered by the hub task.
    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply }).await?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    async fn send(&self, command: HubCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| ServerError::HubClosed)
    }
}

/// The hub task's owned state.
pub struct Hub {
    registry: Registry,
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    rx: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a hub and the handle used to reach it.
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let hub = Self {
            registry: Registry::new(),
            connections: HashMap::new(),
            rx,
        };
        (hub, HubHandle { tx })
    }

    /// Process commands until every handle is dropped or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("party hub started");
        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                () = cancel.cancelled() => break,
            }
        }
        info!(
            sessions = self.registry.session_count(),
            parties = self.registry.party_count(),
            "party hub stopped"
        );
    }

    /// Apply one command and deliver its notifications.
    pub fn apply(&mut self, command: HubCommand) {
        let outbound = match command {
            HubCommand::Connect {
                connection,
                username,
            } => {
                let id = connection.id.clone();
                let _ = self.connections.insert(id.clone(), connection);
                self.registry.connect(id, username.as_deref())
            }
            HubCommand::Message { conn_id, message } => {
                let event = message.event_name();
                self.dispatch(&conn_id, message).unwrap_or_else(|rejected| {
                    Self::record_rejection(&conn_id, event, &rejected);
                    Vec::new()
                })
            }
            HubCommand::Disconnect { conn_id } => {
                let outbound = self.registry.remove(&conn_id);
                if self.connections.remove(&conn_id).is_some() {
                    debug!(conn_id = %conn_id, "connection released");
                }
                outbound
            }
            HubCommand::JobUpdate(job) => {
                debug!(job_id = %job.id, status = %job.status, "job update");
                counter!(JOB_UPDATES_TOTAL).increment(1);
                self.registry.job_update(job)
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
                return;
            }
        };

        #[allow(clippy::cast_precision_loss)]
        gauge!(PARTIES_ACTIVE).set(self.registry.party_count() as f64);

        self.deliver(outbound);
    }

    /// Current counters.
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.session_count(),
            parties: self.registry.party_count(),
        }
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn dispatch(&mut self, conn_id: &ConnectionId, message: ClientMessage) -> Outcome {
        match message {
            ClientMessage::Create => self.registry.create(conn_id),
            ClientMessage::Join(party_id) => self.registry.join(conn_id, &party_id),
            ClientMessage::Leave => self.registry.leave(conn_id),
            ClientMessage::PromoteMaster(target) => self.registry.promote(conn_id, &target),
            ClientMessage::Action(action) => {
                let kind = action.kind();
                let outbound = self.registry.relay_action(conn_id, action)?;
                counter!(PARTY_ACTIONS_RELAYED_TOTAL, "kind" => kind).increment(1);
                Ok(outbound)
            }
            ClientMessage::Sync(sample) => {
                let outbound = self.registry.relay_sync(conn_id, sample)?;
                counter!(PARTY_SYNCS_RELAYED_TOTAL).increment(1);
                Ok(outbound)
            }
        }
    }

    fn record_rejection(conn_id: &ConnectionId, event: &'static str, rejected: &Rejected) {
        debug!(conn_id = %conn_id, event, reason = %rejected, "request ignored");
        if matches!(event, "party:action" | "party:sync") {
            counter!(PARTY_RELAYS_DROPPED_TOTAL).increment(1);
        }
        counter!(PARTY_REJECTIONS_TOTAL, "reason" => rejected.label()).increment(1);
    }

    fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { to, event } in outbound {
            let json = match event.encode() {
                Ok(json) => Arc::new(json),
                Err(e) => {
                    warn!(event = event.event_name(), error = %e, "failed to encode event");
                    continue;
                }
            };
            for recipient in &to {
                let Some(conn) = self.connections.get(recipient) else {
                    continue;
                };
                if !conn.send(json.clone()) {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(
                        conn_id = %recipient,
                        event = event.event_name(),
                        dropped = conn.drop_count(),
                        "outbound queue full or closed, frame dropped"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchparty_core::{PartyId, PlaybackAction, ServerEvent, SyncSample};

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<Arc<String>>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                events.push(ServerEvent::decode(&frame).unwrap());
            }
            events
        }
    }

    fn connect(hub: &mut Hub, id: &str, name: &str, capacity: usize) -> Client {
        let (tx, rx) = mpsc::channel(capacity);
        let id = ConnectionId::from(id);
        let connection = Arc::new(ClientConnection::new(id.clone(), tx));
        hub.apply(HubCommand::Connect {
            connection,
            username: Some(name.into()),
        });
        Client { id, rx }
    }

    fn message(hub: &mut Hub, from: &Client, message: ClientMessage) {
        hub.apply(HubCommand::Message {
            conn_id: from.id.clone(),
            message,
        });
    }

    fn only_party(hub: &Hub) -> PartyId {
        let state = hub.registry().app_state();
        assert_eq!(state.parties.len(), 1);
        state.parties.keys().next().unwrap().clone()
    }

    #[test]
    fn connect_queues_welcome_frames() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);

        let events = a.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ServerEvent::ConnectionEstablished {
                client_id: a.id.clone()
            }
        );
        assert!(matches!(&events[1], ServerEvent::AppState(s) if s.parties.is_empty()));
        assert_eq!(hub.stats().connections, 1);
    }

    #[test]
    fn create_join_seek_flow() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);
        let mut b = connect(&mut hub, "b", "bob", 16);
        let _ = (a.drain(), b.drain());

        message(&mut hub, &a, ClientMessage::Create);
        let party = only_party(&hub);
        let _ = (a.drain(), b.drain());

        message(&mut hub, &b, ClientMessage::Join(party));
        let _ = (a.drain(), b.drain());

        message(
            &mut hub,
            &a,
            ClientMessage::Action(PlaybackAction::Seek {
                current_time: 120.5,
            }),
        );
        assert!(a.drain().is_empty());
        assert_eq!(
            b.drain(),
            vec![ServerEvent::Action(PlaybackAction::Seek {
                current_time: 120.5
            })]
        );
    }

    #[test]
    fn follower_sync_is_dropped() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);
        let mut b = connect(&mut hub, "b", "bob", 16);
        message(&mut hub, &a, ClientMessage::Create);
        let party = only_party(&hub);
        message(&mut hub, &b, ClientMessage::Join(party));
        let _ = (a.drain(), b.drain());

        message(
            &mut hub,
            &b,
            ClientMessage::Sync(SyncSample {
                is_playing: true,
                current_time: 3.0,
            }),
        );
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[test]
    fn disconnect_is_idempotent_and_hands_over_master() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);
        let mut b = connect(&mut hub, "b", "bob", 16);
        message(&mut hub, &a, ClientMessage::Create);
        let party = only_party(&hub);
        message(&mut hub, &b, ClientMessage::Join(party.clone()));
        let _ = (a.drain(), b.drain());

        hub.apply(HubCommand::Disconnect {
            conn_id: a.id.clone(),
        });
        hub.apply(HubCommand::Disconnect {
            conn_id: a.id.clone(),
        });

        assert_eq!(hub.registry().party(&party).unwrap().master, b.id);
        let events = b.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PartyUpdate(Some(s)) if s.master.id == b.id && s.members.len() == 1
        )));
        assert_eq!(hub.stats(), HubStats {
            connections: 1,
            parties: 1
        });
    }

    #[test]
    fn full_queue_drops_without_blocking_others() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);
        // room for the two welcome frames only
        let mut slow = connect(&mut hub, "slow", "sloth", 2);

        message(&mut hub, &a, ClientMessage::Create);

        assert_eq!(slow.drain().len(), 2);
        assert!(!a.drain().is_empty());
        assert_eq!(hub.stats().parties, 1);
    }

    #[test]
    fn job_update_reaches_everyone() {
        let (mut hub, _handle) = Hub::new();
        let mut a = connect(&mut hub, "a", "alice", 16);
        let mut b = connect(&mut hub, "b", "bob", 16);
        let _ = (a.drain(), b.drain());

        let job = JobUpdate {
            id: "job_1".into(),
            status: "downloading".into(),
            progress: Some(serde_json::json!(42)),
            message: None,
        };
        hub.apply(HubCommand::JobUpdate(job.clone()));

        assert_eq!(a.drain(), vec![ServerEvent::JobUpdate(job.clone())]);
        assert_eq!(b.drain(), vec![ServerEvent::JobUpdate(job)]);
    }

    #[tokio::test]
    async fn handle_round_trips_through_running_hub() {
        let (hub, handle) = Hub::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));

        let (tx, mut rx) = mpsc::channel(16);
        let id = ConnectionId::from("remote");
        let conn = Arc::new(ClientConnection::new(id.clone(), tx));
        handle.connect(conn, None).await.unwrap();
        handle.message(id.clone(), ClientMessage::Create).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats, HubStats {
            connections: 1,
            parties: 1
        });

        let first = ServerEvent::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.event_name(), "connection:established");

        handle.disconnect(id).await.unwrap();
        assert_eq!(handle.stats().await.unwrap(), HubStats::default());

        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(handle.stats().await, Err(ServerError::HubClosed)));
    }
}
