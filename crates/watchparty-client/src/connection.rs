//! WebSocket connection to a watch-party server.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use watchparty_core::{ClientMessage, ConnectionId, PartyId, PlaybackAction, ServerEvent, SyncSample};

use crate::errors::{ClientError, Result};
use crate::follower::PartyFollower;
use crate::player::Player;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established connection, past the `connection:established` frame.
pub struct PartyConnection {
    client_id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl PartyConnection {
    /// Connect to `base_url` (for example `ws://127.0.0.1:3000`) as `username`.
    ///
    /// Waits for the server's first frame and fails with
    /// [`ClientError::Handshake`] if it is not `connection:established`.
    #[instrument(skip(username))]
    pub async fn connect(base_url: &str, username: &str) -> Result<Self> {
        let url = ws_url(base_url, username);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Connect {
                url: url.clone(),
                source: Box::new(e),
            })?;
        let (sink, mut stream) = ws.split();

        let client_id = match read_event(&mut stream).await? {
            ServerEvent::ConnectionEstablished { client_id } => client_id,
            other => return Err(ClientError::Handshake(other.event_name().to_owned())),
        };
        info!(%client_id, "connected");

        Ok(Self {
            client_id,
            sink,
            stream,
        })
    }

    /// Id the server assigned to this connection.
    pub fn client_id(&self) -> &ConnectionId {
        &self.client_id
    }

    /// Send one frame.
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let text = msg.encode()?;
        debug!(event = msg.event_name(), "sending");
        self.sink.send(Message::text(text)).await?;
        Ok(())
    }

    /// Next server event. Non-text frames are skipped.
    pub async fn next_event(&mut self) -> Result<ServerEvent> {
        read_event(&mut self.stream).await
    }

    /// Create a party with this connection as master.
    pub async fn create_party(&mut self) -> Result<()> {
        self.send(&ClientMessage::Create).await
    }

    /// Join an existing party.
    pub async fn join_party(&mut self, party_id: PartyId) -> Result<()> {
        self.send(&ClientMessage::Join(party_id)).await
    }

    /// Leave the current party.
    pub async fn leave_party(&mut self) -> Result<()> {
        self.send(&ClientMessage::Leave).await
    }

    /// Hand the master role to `target`.
    pub async fn promote(&mut self, target: ConnectionId) -> Result<()> {
        self.send(&ClientMessage::PromoteMaster(target)).await
    }

    /// Issue a playback command to the party.
    pub async fn send_action(&mut self, action: PlaybackAction) -> Result<()> {
        self.send(&ClientMessage::Action(action)).await
    }

    /// Broadcast a sync sample.
    pub async fn send_sync(&mut self, sample: SyncSample) -> Result<()> {
        self.send(&ClientMessage::Sync(sample)).await
    }

    /// Close the socket.
    pub async fn close(mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await?;
        Ok(())
    }

    /// Drive `follower` from server events and forward `outbound` frames
    /// until cancelled or the server closes the connection.
    ///
    /// Malformed server frames are logged and skipped.
    #[instrument(skip_all, fields(client_id = %self.client_id))]
    pub async fn run<P: Player>(
        mut self,
        follower: Arc<Mutex<PartyFollower<P>>>,
        mut outbound: mpsc::Receiver<ClientMessage>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut outbound_open = true;
        loop {
            tokio::select! {
                event = read_event(&mut self.stream) => match event {
                    Ok(event) => follower.lock().handle(&event),
                    Err(ClientError::Codec(e)) => warn!(error = %e, "skipping malformed frame"),
                    Err(ClientError::Closed) => {
                        info!("server closed connection");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
                msg = outbound.recv(), if outbound_open => match msg {
                    Some(msg) => self.send(&msg).await?,
                    None => outbound_open = false,
                },
                () = cancel.cancelled() => {
                    debug!("cancelled, closing");
                    return self.close().await;
                }
            }
        }
    }
}

async fn read_event(stream: &mut SplitStream<WsStream>) -> Result<ServerEvent> {
    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(text) => return Ok(ServerEvent::decode(text.as_str())?),
            Message::Close(_) => return Err(ClientError::Closed),
            _ => {}
        }
    }
    Err(ClientError::Closed)
}

fn ws_url(base_url: &str, username: &str) -> String {
    format!(
        "{}/ws?username={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(username)
    )
}
