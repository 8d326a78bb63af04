//! WebSocket wire format.
//!
//! Every frame is a JSON text message shaped as an envelope:
//!
//! ```json
//! { "type": "party:join", "data": "9f86d081884c7d65" }
//! ```
//!
//! [`ClientMessage`] covers frames a client may send; [`ServerEvent`] covers
//! frames the server pushes. Both derive `Serialize` and `Deserialize` so the
//! server and the Rust client share one definition.
//!
//! Movie and subtitle objects come from the external library catalog. The
//! core only needs their identity; every other field is carried in a
//! flattened map and forwarded untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, PartyId};

// ─────────────────────────────────────────────────────────────────────────────
// Catalog references
// ─────────────────────────────────────────────────────────────────────────────

/// Catalog identifier of a movie, forwarded exactly as the catalog wrote it.
///
/// Catalogs key movies either by string or by numeric (TMDB) id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MovieId {
    /// Numeric id such as `152601`.
    Number(Number),
    /// String id.
    Text(String),
}

impl MovieId {
    /// Id from a scalar JSON value; `None` for anything else.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n)),
            Value::String(s) => Some(Self::Text(s)),
            _ => None,
        }
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MovieId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for MovieId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for MovieId {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl PartialEq<&str> for MovieId {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::Text(s) if s == other)
    }
}

/// Opaque movie reference supplied by the library catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    /// Catalog identifier.
    pub id: MovieId,
    /// Display and playback metadata (title, playlist path, subtitles, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Movie {
    /// Movie with no metadata beyond its id.
    #[must_use]
    pub fn new(id: impl Into<MovieId>) -> Self {
        Self {
            id: id.into(),
            metadata: Map::new(),
        }
    }

    /// Display title, if the catalog supplied one.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// Subtitle track reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Language code of the track.
    pub language: String,
    /// Remaining track metadata (name, path, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Master-issued playback command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackAction {
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Jump to a position in seconds.
    Seek {
        /// Target position in seconds.
        #[serde(rename = "currentTime", alias = "time")]
        current_time: f64,
    },
    /// Switch the party to another movie.
    ChangeMovie {
        /// The new movie.
        movie: Movie,
    },
    /// Switch subtitle track; `None` turns subtitles off.
    SubtitleChange {
        /// Selected track.
        #[serde(default)]
        subtitle: Option<Subtitle>,
    },
}

impl PlaybackAction {
    /// Wire name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Seek { .. } => "SEEK",
            Self::ChangeMovie { .. } => "CHANGE_MOVIE",
            Self::SubtitleChange { .. } => "SUBTITLE_CHANGE",
        }
    }
}

/// Periodic authoritative playback sample from the master.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSample {
    /// Whether the master's player is playing.
    pub is_playing: bool,
    /// Master's position in seconds.
    pub current_time: f64,
}

/// Status report from the acquisition worker, relayed verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    /// Job identifier.
    pub id: String,
    /// Worker-defined status label.
    pub status: String,
    /// Progress as reported by the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    /// Free-form status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// A party member as shown to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    /// Connection id of the member.
    pub id: ConnectionId,
    /// Display name.
    pub username: String,
}

/// Full view of one party.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySnapshot {
    /// Party token.
    pub id: PartyId,
    /// Current master.
    pub master: MemberRef,
    /// Members in join order.
    pub members: Vec<MemberRef>,
    /// Movie being watched, `null` while idle.
    pub current_movie: Option<Movie>,
}

/// Global view of every party.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Parties keyed by id.
    pub parties: BTreeMap<PartyId, PartySnapshot>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────────────────

/// Frames sent by clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Create a party with the sender as master.
    #[serde(rename = "party:create")]
    Create,
    /// Join an existing party.
    #[serde(rename = "party:join")]
    Join(PartyId),
    /// Leave the current party.
    #[serde(rename = "party:leave")]
    Leave,
    /// Hand master role to another member.
    #[serde(rename = "party:promote_master")]
    PromoteMaster(ConnectionId),
    /// Playback command to relay.
    #[serde(rename = "party:action")]
    Action(PlaybackAction),
    /// Drift-correction sample to relay.
    #[serde(rename = "party:sync")]
    Sync(SyncSample),
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Create => "party:create",
            Self::Join(_) => "party:join",
            Self::Leave => "party:leave",
            Self::PromoteMaster(_) => "party:promote_master",
            Self::Action(_) => "party:action",
            Self::Sync(_) => "party:sync",
        }
    }
}

/// Frames pushed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// First frame on every connection.
    #[serde(rename = "connection:established")]
    ConnectionEstablished {
        /// The connection's own id, as it appears in snapshots.
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
    },
    /// Global party listing.
    #[serde(rename = "app:state")]
    AppState(AppState),
    /// The recipient's party, or `null` after leaving.
    #[serde(rename = "party:update")]
    PartyUpdate(Option<PartySnapshot>),
    /// Relayed playback command.
    #[serde(rename = "party:action")]
    Action(PlaybackAction),
    /// Relayed drift-correction sample.
    #[serde(rename = "party:sync")]
    Sync(SyncSample),
    /// Relayed acquisition job status.
    #[serde(rename = "job_update")]
    JobUpdate(JobUpdate),
}

impl ServerEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection:established",
            Self::AppState(_) => "app:state",
            Self::PartyUpdate(_) => "party:update",
            Self::Action(_) => "party:action",
            Self::Sync(_) => "party:sync",
            Self::JobUpdate(_) => "job_update",
        }
    }
}
