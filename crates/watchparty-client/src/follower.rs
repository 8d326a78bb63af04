//! Party-side client state: applies server events to the local player.
//!
//! While the local connection is a follower, relayed actions drive the
//! player directly and sync samples are reconciled with
//! [`drift::reconcile`]. While it is master both are ignored; the master is
//! the one producing them.

use tracing::{debug, info};
use watchparty_core::drift::{self, Correction, Transport};
use watchparty_core::{
    ConnectionId, Movie, MovieId, PartySnapshot, PlaybackAction, ServerEvent, SyncSample,
};
use watchparty_settings::SyncSettings;

use crate::player::Player;

/// Local view of the party plus the player it controls.
pub struct PartyFollower<P> {
    self_id: ConnectionId,
    player: P,
    party: Option<PartySnapshot>,
    loaded: Option<MovieId>,
    drift_threshold_secs: f64,
}

impl<P: Player> PartyFollower<P> {
    /// Follower for connection `self_id` driving `player`.
    pub fn new(self_id: ConnectionId, player: P) -> Self {
        Self {
            self_id,
            player,
            party: None,
            loaded: None,
            drift_threshold_secs: drift::DEFAULT_DRIFT_THRESHOLD_SECS,
        }
    }

    /// Override the hard-seek threshold.
    #[must_use]
    pub fn with_drift_threshold(mut self, secs: f64) -> Self {
        self.drift_threshold_secs = secs;
        self
    }

    /// Apply the `sync.driftThresholdSecs` setting.
    #[must_use]
    pub fn with_settings(self, sync: &SyncSettings) -> Self {
        self.with_drift_threshold(sync.drift_threshold_secs)
    }

    /// This connection's id.
    pub fn self_id(&self) -> &ConnectionId {
        &self.self_id
    }

    /// The party this connection belongs to, if any.
    pub fn party(&self) -> Option<&PartySnapshot> {
        self.party.as_ref()
    }

    /// Whether this connection is its party's master.
    pub fn is_master(&self) -> bool {
        self.party
            .as_ref()
            .is_some_and(|p| p.master.id == self.self_id)
    }

    /// The driven player.
    pub fn player(&self) -> &P {
        &self.player
    }

    /// Mutable access to the driven player.
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// Apply any server event. Events that do not concern playback are ignored.
    pub fn handle(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::PartyUpdate(party) => self.on_party_update(party.clone()),
            ServerEvent::Action(action) => {
                let _ = self.on_action(action);
            }
            ServerEvent::Sync(sample) => {
                let _ = self.on_sync(sample);
            }
            ServerEvent::ConnectionEstablished { .. }
            | ServerEvent::AppState(_)
            | ServerEvent::JobUpdate(_) => {}
        }
    }

    /// Replace the local party snapshot.
    ///
    /// Opens the party's movie when the player is closed or showing a
    /// different one.
    pub fn on_party_update(&mut self, party: Option<PartySnapshot>) {
        self.party = party;
        if let Some(movie) = self
            .party
            .as_ref()
            .and_then(|p| p.current_movie.clone())
        {
            self.open(&movie);
        }
    }

    /// Apply a relayed playback action. Returns whether it was applied.
    pub fn on_action(&mut self, action: &PlaybackAction) -> bool {
        if self.is_master() {
            return false;
        }
        debug!(action = action.kind(), "applying master action");
        match action {
            PlaybackAction::Play => self.player.play(),
            PlaybackAction::Pause => self.player.pause(),
            PlaybackAction::Seek { current_time } => self.player.seek(*current_time),
            PlaybackAction::ChangeMovie { movie } => self.open(movie),
            PlaybackAction::SubtitleChange { subtitle } => {
                self.player.set_subtitle(subtitle.as_ref());
            }
        }
        true
    }

    /// Reconcile against a master sample.
    ///
    /// Returns the correction applied, or `None` when the sample was ignored
    /// (this connection is master, or no movie is open).
    pub fn on_sync(&mut self, sample: &SyncSample) -> Option<Correction> {
        if self.is_master() || !self.player.is_loaded() {
            return None;
        }
        let local = self.player.playback();
        let correction = drift::reconcile(local, sample, self.drift_threshold_secs);

        if let Some(target) = correction.seek_to {
            info!(
                drift = drift::drift(local.current_time, target),
                seek_to = target,
                "out of sync, seeking"
            );
            self.player.seek(target);
        }
        match correction.transport {
            Some(Transport::Resume) => self.player.play(),
            Some(Transport::Pause) => self.player.pause(),
            None => {}
        }
        Some(correction)
    }

    /// Load `movie` unless the player already shows it.
    ///
    /// A movie change arrives twice (snapshot, then relayed action); only the
    /// first one loads.
    fn open(&mut self, movie: &Movie) {
        if self.player.is_loaded() && self.loaded.as_ref() == Some(&movie.id) {
            return;
        }
        info!(movie_id = %movie.id, "opening party movie");
        self.player.load(movie);
        self.loaded = Some(movie.id.clone());
    }

    /// Sample to broadcast while master with a movie open.
    pub fn sample(&self) -> Option<SyncSample> {
        (self.is_master() && self.player.is_loaded()).then(|| SyncSample {
            is_playing: !self.player.is_paused(),
            current_time: self.player.current_time(),
        })
    }
}
