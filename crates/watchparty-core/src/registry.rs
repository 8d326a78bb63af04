//! Session and party registry.
//!
//! [`Registry`] is the only owner of session and party state. It has no
//! interior mutability and no locks: the server drives it from a single task,
//! one inbound event at a time, so every operation runs to completion before
//! the next begins.
//!
//! Operations do not perform I/O. Each successful mutation returns the
//! [`Outbound`] notifications it produced, computed from the post-mutation
//! state, and the caller delivers them. Requests that cannot be applied
//! return a [`Rejected`] reason and leave state untouched.
//!
//! Invariants after every operation:
//! - every party's master is one of its members
//! - no party exists with zero members
//! - a session's `party_id` always names a party that lists it as a member

use std::collections::HashMap;

use tracing::{debug, info};

use crate::errors::Rejected;
use crate::ids::{ConnectionId, PartyId};
use crate::protocol::{
    AppState, JobUpdate, MemberRef, Movie, PartySnapshot, PlaybackAction, ServerEvent, SyncSample,
};

/// Display name used when the handshake carries none.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// A live connection and its party membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Free-text display name.
    pub username: String,
    /// Party the session belongs to, if any.
    pub party_id: Option<PartyId>,
}

/// Whether a party has a movie selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovieState {
    /// No movie has been selected yet.
    Idle,
    /// A `CHANGE_MOVIE` has been applied.
    Active,
}

/// A group of sessions watching together.
#[derive(Clone, Debug, PartialEq)]
pub struct Party {
    /// Party token.
    pub id: PartyId,
    /// Session authorized to drive playback.
    pub master: ConnectionId,
    /// Members in join order. Index 0 is the oldest member.
    pub members: Vec<ConnectionId>,
    /// Movie being watched.
    pub current_movie: Option<Movie>,
}

impl Party {
    fn new(id: PartyId, founder: ConnectionId) -> Self {
        Self {
            id,
            master: founder.clone(),
            members: vec![founder],
            current_movie: None,
        }
    }

    /// Movie-level state of the party.
    pub fn movie_state(&self) -> MovieState {
        if self.current_movie.is_some() {
            MovieState::Active
        } else {
            MovieState::Idle
        }
    }

    /// Whether `id` is a current member.
    pub fn has_member(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    fn members_except(&self, sender: &ConnectionId) -> Vec<ConnectionId> {
        self.members.iter().filter(|m| *m != sender).cloned().collect()
    }
}

/// A notification addressed to a set of connections.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    /// Recipients.
    pub to: Vec<ConnectionId>,
    /// Event to deliver.
    pub event: ServerEvent,
}

impl Outbound {
    fn new(to: Vec<ConnectionId>, event: ServerEvent) -> Self {
        Self { to, event }
    }

    fn one(to: &ConnectionId, event: ServerEvent) -> Self {
        Self::new(vec![to.clone()], event)
    }
}

/// Result of a registry operation.
pub type Outcome = Result<Vec<Outbound>, Rejected>;

/// Owned session and party state.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    parties: HashMap<PartyId, Party>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Session registry ────────────────────────────────────────────────

    /// Register a session for a new connection.
    ///
    /// Empty or whitespace-only usernames become [`DEFAULT_USERNAME`].
    /// Registering an id that is already present replaces its name but keeps
    /// its membership.
    pub fn register(&mut self, id: ConnectionId, username: Option<&str>) -> Session {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_USERNAME)
            .to_owned();
        let session = self
            .sessions
            .entry(id.clone())
            .and_modify(|s| s.username.clone_from(&username))
            .or_insert_with(|| Session {
                id,
                username,
                party_id: None,
            });
        session.clone()
    }

    /// Register a connection and produce its welcome frames: its own id
    /// followed by the current global state.
    pub fn connect(&mut self, id: ConnectionId, username: Option<&str>) -> Vec<Outbound> {
        let session = self.register(id, username);
        debug!(conn_id = %session.id, username = %session.username, "session registered");
        vec![
            Outbound::one(
                &session.id,
                ServerEvent::ConnectionEstablished {
                    client_id: session.id.clone(),
                },
            ),
            Outbound::one(&session.id, ServerEvent::AppState(self.app_state())),
        ]
    }

    /// Look up a session.
    pub fn lookup(&self, id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Remove a session, leaving its party first.
    ///
    /// Unknown ids are ignored, so duplicate disconnect signals are harmless.
    /// Unlike an explicit leave, the departing connection is not sent a
    /// `party:update(null)`, and it is excluded from the global broadcast.
    pub fn remove(&mut self, id: &ConnectionId) -> Vec<Outbound> {
        if !self.sessions.contains_key(id) {
            return Vec::new();
        }
        let outbound = match self.detach(id) {
            Ok(party_id) => {
                let _ = self.sessions.remove(id);
                self.after_leave(&party_id)
            }
            Err(_) => {
                let _ = self.sessions.remove(id);
                Vec::new()
            }
        };
        debug!(conn_id = %id, "session removed");
        outbound
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // ── Party lifecycle ─────────────────────────────────────────────────

    /// Create a party with `id` as its founder and master.
    pub fn create(&mut self, id: &ConnectionId) -> Outcome {
        let session = self.session(id)?;
        if let Some(existing) = &session.party_id {
            return Err(Rejected::AlreadyInParty(existing.clone()));
        }

        let party_id = self.fresh_party_id();
        let _ = self
            .parties
            .insert(party_id.clone(), Party::new(party_id.clone(), id.clone()));
        self.session_mut(id)?.party_id = Some(party_id.clone());

        info!(party_id = %party_id, conn_id = %id, "party created");
        Ok(vec![self.party_update(&party_id), self.global_update()]
            .into_iter()
            .flatten()
            .collect())
    }

    /// Append `id` to the members of `party_id`.
    pub fn join(&mut self, id: &ConnectionId, party_id: &PartyId) -> Outcome {
        let session = self.session(id)?;
        if let Some(existing) = &session.party_id {
            return Err(Rejected::AlreadyInParty(existing.clone()));
        }
        let party = self
            .parties
            .get_mut(party_id)
            .ok_or_else(|| Rejected::UnknownParty(party_id.clone()))?;

        party.members.push(id.clone());
        self.session_mut(id)?.party_id = Some(party_id.clone());

        info!(party_id = %party_id, conn_id = %id, "session joined party");
        Ok(vec![self.party_update(party_id), self.global_update()]
            .into_iter()
            .flatten()
            .collect())
    }

    /// Leave the current party.
    ///
    /// If the master leaves, the oldest remaining member becomes master. The
    /// party is deleted when its last member leaves. The leaver receives
    /// `party:update(null)`.
    pub fn leave(&mut self, id: &ConnectionId) -> Outcome {
        let party_id = self.detach(id)?;
        let mut outbound = vec![Outbound::one(id, ServerEvent::PartyUpdate(None))];
        outbound.extend(self.after_leave(&party_id));
        Ok(outbound)
    }

    /// Make `target` the master of the invoker's party.
    pub fn promote(&mut self, invoker: &ConnectionId, target: &ConnectionId) -> Outcome {
        let party_id = self.authorize_master(invoker)?;
        let party = self
            .parties
            .get_mut(&party_id)
            .ok_or(Rejected::NotInParty)?;
        if target == invoker || !party.has_member(target) {
            return Err(Rejected::NotAMember(target.clone()));
        }

        party.master = target.clone();
        info!(party_id = %party_id, master = %target, "master promoted");
        Ok(self.party_update(&party_id).into_iter().collect())
    }

    // ── Relay ───────────────────────────────────────────────────────────

    /// Relay a playback action from the party master to every other member.
    ///
    /// Authorization is checked against the current master at call time.
    /// `CHANGE_MOVIE` records the movie on the party before relaying and
    /// refreshes every member's snapshot.
    pub fn relay_action(&mut self, sender: &ConnectionId, action: PlaybackAction) -> Outcome {
        let party_id = self.authorize_master(sender)?;
        let mut outbound = Vec::new();

        if let PlaybackAction::ChangeMovie { movie } = &action {
            if let Some(party) = self.parties.get_mut(&party_id) {
                party.current_movie = Some(movie.clone());
            }
            info!(party_id = %party_id, movie_id = %movie.id, "party movie changed");
            outbound.extend(self.party_update(&party_id));
        }

        let recipients = self.others_in_party(&party_id, sender);
        if !recipients.is_empty() {
            outbound.push(Outbound::new(recipients, ServerEvent::Action(action)));
        }
        Ok(outbound)
    }

    /// Relay a drift-correction sample from the party master to every other
    /// member.
    pub fn relay_sync(&self, sender: &ConnectionId, sample: SyncSample) -> Outcome {
        let party_id = self.authorize_master(sender)?;
        let recipients = self.others_in_party(&party_id, sender);
        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Outbound::new(recipients, ServerEvent::Sync(sample))])
    }

    /// Address an acquisition job update to every connection.
    pub fn job_update(&self, job: JobUpdate) -> Vec<Outbound> {
        let everyone = self.all_sessions();
        if everyone.is_empty() {
            return Vec::new();
        }
        vec![Outbound::new(everyone, ServerEvent::JobUpdate(job))]
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Look up a party.
    pub fn party(&self, id: &PartyId) -> Option<&Party> {
        self.parties.get(id)
    }

    /// Number of live parties.
    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    /// Client-facing view of one party.
    pub fn snapshot(&self, id: &PartyId) -> Option<PartySnapshot> {
        let party = self.parties.get(id)?;
        let member_ref = |conn: &ConnectionId| MemberRef {
            id: conn.clone(),
            username: self
                .sessions
                .get(conn)
                .map_or_else(|| DEFAULT_USERNAME.to_owned(), |s| s.username.clone()),
        };
        Some(PartySnapshot {
            id: party.id.clone(),
            master: member_ref(&party.master),
            members: party.members.iter().map(member_ref).collect(),
            current_movie: party.current_movie.clone(),
        })
    }

    /// Client-facing view of every party.
    pub fn app_state(&self) -> AppState {
        AppState {
            parties: self
                .parties
                .keys()
                .filter_map(|id| self.snapshot(id).map(|s| (id.clone(), s)))
                .collect(),
        }
    }

    /// Verify the registry invariants, describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (id, party) in &self.parties {
            if &party.id != id {
                return Err(format!("party {id} stored under a different key"));
            }
            if party.members.is_empty() {
                return Err(format!("party {id} has no members"));
            }
            if !party.has_member(&party.master) {
                return Err(format!("master of party {id} is not a member"));
            }
            for member in &party.members {
                let owner = self.sessions.get(member).and_then(|s| s.party_id.as_ref());
                if owner != Some(id) {
                    return Err(format!("member {member} of party {id} does not point back"));
                }
            }
            let mut seen = std::collections::HashSet::new();
            if !party.members.iter().all(|m| seen.insert(m)) {
                return Err(format!("party {id} lists a member twice"));
            }
        }
        for session in self.sessions.values() {
            if let Some(pid) = &session.party_id {
                let listed = self.parties.get(pid).is_some_and(|p| p.has_member(&session.id));
                if !listed {
                    return Err(format!("session {} points at party {pid} without membership", session.id));
                }
            }
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn session(&self, id: &ConnectionId) -> Result<&Session, Rejected> {
        self.sessions
            .get(id)
            .ok_or_else(|| Rejected::UnknownSession(id.clone()))
    }

    fn session_mut(&mut self, id: &ConnectionId) -> Result<&mut Session, Rejected> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| Rejected::UnknownSession(id.clone()))
    }

    fn fresh_party_id(&self) -> PartyId {
        loop {
            let id = PartyId::generate();
            if !self.parties.contains_key(&id) {
                return id;
            }
        }
    }

    /// Party id of `id`, provided it is that party's master.
    fn authorize_master(&self, id: &ConnectionId) -> Result<PartyId, Rejected> {
        let party_id = self.session(id)?.party_id.clone().ok_or(Rejected::NotInParty)?;
        let party = self.parties.get(&party_id).ok_or(Rejected::NotInParty)?;
        if &party.master != id {
            return Err(Rejected::NotMaster(party_id));
        }
        Ok(party_id)
    }

    /// Remove `id` from its party, applying master succession and deleting
    /// the party when it empties. Returns the party it left.
    fn detach(&mut self, id: &ConnectionId) -> Result<PartyId, Rejected> {
        let party_id = self.session_mut(id)?.party_id.take().ok_or(Rejected::NotInParty)?;

        let Some(party) = self.parties.get_mut(&party_id) else {
            return Ok(party_id);
        };
        party.members.retain(|m| m != id);

        if party.members.is_empty() {
            let _ = self.parties.remove(&party_id);
            info!(party_id = %party_id, conn_id = %id, "last member left, party deleted");
        } else if &party.master == id {
            party.master = party.members[0].clone();
            info!(party_id = %party_id, master = %party.master, "master left, oldest member promoted");
        } else {
            info!(party_id = %party_id, conn_id = %id, "session left party");
        }
        Ok(party_id)
    }

    fn after_leave(&self, party_id: &PartyId) -> Vec<Outbound> {
        self.party_update(party_id)
            .into_iter()
            .chain(self.global_update())
            .collect()
    }

    fn party_update(&self, party_id: &PartyId) -> Option<Outbound> {
        let party = self.parties.get(party_id)?;
        let snapshot = self.snapshot(party_id)?;
        Some(Outbound::new(
            party.members.clone(),
            ServerEvent::PartyUpdate(Some(snapshot)),
        ))
    }

    fn global_update(&self) -> Option<Outbound> {
        let everyone = self.all_sessions();
        if everyone.is_empty() {
            return None;
        }
        Some(Outbound::new(everyone, ServerEvent::AppState(self.app_state())))
    }

    fn others_in_party(&self, party_id: &PartyId, sender: &ConnectionId) -> Vec<ConnectionId> {
        self.parties
            .get(party_id)
            .map(|p| p.members_except(sender))
            .unwrap_or_default()
    }

    fn all_sessions(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}
