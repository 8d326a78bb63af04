//! Follower-side drift reconciliation.
//!
//! The master periodically broadcasts a [`SyncSample`]. Samples carry no
//! sequence number: the latest one wins and a lost sample is simply
//! superseded by the next. On every sample a follower compares its local
//! position and play state against the sample and corrects:
//!
//! - position drift beyond the threshold is fixed with a hard seek
//! - a paused follower resumes if the master is playing
//! - a playing follower pauses if the master is paused

use crate::protocol::SyncSample;

/// Drift (seconds) tolerated before a hard seek.
pub const DEFAULT_DRIFT_THRESHOLD_SECS: f64 = 3.0;

/// Period between master samples, in milliseconds.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 1000;

/// Follower's local player state at the moment a sample arrives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalPlayback {
    /// Local position in seconds.
    pub current_time: f64,
    /// Whether the local player is paused.
    pub paused: bool,
}

/// Play/pause change needed to match the master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Start local playback.
    Resume,
    /// Stop local playback.
    Pause,
}

/// Corrections to apply for one sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Correction {
    /// Position to jump to, when drift exceeded the threshold.
    pub seek_to: Option<f64>,
    /// Play state change, when local and master disagree.
    pub transport: Option<Transport>,
}

impl Correction {
    /// Whether nothing needs to change.
    pub fn is_noop(&self) -> bool {
        self.seek_to.is_none() && self.transport.is_none()
    }
}

/// Absolute distance between local and sampled positions.
pub fn drift(local_time: f64, sample_time: f64) -> f64 {
    (local_time - sample_time).abs()
}

/// Decide how a follower should react to `sample`.
///
/// A sample with a non-finite position never triggers a seek.
pub fn reconcile(local: LocalPlayback, sample: &SyncSample, threshold_secs: f64) -> Correction {
    let seek_to = (sample.current_time.is_finite()
        && drift(local.current_time, sample.current_time) > threshold_secs)
        .then_some(sample.current_time);

    let transport = match (local.paused, sample.is_playing) {
        (true, true) => Some(Transport::Resume),
        (false, false) => Some(Transport::Pause),
        _ => None,
    };

    Correction { seek_to, transport }
}
