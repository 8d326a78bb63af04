//! Local media player seam.

use watchparty_core::{Movie, Subtitle};
use watchparty_core::drift::LocalPlayback;

/// The local player a client drives.
///
/// Implementations wrap whatever actually renders video. All calls are
/// synchronous and expected to be cheap.
pub trait Player: Send {
    /// Whether a movie is loaded and the player is open.
    fn is_loaded(&self) -> bool;
    /// Current position in seconds.
    fn current_time(&self) -> f64;
    /// Whether playback is paused.
    fn is_paused(&self) -> bool;
    /// Start playback.
    fn play(&mut self);
    /// Pause playback.
    fn pause(&mut self);
    /// Jump to `time` seconds.
    fn seek(&mut self, time: f64);
    /// Open `movie`, replacing anything loaded.
    fn load(&mut self, movie: &Movie);
    /// Select a subtitle track, or none.
    fn set_subtitle(&mut self, subtitle: Option<&Subtitle>);

    /// Snapshot for drift reconciliation.
    fn playback(&self) -> LocalPlayback {
        LocalPlayback {
            current_time: self.current_time(),
            paused: self.is_paused(),
        }
    }
}
