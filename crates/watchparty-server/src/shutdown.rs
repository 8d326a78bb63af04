//! Server lifecycle: one cancellation root plus the background tasks that
//! must finish before the process exits.
//!
//! The HTTP listener and the party hub register their `JoinHandle`s here.
//! WebSocket sessions are not tracked individually; they hang off
//! [`ShutdownCoordinator::session_token`] and end when the listener drains.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancellation root and tracked background tasks of one server.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// Coordinator with nothing tracked yet.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Root token; cancelled by [`shutdown`](Self::shutdown).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for one WebSocket session. Cancelling it closes only that session.
    pub fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Track a background task under `name` until [`drain`](Self::drain).
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        debug!(task = name, "tracking background task");
        self.tasks.lock().push((name, handle));
    }

    /// Number of tracked tasks not yet drained.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel the root token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait for every tracked task until `timeout` elapses.
    ///
    /// Tasks still running at the deadline are aborted. Returns their names.
    pub async fn drain(&self, timeout: Duration) -> Vec<&'static str> {
        self.shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(tasks = tasks.len(), ?timeout, "draining server tasks");

        let deadline = tokio::time::Instant::now() + timeout;
        let mut stuck = Vec::new();
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "task finished"),
                Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    handle.abort();
                    stuck.push(name);
                }
            }
        }
        stuck
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn session_token_follows_root_but_not_back() {
        let coord = ShutdownCoordinator::new();
        let session = coord.session_token();
        session.cancel();
        assert!(!coord.is_shutting_down());

        let other = coord.session_token();
        coord.shutdown();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        for name in ["http", "hub"] {
            let token = coord.token();
            coord.track(name, tokio::spawn(async move { token.cancelled().await }));
        }
        assert_eq!(coord.tracked(), 2);

        let stuck = coord.drain(Duration::from_secs(5)).await;
        assert!(stuck.is_empty());
        assert_eq!(coord.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_names_and_aborts_stuck_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("hub", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "http",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(300)).await;
            }),
        );

        let stuck = coord.drain(Duration::from_millis(100)).await;
        assert_eq!(stuck, vec!["http"]);
    }

    #[tokio::test]
    async fn drain_with_nothing_tracked_only_cancels() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.drain(Duration::from_millis(10)).await.is_empty());
        assert!(coord.is_shutting_down());
    }
}
