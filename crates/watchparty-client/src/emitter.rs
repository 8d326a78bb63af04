//! Master-side periodic sync broadcaster.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use watchparty_core::drift::DEFAULT_SYNC_INTERVAL_MS;
use watchparty_core::{ClientMessage, SyncSample};
use watchparty_settings::SyncSettings;

/// Emits `party:sync` frames on a fixed period.
///
/// Each tick asks a sample source for the current state; `None` skips the
/// tick (not master, or no movie open). A full outbound queue also skips the
/// tick, since the next sample supersedes it.
pub struct SyncEmitter {
    period: Duration,
    cancel: CancellationToken,
}

impl SyncEmitter {
    /// Emitter with the given period.
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        Self { period, cancel }
    }

    /// Emitter with the default one-second period.
    pub fn with_default_period(cancel: CancellationToken) -> Self {
        Self::new(Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS), cancel)
    }

    /// Emitter using the `sync.intervalMs` setting.
    pub fn from_settings(sync: &SyncSettings, cancel: CancellationToken) -> Self {
        Self::new(Duration::from_millis(sync.interval_ms), cancel)
    }

    /// Sampling period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start emitting into `tx` until cancelled or the receiver is dropped.
    pub fn spawn<F>(self, mut source: F, tx: mpsc::Sender<ClientMessage>) -> JoinHandle<()>
    where
        F: FnMut() -> Option<SyncSample> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // skip the immediate first tick
            let _ = ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(sample) = source() else { continue };
                        match tx.try_send(ClientMessage::Sync(sample)) {
                            Ok(()) => trace!(current_time = sample.current_time, "sync sample queued"),
                            Err(TrySendError::Full(_)) => debug!("outbound queue full, sample skipped"),
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                    () = self.cancel.cancelled() => break,
                }
            }
            debug!("sync emitter stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sample(t: f64) -> SyncSample {
        SyncSample {
            is_playing: true,
            current_time: t,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_once_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let mut t = 0.0;
        let handle = SyncEmitter::with_default_period(cancel.clone()).spawn(
            move || {
                t += 1.0;
                Some(sample(t))
            },
            tx,
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut got = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            got.push(msg);
        }
        assert_eq!(
            got,
            vec![
                ClientMessage::Sync(sample(1.0)),
                ClientMessage::Sync(sample(2.0)),
                ClientMessage::Sync(sample(3.0)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skips_ticks_without_sample() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let master = Arc::new(AtomicBool::new(false));
        let flag = master.clone();
        let handle = SyncEmitter::new(Duration::from_millis(100), cancel.clone()).spawn(
            move || flag.load(Ordering::Relaxed).then(|| sample(5.0)),
            tx,
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(rx.try_recv().is_err());

        master.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::Sync(sample(5.0)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let handle = SyncEmitter::new(Duration::from_millis(10), CancellationToken::new())
            .spawn(|| Some(sample(1.0)), tx);
        handle.await.unwrap();
    }

    #[test]
    fn period_follows_sync_settings() {
        let sync = SyncSettings {
            interval_ms: 250,
            ..SyncSettings::default()
        };
        let emitter = SyncEmitter::from_settings(&sync, CancellationToken::new());
        assert_eq!(emitter.period(), Duration::from_millis(250));
    }

    #[test]
    fn default_period_is_one_second() {
        let emitter = SyncEmitter::with_default_period(CancellationToken::new());
        assert_eq!(emitter.period(), Duration::from_secs(1));
    }
}
