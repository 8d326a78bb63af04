//! Connection admission: a fixed number of WebSocket slots.
//!
//! A slot is reserved before the upgrade and released when its
//! [`ConnectionSlot`] drops, whether the upgrade failed or the session ended.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared slot counter.
#[derive(Clone, Debug)]
pub struct Admission {
    max: usize,
    active: Arc<AtomicUsize>,
}

impl Admission {
    /// Admission with room for `max` concurrent connections.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserve a slot, or `None` when all are taken.
    pub fn try_acquire(&self) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot {
                active: self.active.clone(),
            })
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Configured limit.
    pub fn limit(&self) -> usize {
        self.max
    }
}

/// A reserved connection slot.
#[derive(Debug)]
pub struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
