//! Identity-guarded cancellable deadline timers, one per armed restriction.
//! Same generation-counter trick as `signal::SignalQualityMonitor`'s
//! debounce: a fresh arm bumps the generation so a stale fire is ignored
//! instead of racing the restriction map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity minted on arm and compared on fire. Two distinct identities for
/// the same `(transport, type)` can coexist in flight only until the older
/// one's timer checks its generation and finds itself superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Clone, Default)]
pub struct TimerGuard {
    generation: Arc<AtomicU64>,
}

impl TimerId {
    /// The raw identity, for carrying a [`TimerId`] across the wire-event
    /// boundary (`qns_events::RestrictionTimerFired`) and back.
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        TimerId(raw)
    }
}

impl TimerGuard {
    /// Mints a new identity, invalidating any previously minted one.
    pub fn arm(&self) -> TimerId {
        TimerId(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, id: TimerId) -> bool {
        self.generation.load(Ordering::SeqCst) == id.0
    }

    /// Invalidates the current identity without minting a new one, so any
    /// in-flight timer finds itself superseded.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_invalidates_the_previous_identity() {
        let guard = TimerGuard::default();
        let first = guard.arm();
        let second = guard.arm();
        assert!(!guard.is_current(first));
        assert!(guard.is_current(second));
    }

    #[test]
    fn cancel_invalidates_the_armed_identity() {
        let guard = TimerGuard::default();
        let id = guard.arm();
        guard.cancel();
        assert!(!guard.is_current(id));
    }
}
