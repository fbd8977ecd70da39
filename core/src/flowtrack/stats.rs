//! Counters for engine activity.
//!
//! Nothing in the engine is surfaced to callers beyond the unlock return
//! tuples; these counters are how the surrounding transformer observes what
//! the core has been doing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters covering each stage of flow tracking.
#[derive(Default)]
pub struct FlowTrackStats {
    /// Number of lock acquisitions.
    pub locks: AtomicU64,

    /// Requests that installed tracking state.
    pub tracked: AtomicU64,

    /// Responses matched against a pending request.
    pub matched: AtomicU64,

    /// Unblockers that fired before a response arrived.
    pub unblocked: AtomicU64,

    /// Flows fully untracked.
    pub untracked: AtomicU64,

    /// Flows evicted by the reaper.
    pub reaped: AtomicU64,
}

impl FlowTrackStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_locks(&self) -> u64 {
        self.locks.load(Ordering::Relaxed)
    }

    pub fn get_tracked(&self) -> u64 {
        self.tracked.load(Ordering::Relaxed)
    }

    pub fn get_matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn get_unblocked(&self) -> u64 {
        self.unblocked.load(Ordering::Relaxed)
    }

    pub fn get_untracked(&self) -> u64 {
        self.untracked.load(Ordering::Relaxed)
    }

    pub fn get_reaped(&self) -> u64 {
        self.reaped.load(Ordering::Relaxed)
    }
}

impl fmt::Display for FlowTrackStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Locks: {}\nTracked: {}\nMatched: {}\nUnblocked: {}\nUntracked: {}\nReaped: {}",
            self.get_locks(),
            self.get_tracked(),
            self.get_matched(),
            self.get_unblocked(),
            self.get_untracked(),
            self.get_reaped(),
        )
    }
}
