//! Cooperative shutdown signaling.
//!
//! Every suspension point in the engine polls a shared [`ShutdownToken`]:
//! latch waits short-circuit, deferred teardown runs immediately, and the
//! background threads exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared between the engine, its background
/// threads, and the surrounding transformer.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Creates a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to all clones of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
