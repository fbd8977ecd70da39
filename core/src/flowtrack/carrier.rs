//! Per-flow carrier state.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::flowtrack::flow_id::{FlowId, PacketSerial};
use crate::flowtrack::waitgroup::WaitGroup;

/// Mutable per-flow fields guarded by the carrier mutex.
#[derive(Debug, Default)]
pub(crate) struct CarrierState {
    /// Set on the first trace-correlated unlock.
    pub(crate) is_http2: bool,
    pub(crate) last_locked_at: Option<Instant>,
    pub(crate) last_unlocked_at: Option<Instant>,
}

/// Per-flow mutable state plus the mutex serializing all operations on the
/// flow. A carrier is created lazily by the first lock of a flow and lives
/// until a terminating unlock tears it down or the reaper evicts it.
pub(crate) struct FlowCarrier {
    /// Guards the carrier fields and the index subtree for `flow_id`.
    pub(crate) state: Arc<Mutex<CarrierState>>,
    /// One token per pending request; gates termination segments.
    pub(crate) wg: WaitGroup,
    /// Requests seen minus responses matched. May transiently go negative
    /// when responses outrun their requests.
    pub(crate) active_requests: AtomicI64,
    /// Flips once; the winner performs untracking.
    released: AtomicBool,
    pub(crate) created_at: Instant,
    /// Identity of the packet that created the carrier.
    pub(crate) serial: PacketSerial,
    pub(crate) flow_id: FlowId,
}

impl FlowCarrier {
    pub(crate) fn new(serial: PacketSerial, flow_id: FlowId) -> Self {
        FlowCarrier {
            state: Arc::new(Mutex::new(CarrierState::default())),
            wg: WaitGroup::new(),
            active_requests: AtomicI64::new(0),
            released: AtomicBool::new(false),
            created_at: Instant::now(),
            serial,
            flow_id,
        }
    }

    /// Returns `true` exactly once, for the caller that wins the release
    /// race. Release requires that no requests are pending, unless
    /// `force` promotes teardown regardless of the counter.
    pub(crate) fn try_release(&self, force: bool) -> bool {
        (force || self.active_requests.load(Ordering::SeqCst) == 0)
            && self
                .released
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier() -> FlowCarrier {
        FlowCarrier::new(
            PacketSerial {
                id: 1,
                ctx: "test".into(),
                num: 1,
            },
            FlowId(1),
        )
    }

    #[test]
    fn release_wins_once() {
        let carrier = carrier();
        assert!(carrier.try_release(false));
        assert!(!carrier.try_release(false));
        assert!(!carrier.try_release(true));
    }

    #[test]
    fn release_blocked_by_pending_requests() {
        let carrier = carrier();
        carrier.active_requests.store(1, Ordering::SeqCst);
        assert!(!carrier.try_release(false));
        // Promoted teardown ignores the counter.
        assert!(carrier.try_release(true));
    }
}
