//! Traced-flow records: a trace context bound to a carrier until its
//! response arrives or its unblocker fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use serde::Serialize;

use crate::flowtrack::carrier::FlowCarrier;
use crate::flowtrack::flow_id::StreamId;

/// Immutable trace identity carried by a request or response segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub stream_id: StreamId,
}

/// Binding of a trace context to a carrier.
///
/// The response path and the timed unblocker race over `is_active`; the one
/// that wins the true-to-false transition owns the latch token and the
/// other side becomes a no-op.
pub(crate) struct TracedFlow {
    /// Non-owning back-reference; the carrier outlives its traced flows.
    pub(crate) carrier: Weak<FlowCarrier>,
    pub(crate) ts: TraceContext,
    is_active: AtomicBool,
}

impl TracedFlow {
    pub(crate) fn new(carrier: Weak<FlowCarrier>, ts: TraceContext) -> Self {
        TracedFlow {
            carrier,
            ts,
            is_active: AtomicBool::new(true),
        }
    }

    /// Builds a record that is already deactivated, for responses observed
    /// before their request. It resolves lookups but holds no latch token
    /// and never needs an unblocker.
    pub(crate) fn settled(carrier: Weak<FlowCarrier>, ts: TraceContext) -> Self {
        TracedFlow {
            carrier,
            ts,
            is_active: AtomicBool::new(false),
        }
    }

    /// Returns `true` for the single caller that wins the deactivation race.
    pub(crate) fn deactivate(&self) -> bool {
        self.is_active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deactivation_wins_once() {
        let traced = TracedFlow::new(
            Weak::new(),
            TraceContext {
                trace_id: "trace-1".into(),
                span_id: "span-1".into(),
                stream_id: StreamId(1),
            },
        );
        assert!(traced.deactivate());
        assert!(!traced.deactivate());
    }

    #[test]
    fn settled_record_is_never_active() {
        let traced = TracedFlow::settled(
            Weak::new(),
            TraceContext {
                trace_id: "trace-2".into(),
                span_id: "span-2".into(),
                stream_id: StreamId(1),
            },
        );
        assert!(!traced.deactivate());
    }
}
