//! Background eviction of idle flows.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{tick, RecvTimeoutError};
use serde_json::json;

use crate::flowtrack::flow_id::FlowId;
use crate::flowtrack::FlowTrackInner;
use crate::shutdown::ShutdownToken;

/// How often the sleeping loop re-checks for cancellation.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Starts the reaper thread. It sweeps the carrier table once per carrier
/// deadline and exits when the token is cancelled or the engine is dropped.
pub(crate) fn spawn(inner: &Arc<FlowTrackInner>) -> JoinHandle<()> {
    let period = inner.config.carrier_deadline();
    let token = inner.token.clone();
    let engine = Arc::downgrade(inner);
    thread::spawn(move || run(engine, period, token))
}

fn run(engine: Weak<FlowTrackInner>, period: Duration, token: ShutdownToken) {
    let ticker = tick(period);
    loop {
        if token.is_cancelled() {
            return;
        }
        match ticker.recv_timeout(SHUTDOWN_POLL) {
            Ok(_) => {
                let Some(inner) = engine.upgrade() else {
                    return;
                };
                sweep(&inner);
            }
            Err(RecvTimeoutError::Timeout) => {
                if engine.upgrade().is_none() {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// One pass over the carrier table.
fn sweep(inner: &Arc<FlowTrackInner>) {
    let deadline = inner.config.carrier_deadline();
    let flow_ids: Vec<FlowId> = inner.carriers.iter().map(|entry| *entry.key()).collect();
    let mut reaped = 0usize;

    for flow_id in flow_ids {
        let Some(carrier) = inner
            .carriers
            .get(&flow_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            continue;
        };
        // An operation in flight keeps the carrier alive until the next pass.
        let Some(state) = carrier.state.try_lock() else {
            continue;
        };
        let Some(last_unlocked) = state.last_unlocked_at else {
            continue;
        };
        let idle = last_unlocked.elapsed();
        if idle >= deadline {
            inner.debug.emit_flow(
                &carrier.serial,
                flow_id,
                &format!("reaped flow '{}' after {:?}", flow_id, idle),
                json!({ "idle_ms": idle.as_millis() as u64 }),
            );
            inner.untrack(flow_id);
            inner.stats.reaped.fetch_add(1, Ordering::Relaxed);
            reaped += 1;
        }
    }

    if reaped > 0 {
        log::debug!("reaper evicted {} idle flows", reaped);
    }
}
