//! Flow state management.
//!
//! Translator workers serialize on a per-flow mutex through [`FlowMutex`]:
//! `lock` hands back an exclusive [`FlowHandle`], the worker mutates
//! correlated state through it, and exactly one `unlock*` variant releases
//! the flow. Termination segments additionally wait for every pending
//! trace-bearing segment on the flow before they may acquire the mutex, so
//! teardown can never outrun the requests it would orphan.

mod carrier;
mod debug;
pub mod flow_id;
mod handle;
mod index;
mod reaper;
pub mod registry;
pub mod segment;
mod stats;
mod timer;
mod traced;
mod waitgroup;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::json;

use self::carrier::FlowCarrier;
use self::debug::DebugLog;
use self::flow_id::FlowId;
use self::segment::SegmentContext;
use self::timer::TimerQueue;
use self::traced::TracedFlow;
use crate::config::FlowTrackConfig;
use crate::protocols::tcp;
use crate::shutdown::ShutdownToken;

pub use self::handle::FlowHandle;
pub use self::index::TraceIndex;
pub use self::registry::TraceRegistry;
pub use self::stats::FlowTrackStats;
pub use self::traced::TraceContext;

/// Shared engine state. Carriers, the trace index, and the registry are
/// reachable from worker handles, timer callbacks, and the reaper alike.
pub(crate) struct FlowTrackInner {
    pub(crate) config: FlowTrackConfig,
    pub(crate) token: ShutdownToken,
    /// Lazily created per-flow carriers.
    pub(crate) carriers: DashMap<FlowId, Arc<FlowCarrier>>,
    pub(crate) index: Arc<TraceIndex>,
    pub(crate) registry: Arc<TraceRegistry>,
    pub(crate) timers: TimerQueue,
    pub(crate) stats: FlowTrackStats,
    pub(crate) debug: DebugLog,
}

impl FlowTrackInner {
    /// Serializes the caller on the segment's flow.
    pub(crate) fn lock(self: &Arc<Self>, segment: SegmentContext) -> FlowHandle {
        let carrier = Arc::clone(
            self.carriers
                .entry(segment.flow_id)
                .or_insert_with(|| {
                    Arc::new(FlowCarrier::new(segment.serial.clone(), segment.flow_id))
                })
                .value(),
        );

        // Termination segments yield to in-flight trace-bearing segments
        // before contending for the mutex. Waiting after acquisition would
        // deadlock against the requests those segments still have to add.
        if tcp::is_termination(segment.flags) {
            self.debug
                .emit(&segment, "waiting", json!({ "pending": carrier.wg.count() }));
            carrier.wg.wait(&self.token);
            self.debug.emit(&segment, "continue", json!({}));
        }

        let mut guard = carrier.state.lock_arc();
        guard.last_locked_at = Some(Instant::now());
        self.stats.locks.fetch_add(1, Ordering::Relaxed);

        FlowHandle {
            inner: Arc::clone(self),
            carrier,
            guard,
            segment,
            locked_at: Instant::now(),
        }
    }

    /// Binds `ts` to the carrier and installs it in the trace index, with a
    /// one-shot unblocker that releases the latch token if no response
    /// deactivates the record within the tracking deadline.
    pub(crate) fn track_connection(
        self: &Arc<Self>,
        carrier: &Arc<FlowCarrier>,
        segment: &SegmentContext,
        ts: TraceContext,
    ) -> Arc<TracedFlow> {
        let stream_id = ts.stream_id;
        let trace_id = ts.trace_id.clone();
        let traced = Arc::new(TracedFlow::new(Arc::downgrade(carrier), ts));

        let unblocker = {
            let traced = Arc::clone(&traced);
            let engine = Arc::downgrade(self);
            let serial = segment.serial.clone();
            let flow_id = segment.flow_id;
            move || {
                if !traced.deactivate() {
                    // The response path won; nothing to release.
                    return;
                }
                let Some(inner) = engine.upgrade() else {
                    return;
                };
                inner.debug.emit_flow(
                    &serial,
                    flow_id,
                    &format!("unblocking/{}", traced.ts.trace_id),
                    json!({ "stream": traced.ts.stream_id }),
                );
                if let Some(carrier) = traced.carrier.upgrade() {
                    let _state = carrier.state.lock();
                    // Symmetric with the request path: a token was added when
                    // the counter left zero going up, so release one unless
                    // the counter was already negative.
                    if carrier.active_requests.fetch_sub(1, Ordering::SeqCst) >= 0 {
                        carrier.wg.done();
                    }
                }
                inner.stats.unblocked.fetch_add(1, Ordering::Relaxed);
                inner.debug.emit_flow(
                    &serial,
                    flow_id,
                    &format!("unblocked/{}", traced.ts.trace_id),
                    json!({ "stream": traced.ts.stream_id }),
                );
            }
        };
        self.timers
            .schedule(self.config.tracking_deadline(), unblocker);

        self.index
            .insert(segment.flow_id, stream_id, segment.ref_seq(), Arc::clone(&traced));
        self.stats.tracked.fetch_add(1, Ordering::Relaxed);
        self.debug.emit(
            segment,
            &format!("tracking/{trace_id}"),
            json!({ "stream": stream_id }),
        );
        traced
    }

    /// Tears down all state for `flow_id`. Panic-isolated so one corrupt
    /// flow cannot take down the engine.
    pub(crate) fn untrack(&self, flow_id: FlowId) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.untrack_flow(flow_id)));
        if let Err(panic) = result {
            if self.debug.enabled() {
                log::error!("panic while untracking flow '{}': {:?}", flow_id, panic);
            }
        }
    }

    fn untrack_flow(&self, flow_id: FlowId) {
        let carrier = self
            .carriers
            .get(&flow_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(carrier) = &carrier {
            self.debug.emit_flow(
                &carrier.serial,
                flow_id,
                "untracking",
                json!({
                    "active_requests": carrier.active_requests.load(Ordering::SeqCst),
                    "age_ms": carrier.created_at.elapsed().as_millis() as u64,
                }),
            );
        }

        if let Some(streams) = self.index.remove_flow(flow_id) {
            for stream in streams.iter() {
                for traced in stream.value().values() {
                    traced.deactivate();
                    self.registry.remove(&traced.ts.trace_id);
                }
            }
            streams.clear();
        }

        if let Some(carrier) = carrier {
            // Drain any latch tokens still held by requests that will never
            // be answered.
            while carrier.active_requests.load(Ordering::SeqCst) > 0 {
                carrier.active_requests.fetch_sub(1, Ordering::SeqCst);
                carrier.wg.done();
            }
            self.carriers.remove(&flow_id);
            self.stats.untracked.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Serializes all operations touching one flow and correlates HTTP traces
/// across the flow's streams.
///
/// One `FlowMutex` is shared by all translator workers. It owns two
/// background threads: a timer thread firing unblockers and deferred
/// teardown, and a reaper evicting idle carriers.
pub struct FlowMutex {
    inner: Arc<FlowTrackInner>,
    reaper: Option<JoinHandle<()>>,
}

impl FlowMutex {
    /// Creates the engine and starts its background threads. The index and
    /// registry are shared with the surrounding transformer, which reads
    /// them from its own decode paths.
    pub fn new(
        token: ShutdownToken,
        config: FlowTrackConfig,
        index: Arc<TraceIndex>,
        registry: Arc<TraceRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let debug = DebugLog::new(config.debug);
        let timers = TimerQueue::start(token.clone());
        let inner = Arc::new(FlowTrackInner {
            config,
            token,
            carriers: DashMap::new(),
            index,
            registry,
            timers,
            stats: FlowTrackStats::new(),
            debug,
        });
        let reaper = reaper::spawn(&inner);
        Ok(FlowMutex {
            inner,
            reaper: Some(reaper),
        })
    }

    /// Serializes the caller on the segment's flow and returns the exclusive
    /// handle for it. Termination segments first wait for in-flight
    /// trace-bearing segments, honoring cancellation.
    pub fn lock(&self, segment: SegmentContext) -> FlowHandle {
        self.inner.lock(segment)
    }

    /// Engine activity counters.
    pub fn stats(&self) -> &FlowTrackStats {
        &self.inner.stats
    }

    /// Untracks every remaining flow.
    pub fn drain(&self) {
        log::info!("Draining flow table");
        let flow_ids: Vec<FlowId> = self.inner.carriers.iter().map(|entry| *entry.key()).collect();
        for flow_id in flow_ids {
            self.inner.untrack(flow_id);
        }
    }

    /// Cancels the engine's token, joins the background threads, and drains
    /// whatever flows remain.
    pub fn shutdown(mut self) {
        self.inner.token.cancel();
        if let Some(handle) = self.reaper.take() {
            let _ = handle.join();
        }
        self.inner.timers.join();
        self.drain();
    }
}
