//! Lock handles returned to translator workers.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use serde_json::json;

use crate::flowtrack::carrier::{CarrierState, FlowCarrier};
use crate::flowtrack::flow_id::StreamId;
use crate::flowtrack::segment::SegmentContext;
use crate::flowtrack::traced::{TraceContext, TracedFlow};
use crate::flowtrack::FlowTrackInner;
use crate::protocols::tcp;

pub(crate) type StateGuard = ArcMutexGuard<RawMutex, CarrierState>;

/// Exclusive handle on one flow.
///
/// Exactly one `unlock*` variant must be invoked per lock; each consumes the
/// handle and releases the carrier mutex. Every variant returns the time the
/// flow was held.
pub struct FlowHandle {
    pub(crate) inner: Arc<FlowTrackInner>,
    pub(crate) carrier: Arc<FlowCarrier>,
    pub(crate) guard: StateGuard,
    pub(crate) segment: SegmentContext,
    pub(crate) locked_at: Instant,
}

impl FlowHandle {
    /// Whether a trace-correlated unlock has marked this flow as HTTP/2.
    pub fn is_http2(&self) -> bool {
        self.guard.is_http2
    }

    /// Trace context in effect for `stream_id` as of this segment's
    /// reference sequence.
    pub fn trace_lookup(&self, stream_id: StreamId) -> Option<TraceContext> {
        self.inner
            .index
            .find(self.segment.flow_id, stream_id, self.segment.ref_seq())
            .map(|traced| traced.ts.clone())
    }

    /// Releases the flow with the flags the segment was locked with.
    pub fn unlock(self) -> (bool, Duration) {
        let flags = self.segment.flags;
        self.unlock_with_flags(flags)
    }

    /// Releases the flow; termination flags divert to
    /// [`FlowHandle::unlock_and_release`].
    pub fn unlock_with_flags(self, flags: u8) -> (bool, Duration) {
        if tcp::is_termination(flags) {
            return self.unlock_and_release();
        }
        (false, self.finish())
    }

    /// Terminating release. At most one caller per flow wins; the winner
    /// schedules teardown one tracking deadline out, or runs it immediately
    /// under cancellation.
    pub fn unlock_and_release(self) -> (bool, Duration) {
        let inner = Arc::clone(&self.inner);
        let flow_id = self.segment.flow_id;
        let cancelled = inner.token.is_cancelled();
        let winner = self.carrier.try_release(cancelled);
        let latency = self.finish();
        if winner {
            if cancelled {
                inner.untrack(flow_id);
            } else {
                let deferred = Arc::downgrade(&inner);
                inner
                    .timers
                    .schedule(inner.config.tracking_deadline(), move || {
                        if let Some(inner) = deferred.upgrade() {
                            inner.untrack(flow_id);
                        }
                    });
            }
        }
        (winner, latency)
    }

    /// Trace-correlated release: accounts the segment's request and response
    /// streams against the flow, then unlocks with `flags`. Returns the
    /// pending-request count after accounting.
    pub fn unlock_with_trace_and_span(
        mut self,
        flags: u8,
        is_http2: bool,
        request_streams: &[StreamId],
        response_streams: &[StreamId],
        request_ts: &HashMap<StreamId, TraceContext>,
        response_ts: &HashMap<StreamId, TraceContext>,
    ) -> (i64, Duration) {
        // Segments that open or close the connection never install tracking
        // state; report the counter and fall through.
        if tcp::is_syn_fin_rst(self.segment.flags) {
            let active = self.carrier.active_requests.load(Ordering::SeqCst);
            let (_, latency) = self.unlock_with_flags(flags);
            return (active, latency);
        }

        self.guard.is_http2 = is_http2;

        for stream_id in request_streams {
            if let Some(ts) = request_ts.get(stream_id) {
                self.track_request(*stream_id, ts.clone());
            }
        }
        for stream_id in response_streams {
            if let Some(ts) = response_ts.get(stream_id) {
                self.match_response(*stream_id, ts);
            }
        }

        let active = self.carrier.active_requests.load(Ordering::SeqCst);
        let (_, latency) = self.unlock_with_flags(flags);
        (active, latency)
    }

    fn track_request(&self, stream_id: StreamId, ts: TraceContext) {
        let trace_id = ts.trace_id.clone();
        let traced = self
            .inner
            .track_connection(&self.carrier, &self.segment, ts);
        let active = self.carrier.active_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if active > 0 {
            self.carrier.wg.add(1);
            self.inner.debug.emit(
                &self.segment,
                &format!("request/{trace_id}"),
                json!({ "stream": stream_id, "active_requests": active }),
            );
        } else if traced.deactivate() {
            // A response already ran the counter negative; the pairing is
            // settled and the unblocker must never fire.
            self.inner.debug.emit(
                &self.segment,
                &format!("request/{trace_id}"),
                json!({ "stream": stream_id, "active_requests": active, "settled": true }),
            );
        }
    }

    fn match_response(&self, stream_id: StreamId, ts: &TraceContext) {
        let found = self
            .inner
            .index
            .find(self.segment.flow_id, stream_id, self.segment.ref_seq());
        match found {
            Some(traced) if traced.ts.trace_id == ts.trace_id => {
                // Losing the deactivation race means the unblocker already
                // drained the token; nothing left to account.
                if traced.deactivate() {
                    let active = self.carrier.active_requests.fetch_sub(1, Ordering::SeqCst) - 1;
                    self.carrier.wg.done();
                    self.inner.stats.matched.fetch_add(1, Ordering::Relaxed);
                    self.inner.debug.emit(
                        &self.segment,
                        &format!("response/{}", ts.trace_id),
                        json!({ "stream": stream_id, "active_requests": active }),
                    );
                }
            }
            // A different trace is in effect on the stream; leave it alone.
            Some(_) => {}
            None => {
                // Translator reordering: the response outran its request.
                // Account it and install a settled record so later segments
                // on the stream still resolve the trace and the late request
                // pairs against the negative counter instead of re-arming.
                // No unblocker: there is no token to release.
                let active = self.carrier.active_requests.fetch_sub(1, Ordering::SeqCst) - 1;
                let traced = Arc::new(TracedFlow::settled(
                    Arc::downgrade(&self.carrier),
                    ts.clone(),
                ));
                self.inner.index.insert(
                    self.segment.flow_id,
                    stream_id,
                    self.segment.ref_seq(),
                    traced,
                );
                self.inner.debug.emit(
                    &self.segment,
                    &format!("response/{}", ts.trace_id),
                    json!({ "stream": stream_id, "active_requests": active, "unmatched": true }),
                );
            }
        }
    }

    /// Stamps the unlock time and releases the mutex.
    fn finish(mut self) -> Duration {
        self.guard.last_unlocked_at = Some(Instant::now());
        self.locked_at.elapsed()
    }
}
