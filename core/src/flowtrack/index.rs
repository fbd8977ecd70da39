//! Three-level trace index: flow, then stream, then ordered sequence keys.
//!
//! The two outer levels are concurrent maps safe for get-or-compute and
//! deletion without external locks. Entries under one flow are only mutated
//! while holding that flow's carrier mutex, or during teardown after the
//! subtree has been detached.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::flowtrack::flow_id::{FlowId, StreamId};
use crate::flowtrack::traced::TracedFlow;

pub(crate) type StreamTable = DashMap<StreamId, BTreeMap<u32, Arc<TracedFlow>>>;

/// Index of the traced flows currently known per flow and stream.
///
/// HTTP/1.1 is not multiplexed, so the trace in effect for a packet is the
/// one established at the greatest sequence boundary not exceeding the
/// packet's reference sequence; [`TraceIndex::find`] implements exactly that
/// lookup, tolerating 32-bit sequence wrap-around.
#[derive(Default)]
pub struct TraceIndex {
    flows: DashMap<FlowId, Arc<StreamTable>>,
}

impl TraceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `traced` at `seq` under (`flow_id`, `stream_id`). Each level
    /// is get-or-computed so concurrent first-touches collapse to one
    /// installation.
    pub(crate) fn insert(
        &self,
        flow_id: FlowId,
        stream_id: StreamId,
        seq: u32,
        traced: Arc<TracedFlow>,
    ) {
        let streams = Arc::clone(&*self.flows.entry(flow_id).or_default());
        streams.entry(stream_id).or_default().insert(seq, traced);
    }

    /// Most recent traced flow at a sequence boundary strictly before
    /// `ref_seq` on the stream. When no key precedes `ref_seq` the last
    /// entry is returned instead, which is the correct continuation across
    /// a 32-bit sequence wrap.
    pub(crate) fn find(
        &self,
        flow_id: FlowId,
        stream_id: StreamId,
        ref_seq: u32,
    ) -> Option<Arc<TracedFlow>> {
        let streams = Arc::clone(&*self.flows.get(&flow_id)?);
        let seqs = streams.get(&stream_id)?;
        let before = seqs
            .range(..ref_seq)
            .next_back()
            .map(|(_, traced)| Arc::clone(traced));
        let last = seqs
            .iter()
            .next_back()
            .map(|(_, traced)| Arc::clone(traced));
        before.or(last)
    }

    /// Detaches and returns the whole subtree for `flow_id`.
    pub(crate) fn remove_flow(&self, flow_id: FlowId) -> Option<Arc<StreamTable>> {
        self.flows.remove(&flow_id).map(|(_, streams)| streams)
    }

    pub(crate) fn has_flow(&self, flow_id: FlowId) -> bool {
        self.flows.contains_key(&flow_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowtrack::traced::TraceContext;
    use std::sync::Weak;

    fn traced(trace_id: &str, stream_id: StreamId) -> Arc<TracedFlow> {
        Arc::new(TracedFlow::new(
            Weak::new(),
            TraceContext {
                trace_id: trace_id.into(),
                span_id: format!("span-{trace_id}"),
                stream_id,
            },
        ))
    }

    #[test]
    fn monotone_lookup_takes_greatest_preceding_key() {
        let index = TraceIndex::new();
        let flow = FlowId(1);
        let stream = StreamId(10);
        for (seq, id) in [(100u32, "t100"), (200, "t200"), (300, "t300")] {
            index.insert(flow, stream, seq, traced(id, stream));
        }

        let found = index.find(flow, stream, 250).unwrap();
        assert_eq!(found.ts.trace_id, "t200");

        // An exact key match is not "preceding"; 200 resolves to 100.
        let found = index.find(flow, stream, 200).unwrap();
        assert_eq!(found.ts.trace_id, "t100");
    }

    #[test]
    fn wrapped_lookup_falls_back_to_last_entry() {
        let index = TraceIndex::new();
        let flow = FlowId(2);
        let stream = StreamId(10);
        index.insert(flow, stream, 0xFFFF_FFF0, traced("high", stream));
        index.insert(flow, stream, 0x0000_0010, traced("low", stream));

        // No key precedes 5; the traversal's last entry wins.
        let found = index.find(flow, stream, 0x0000_0005).unwrap();
        assert_eq!(found.ts.trace_id, "high");
    }

    #[test]
    fn missing_levels_return_none() {
        let index = TraceIndex::new();
        assert!(index.find(FlowId(9), StreamId(1), 100).is_none());

        index.insert(FlowId(9), StreamId(1), 10, traced("t", StreamId(1)));
        assert!(index.find(FlowId(9), StreamId(2), 100).is_none());
        assert!(index.find(FlowId(8), StreamId(1), 100).is_none());
    }

    #[test]
    fn remove_flow_detaches_subtree() {
        let index = TraceIndex::new();
        let flow = FlowId(3);
        index.insert(flow, StreamId(1), 10, traced("t", StreamId(1)));
        assert!(index.has_flow(flow));

        let streams = index.remove_flow(flow).unwrap();
        assert!(!index.has_flow(flow));
        assert_eq!(streams.len(), 1);
        assert!(index.remove_flow(flow).is_none());
    }
}
