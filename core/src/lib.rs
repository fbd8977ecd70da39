//! Per-flow serialization and trace tracking for a packet-capture transformer.
//!
//! Translated TCP segments arrive out of order from a parallel pool of
//! translator workers. This crate turns that concurrent stream into a totally
//! ordered, trace-correlated view of the HTTP/1.1 and HTTP/2 conversations
//! living on each flow:
//!
//! - All operations touching the mutable state of a single flow are
//!   serialized behind a per-flow mutex.
//! - The trace identifier in flight on each stream of a flow is remembered,
//!   so responses that carry no trace header are still paired with the
//!   request that opened them.
//! - Connection-termination segments wait for in-flight trace-bearing
//!   segments before flow state is wiped.
//! - Idle and abandoned flows are reclaimed in the background.
//!
//! The crate does not capture or parse packets. Workers hand it fields that
//! were already extracted upstream (TCP flags, sequence and acknowledgment
//! numbers, stream ids, trace contexts) through [`SegmentContext`] and the
//! [`FlowMutex`] lock/unlock surface. Ordering is guaranteed within a flow
//! only; flows never block one another.
//!
//! A minimal session looks like:
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use capmux_core::{
//!     default_config, FlowId, FlowMutex, PacketSerial, SegmentContext, ShutdownToken, StreamId,
//!     TraceContext, TraceIndex, TraceRegistry,
//! };
//!
//! let token = ShutdownToken::new();
//! let engine = FlowMutex::new(
//!     token.clone(),
//!     default_config(),
//!     Arc::new(TraceIndex::new()),
//!     Arc::new(TraceRegistry::new()),
//! )
//! .unwrap();
//!
//! let segment = SegmentContext {
//!     serial: PacketSerial { id: 1, ctx: "eth0".into(), num: 7 },
//!     flow_id: FlowId(42),
//!     flags: capmux_core::protocols::tcp::PSH | capmux_core::protocols::tcp::ACK,
//!     seq: 1000,
//!     ack: 0,
//!     is_local: false,
//! };
//! let handle = engine.lock(segment);
//! let ts = TraceContext {
//!     trace_id: "trace-1".into(),
//!     span_id: "span-1".into(),
//!     stream_id: StreamId(1),
//! };
//! let requests = HashMap::from([(StreamId(1), ts)]);
//! handle.unlock_with_trace_and_span(
//!     capmux_core::protocols::tcp::PSH | capmux_core::protocols::tcp::ACK,
//!     false,
//!     &[StreamId(1)],
//!     &[],
//!     &requests,
//!     &HashMap::new(),
//! );
//! ```

pub mod config;
pub mod flowtrack;
pub mod protocols;
pub mod shutdown;

pub use self::config::{default_config, load_config, FlowTrackConfig};
pub use self::flowtrack::flow_id::{FlowId, PacketSerial, StreamId};
pub use self::flowtrack::registry::{HttpRequestRecord, TraceRegistry};
pub use self::flowtrack::segment::SegmentContext;
pub use self::flowtrack::{FlowHandle, FlowMutex, FlowTrackStats, TraceContext, TraceIndex};
pub use self::shutdown::ShutdownToken;
