//! Debug stream: one JSON line per state transition.
//!
//! When debug mode is on every transition in the engine emits a single
//! self-contained JSON record to the standard error stream, so a capture
//! session can be replayed offline against the emitted timeline.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::flowtrack::flow_id::{FlowId, PacketSerial};
use crate::flowtrack::segment::SegmentContext;

#[derive(Serialize)]
struct TcpFields {
    flags: u8,
    seq: u32,
    ack: u32,
}

#[derive(Serialize)]
struct Timestamp {
    seconds: i64,
    nanos: u32,
}

#[derive(Serialize)]
struct Record<'a> {
    pcap: &'a PacketSerial,
    flow: FlowId,
    tcp: TcpFields,
    timestamp: Timestamp,
    message: &'a str,
    labels: Value,
}

/// Writes transition records to stderr when enabled; otherwise every call
/// is a cheap no-op.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DebugLog {
    enabled: bool,
}

impl DebugLog {
    pub(crate) fn new(enabled: bool) -> Self {
        DebugLog { enabled }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    /// Emits a record for a transition driven by `segment`.
    pub(crate) fn emit(&self, segment: &SegmentContext, message: &str, labels: Value) {
        if !self.enabled {
            return;
        }
        self.write(
            &segment.serial,
            segment.flow_id,
            TcpFields {
                flags: segment.flags,
                seq: segment.seq,
                ack: segment.ack,
            },
            message,
            labels,
        );
    }

    /// Emits a record for a transition with no driving segment, such as a
    /// timer firing or a reaper sweep. TCP fields are zeroed.
    pub(crate) fn emit_flow(
        &self,
        serial: &PacketSerial,
        flow_id: FlowId,
        message: &str,
        labels: Value,
    ) {
        if !self.enabled {
            return;
        }
        self.write(
            serial,
            flow_id,
            TcpFields {
                flags: 0,
                seq: 0,
                ack: 0,
            },
            message,
            labels,
        );
    }

    fn write(
        &self,
        serial: &PacketSerial,
        flow_id: FlowId,
        tcp: TcpFields,
        message: &str,
        labels: Value,
    ) {
        let now = Utc::now();
        let record = Record {
            pcap: serial,
            flow: flow_id,
            tcp,
            timestamp: Timestamp {
                seconds: now.timestamp(),
                nanos: now.timestamp_subsec_nanos(),
            },
            message,
            labels,
        };
        if let Ok(line) = serde_json::to_string(&record) {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_shape() {
        let serial = PacketSerial {
            id: 1,
            ctx: "eth0".into(),
            num: 42,
        };
        let record = Record {
            pcap: &serial,
            flow: FlowId(7),
            tcp: TcpFields {
                flags: 0x18,
                seq: 1000,
                ack: 0,
            },
            timestamp: Timestamp {
                seconds: 1,
                nanos: 2,
            },
            message: "request/trace-1",
            labels: json!({ "stream": 10 }),
        };
        let value: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["pcap"]["ctx"], "eth0");
        assert_eq!(value["pcap"]["num"], 42);
        assert_eq!(value["flow"], 7);
        assert_eq!(value["tcp"]["flags"], 0x18);
        assert_eq!(value["message"], "request/trace-1");
        assert_eq!(value["labels"]["stream"], 10);
    }
}
