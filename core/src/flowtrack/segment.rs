//! Per-segment context handed to the engine by translator workers.

use crate::flowtrack::flow_id::{FlowId, PacketSerial};

/// Fields extracted upstream from one translated TCP segment.
#[derive(Debug, Clone)]
pub struct SegmentContext {
    /// Identity of the capture packet this segment was translated from.
    pub serial: PacketSerial,
    /// Flow the segment belongs to.
    pub flow_id: FlowId,
    /// Raw 8-bit TCP flag field.
    pub flags: u8,
    /// TCP sequence number.
    pub seq: u32,
    /// TCP acknowledgment number.
    pub ack: u32,
    /// Segment originated on the local side of the capture point.
    pub is_local: bool,
}

impl SegmentContext {
    /// Sequence key this segment references in the per-stream index. Locally
    /// originated segments key on their acknowledgment number so both
    /// directions of a conversation land on the same point of the stream.
    #[inline]
    pub(crate) fn ref_seq(&self) -> u32 {
        if self.is_local {
            self.ack
        } else {
            self.seq
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_sequence_follows_direction() {
        let mut segment = SegmentContext {
            serial: PacketSerial {
                id: 1,
                ctx: "test".into(),
                num: 1,
            },
            flow_id: FlowId(1),
            flags: 0,
            seq: 1000,
            ack: 2000,
            is_local: false,
        };
        assert_eq!(segment.ref_seq(), 1000);
        segment.is_local = true;
        assert_eq!(segment.ref_seq(), 2000);
    }
}
