//! Flow and stream identifiers.
//!
//! Flow identifiers are derived upstream from the connection 5-tuple and are
//! opaque here; both directions of a connection share one value.

use std::fmt;

use serde::Serialize;

/// 64-bit flow identifier. Two segments of the same TCP connection, in either
/// direction, carry the same `FlowId`.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct FlowId(pub u64);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// 32-bit stream identifier within a flow: the protocol-level stream id for
/// HTTP/2, a connection-reuse ordinal for HTTP/1.1.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a capture packet: the capture engine instance, its capture
/// context, and the packet ordinal within that context.
#[derive(Debug, Clone, Serialize)]
pub struct PacketSerial {
    pub id: u64,
    pub ctx: String,
    pub num: u64,
}

impl fmt::Display for PacketSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.id, self.ctx, self.num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(FlowId(0xdead).to_string(), "0x000000000000dead");
        assert_eq!(StreamId(7).to_string(), "7");
        let serial = PacketSerial {
            id: 3,
            ctx: "eth0".into(),
            num: 99,
        };
        assert_eq!(serial.to_string(), "3/eth0:99");
    }
}
