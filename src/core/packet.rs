//! # Packets
//!
//! In-memory form of one decoded frame. Each packet keeps the exact wire
//! slices it was built from, so serialising a decoded packet reproduces the
//! received frame byte for byte.
//!
//! ## Wire Layout
//! ```text
//! FixedHead: [HEAD(n)] [TYPE(t)] [LEN(w)] [BODY(LEN)] [CHECK(0|2)]
//! HeadTail:  [HEAD(n)] [TYPE(t)] [BODY(..)] [TAIL(m)] [CHECK(0|2)]
//! ```
//!
//! Fields are [`Bytes`], so packets cut from a connection's accumulation
//! buffer share its allocation instead of copying.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// A fixed-head frame. Field order is significant on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedHeadPacket {
    pub head: Bytes,
    pub frame_type: Bytes,
    /// Encoded length field, as it appears on the wire.
    pub length: Bytes,
    pub body: Bytes,
    pub check: Bytes,
}

/// A head/tail delimited frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTailPacket {
    pub head: Bytes,
    /// Empty when the protocol has no type tag.
    pub frame_type: Bytes,
    pub body: Bytes,
    pub tail: Bytes,
    pub check: Bytes,
}

/// One decoded (or ready-to-send) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    FixedHead(FixedHeadPacket),
    HeadTail(HeadTailPacket),
}

impl Packet {
    /// Type tag and body of the frame.
    pub fn split(&self) -> (&[u8], &[u8]) {
        (self.frame_type(), self.body())
    }

    pub fn frame_type(&self) -> &[u8] {
        match self {
            Packet::FixedHead(p) => &p.frame_type,
            Packet::HeadTail(p) => &p.frame_type,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Packet::FixedHead(p) => &p.body,
            Packet::HeadTail(p) => &p.body,
        }
    }

    pub fn check_bytes(&self) -> &[u8] {
        match self {
            Packet::FixedHead(p) => &p.check,
            Packet::HeadTail(p) => &p.check,
        }
    }

    /// Total size of the serialised frame.
    pub fn encoded_len(&self) -> usize {
        self.fields().iter().map(|f| f.len()).sum()
    }

    /// Append the wire form of this packet to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let fields = self.fields();
        dst.reserve(fields.iter().map(|f| f.len()).sum());
        for field in fields {
            dst.put_slice(field);
        }
    }

    /// Serialise the packet into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for field in self.fields() {
            out.extend_from_slice(field);
        }
        out
    }

    fn fields(&self) -> [&Bytes; 5] {
        match self {
            Packet::FixedHead(p) => [&p.head, &p.frame_type, &p.length, &p.body, &p.check],
            Packet::HeadTail(p) => [&p.head, &p.frame_type, &p.body, &p.tail, &p.check],
        }
    }
}

impl From<FixedHeadPacket> for Packet {
    fn from(p: FixedHeadPacket) -> Self {
        Packet::FixedHead(p)
    }
}

impl From<HeadTailPacket> for Packet {
    fn from(p: HeadTailPacket) -> Self {
        Packet::HeadTail(p)
    }
}

impl fmt::Display for HeadTailPacket {
    /// Head, body and tail as text; the check bytes are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            String::from_utf8_lossy(&self.head),
            String::from_utf8_lossy(&self.body),
            String::from_utf8_lossy(&self.tail)
        )
    }
}
