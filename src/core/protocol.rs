//! # Framing Protocols
//!
//! [`FramingProtocol`] is the codec a connection uses to split its inbound
//! byte stream into [`Packet`]s and to build outbound frames. It is an
//! immutable value: each connection may use its own configuration, and the
//! only state between calls is the caller-owned accumulation buffer.
//!
//! ## Example
//! ```rust
//! use bytes::BytesMut;
//! use frame_link::core::protocol::FramingProtocol;
//!
//! let protocol = FramingProtocol::fixed_head_default();
//! let packet = protocol.build_frame(&[0x01], b"hello").unwrap();
//!
//! let mut buf = BytesMut::from(&packet.to_bytes()[..]);
//! let decoded = protocol.get_frame(&mut buf).unwrap().unwrap();
//! assert_eq!(decoded.body(), b"hello");
//! assert!(buf.is_empty());
//! ```

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::core::checksum::CheckKind;
use crate::core::fixed_head::{ByteOrder, FixedHeadProtocol, LengthWidth};
use crate::core::head_tail::HeadTailProtocol;
use crate::core::packet::Packet;
use crate::error::Result;

/// Head marker of [`FramingProtocol::fixed_head_default`].
pub const DEFAULT_HEAD: [u8; 2] = [0xAA, 0x55];

/// One of the two framing strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingProtocol {
    FixedHead(FixedHeadProtocol),
    HeadTail(HeadTailProtocol),
}

impl FramingProtocol {
    /// `AA 55 | type(1) | u16 BE length | body | CRC-16`.
    pub fn fixed_head_default() -> Self {
        FramingProtocol::FixedHead(FixedHeadProtocol::new(
            Bytes::from_static(&DEFAULT_HEAD),
            1,
            LengthWidth::U16,
            ByteOrder::BigEndian,
            CheckKind::Crc16,
        ))
    }

    /// Parse at most one frame from the front of `buf`.
    ///
    /// `Ok(None)` means more data is needed (the buffer may have been
    /// cleared if it held no head marker). An error is a framing fault and
    /// the stream should be abandoned.
    pub fn get_frame(&self, buf: &mut BytesMut) -> Result<Option<Packet>> {
        match self {
            FramingProtocol::FixedHead(p) => p.get_frame(buf),
            FramingProtocol::HeadTail(p) => p.get_frame(buf),
        }
    }

    /// Parse every complete frame currently in `buf`.
    ///
    /// Stops at the first framing fault; packets decoded before it are lost
    /// along with the stream.
    pub fn get_frames(&self, buf: &mut BytesMut) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        while let Some(packet) = self.get_frame(buf)? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Build an outbound frame. `frame_type` must match the configured type width.
    pub fn build_frame(&self, frame_type: &[u8], content: &[u8]) -> Result<Packet> {
        match self {
            FramingProtocol::FixedHead(p) => p.build_frame(frame_type, content),
            FramingProtocol::HeadTail(p) => p.build_frame(frame_type, content),
        }
    }

    pub fn min_frame_len(&self) -> usize {
        match self {
            FramingProtocol::FixedHead(p) => p.min_frame_len(),
            FramingProtocol::HeadTail(p) => p.min_frame_len(),
        }
    }

    pub fn type_len(&self) -> usize {
        match self {
            FramingProtocol::FixedHead(p) => p.type_len(),
            FramingProtocol::HeadTail(p) => p.type_len(),
        }
    }

    pub fn check_kind(&self) -> CheckKind {
        match self {
            FramingProtocol::FixedHead(p) => p.check_kind(),
            FramingProtocol::HeadTail(p) => p.check_kind(),
        }
    }
}

impl From<FixedHeadProtocol> for FramingProtocol {
    fn from(p: FixedHeadProtocol) -> Self {
        FramingProtocol::FixedHead(p)
    }
}

impl From<HeadTailProtocol> for FramingProtocol {
    fn from(p: HeadTailProtocol) -> Self {
        FramingProtocol::HeadTail(p)
    }
}

/// Drop a buffer that holds no head marker. Nothing in it can start a frame
/// the parser would recognise, so all of it goes.
pub(crate) fn discard_drift(buf: &mut BytesMut) {
    trace!(discarded = buf.len(), "head marker not found");
    buf.clear();
}

/// Leftmost exact match of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_from(haystack, needle, 0)
}

/// Leftmost exact match of `needle` starting at or after `from`.
pub(crate) fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
