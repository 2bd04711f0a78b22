//! # Fixed-Head Framing
//!
//! Frames carry an explicit length field after the head marker and type tag:
//!
//! ```text
//! [HEAD(n)] [TYPE(t)] [LEN(w, endianness)] [BODY(LEN)] [CHECK(0|2)]
//! ```
//!
//! The check, when configured, covers `TYPE | LEN | BODY`.
//!
//! ## Parsing Rules
//! - Fewer bytes than the minimum frame length: wait for more data.
//! - Head marker absent: the whole buffer is discarded (the stream has drifted).
//! - Header or body incomplete: wait, buffer untouched.
//! - Declared length above `max_body_len`, or too large to address: buffer
//!   cleared, framing fault.
//! - Complete frame: bytes up to and including the frame are consumed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::core::checksum::CheckKind;
use crate::core::packet::{FixedHeadPacket, Packet};
use crate::core::protocol::{discard_drift, find};
use crate::error::{ProtocolError, Result};

/// Default upper bound on a declared body length (16 MB).
pub const DEFAULT_MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// Width of the length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthWidth {
    U8,
    #[default]
    U16,
    U32,
    U64,
}

impl LengthWidth {
    pub const fn bytes(self) -> usize {
        match self {
            LengthWidth::U8 => 1,
            LengthWidth::U16 => 2,
            LengthWidth::U32 => 4,
            LengthWidth::U64 => 8,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Build from a bit count; only 8, 16, 32 and 64 are valid.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(LengthWidth::U8),
            16 => Some(LengthWidth::U16),
            32 => Some(LengthWidth::U32),
            64 => Some(LengthWidth::U64),
            _ => None,
        }
    }

    const fn max_value(self) -> u64 {
        match self {
            LengthWidth::U8 => u8::MAX as u64,
            LengthWidth::U16 => u16::MAX as u64,
            LengthWidth::U32 => u32::MAX as u64,
            LengthWidth::U64 => u64::MAX,
        }
    }
}

/// Byte order of the length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

fn decode_length(mut field: &[u8], order: ByteOrder) -> u64 {
    let width = field.len();
    match order {
        ByteOrder::BigEndian => field.get_uint(width),
        ByteOrder::LittleEndian => field.get_uint_le(width),
    }
}

fn encode_length(len: usize, width: LengthWidth, order: ByteOrder) -> Result<Bytes> {
    let value = len as u64;
    if value > width.max_value() {
        return Err(ProtocolError::LengthOverflow {
            len,
            bits: width.bits(),
        });
    }
    let mut field = BytesMut::with_capacity(width.bytes());
    match order {
        ByteOrder::BigEndian => field.put_uint(value, width.bytes()),
        ByteOrder::LittleEndian => field.put_uint_le(value, width.bytes()),
    }
    Ok(field.freeze())
}

/// Length-prefixed framing with a fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedHeadProtocol {
    head: Bytes,
    type_len: usize,
    length_width: LengthWidth,
    byte_order: ByteOrder,
    check: CheckKind,
    max_body_len: usize,
}

impl FixedHeadProtocol {
    /// An empty `head` means frames start directly with the type tag.
    pub fn new(
        head: impl Into<Bytes>,
        type_len: usize,
        length_width: LengthWidth,
        byte_order: ByteOrder,
        check: CheckKind,
    ) -> Self {
        Self {
            head: head.into(),
            type_len,
            length_width,
            byte_order,
            check,
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn type_len(&self) -> usize {
        self.type_len
    }

    pub fn length_width(&self) -> LengthWidth {
        self.length_width
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn check_kind(&self) -> CheckKind {
        self.check
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Size of a frame with an empty body.
    pub fn min_frame_len(&self) -> usize {
        self.head.len() + self.type_len + self.length_width.bytes() + self.check.len()
    }

    /// Try to cut one frame off the front of `buf`.
    pub fn get_frame(&self, buf: &mut BytesMut) -> Result<Option<Packet>> {
        if buf.len() < self.min_frame_len() {
            return Ok(None);
        }

        let start = if self.head.is_empty() {
            0
        } else {
            match find(&buf[..], &self.head) {
                Some(at) => at,
                None => {
                    discard_drift(buf);
                    return Ok(None);
                }
            }
        };

        // A head near the end of the buffer may not have its full header yet.
        if buf.len() - start < self.min_frame_len() {
            return Ok(None);
        }

        let len_start = start + self.head.len() + self.type_len;
        let header_end = len_start + self.length_width.bytes();
        let declared = decode_length(&buf[len_start..header_end], self.byte_order);
        let body_len = usize::try_from(declared).unwrap_or(usize::MAX);
        if body_len > self.max_body_len {
            buf.clear();
            return Err(ProtocolError::OversizedPacket(body_len));
        }

        let Some(frame_len) = (header_end - start)
            .checked_add(body_len)
            .and_then(|len| len.checked_add(self.check.len()))
        else {
            buf.clear();
            return Err(ProtocolError::OversizedPacket(body_len));
        };
        if buf.len() - start < frame_len {
            return Ok(None);
        }

        buf.advance(start);
        let mut frame = buf.split_to(frame_len).freeze();
        let head = frame.split_to(self.head.len());
        let frame_type = frame.split_to(self.type_len);
        let length = frame.split_to(self.length_width.bytes());
        let body = frame.split_to(body_len);
        let check = frame;

        self.check
            .verify(&[&frame_type[..], &length[..], &body[..]], &check)?;

        Ok(Some(Packet::FixedHead(FixedHeadPacket {
            head,
            frame_type,
            length,
            body,
            check,
        })))
    }

    /// Assemble an outbound frame around `content`.
    pub fn build_frame(&self, frame_type: &[u8], content: &[u8]) -> Result<Packet> {
        if frame_type.len() != self.type_len {
            return Err(ProtocolError::TypeLengthMismatch {
                expected: self.type_len,
                actual: frame_type.len(),
            });
        }
        if content.len() > self.max_body_len {
            return Err(ProtocolError::OversizedPacket(content.len()));
        }

        let length = encode_length(content.len(), self.length_width, self.byte_order)?;
        let check = self.check.compute(&[frame_type, &length[..], content]);

        Ok(Packet::FixedHead(FixedHeadPacket {
            head: self.head.clone(),
            frame_type: Bytes::copy_from_slice(frame_type),
            length,
            body: Bytes::copy_from_slice(content),
            check: Bytes::from(check),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(check: CheckKind) -> FixedHeadProtocol {
        FixedHeadProtocol::new(
            Bytes::from_static(&[0xAA, 0x55]),
            1,
            LengthWidth::U16,
            ByteOrder::BigEndian,
            check,
        )
    }

    #[test]
    fn length_field_widths_and_order() {
        assert_eq!(
            encode_length(0x0102, LengthWidth::U16, ByteOrder::BigEndian).unwrap()[..],
            [0x01, 0x02]
        );
        assert_eq!(
            encode_length(0x0102, LengthWidth::U16, ByteOrder::LittleEndian).unwrap()[..],
            [0x02, 0x01]
        );
        assert_eq!(
            encode_length(5, LengthWidth::U32, ByteOrder::LittleEndian).unwrap()[..],
            [5, 0, 0, 0]
        );
        assert_eq!(
            encode_length(5, LengthWidth::U64, ByteOrder::BigEndian).unwrap()[..],
            [0, 0, 0, 0, 0, 0, 0, 5]
        );
        assert_eq!(decode_length(&[0x01, 0x02], ByteOrder::BigEndian), 0x0102);
        assert_eq!(decode_length(&[0x01, 0x02], ByteOrder::LittleEndian), 0x0201);
    }

    #[test]
    fn length_overflow_is_rejected() {
        let err = encode_length(256, LengthWidth::U8, ByteOrder::BigEndian).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::LengthOverflow { len: 256, bits: 8 }
        ));
    }

    #[test]
    fn width_from_bits() {
        assert_eq!(LengthWidth::from_bits(32), Some(LengthWidth::U32));
        assert_eq!(LengthWidth::from_bits(24), None);
    }

    #[test]
    fn build_frame_layout() {
        let p = protocol(CheckKind::Sum);
        let packet = p.build_frame(&[0x07], b"hi").unwrap();
        let sum = (0x07u16 + 0x02 + u16::from(b'h') + u16::from(b'i')).to_be_bytes();
        assert_eq!(
            packet.to_bytes(),
            vec![0xAA, 0x55, 0x07, 0x00, 0x02, b'h', b'i', sum[0], sum[1]]
        );
    }

    #[test]
    fn build_frame_rejects_wrong_type_width() {
        let err = protocol(CheckKind::None)
            .build_frame(&[0x01, 0x02], b"x")
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TypeLengthMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn garbage_before_head_is_consumed_with_frame() {
        let p = protocol(CheckKind::Crc16);
        let frame = p.build_frame(&[0x01], b"body").unwrap().to_bytes();
        let mut buf = BytesMut::from(&[0x00, 0x13, 0x37][..]);
        buf.extend_from_slice(&frame);
        buf.extend_from_slice(&[0xAA]);

        let packet = p.get_frame(&mut buf).unwrap().unwrap();
        assert_eq!(packet.body(), b"body");
        assert_eq!(&buf[..], &[0xAA]);
    }

    #[test]
    fn missing_head_discards_buffer() {
        let p = protocol(CheckKind::None);
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06][..]);
        assert!(p.get_frame(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn head_at_end_waits_for_header() {
        let p = protocol(CheckKind::None);
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0xAA, 0x55, 0x01][..]);
        assert!(p.get_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn oversized_length_clears_buffer() {
        let p = protocol(CheckKind::None).with_max_body_len(4);
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01, 0x00, 0x05, 1, 2, 3, 4, 5][..]);
        let err = p.get_frame(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPacket(5)));
        assert!(buf.is_empty());
    }

    #[test]
    fn unaddressable_length_is_a_fault() {
        let p = FixedHeadProtocol::new(
            Bytes::from_static(&[0xAA]),
            0,
            LengthWidth::U64,
            ByteOrder::BigEndian,
            CheckKind::None,
        )
        .with_max_body_len(usize::MAX);
        let mut buf = BytesMut::from(
            &[0xAA, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x02][..],
        );

        let err = p.get_frame(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPacket(_)));
        assert!(err.is_framing_fault());
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_head_frames_start_at_offset_zero() {
        let p = FixedHeadProtocol::new(
            Bytes::new(),
            0,
            LengthWidth::U8,
            ByteOrder::BigEndian,
            CheckKind::None,
        );
        let mut buf = BytesMut::from(&[3, b'a', b'b', b'c', 1, b'z'][..]);
        assert_eq!(p.get_frame(&mut buf).unwrap().unwrap().body(), b"abc");
        assert_eq!(p.get_frame(&mut buf).unwrap().unwrap().body(), b"z");
        assert!(buf.is_empty());
    }
}
