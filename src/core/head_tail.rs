//! # Head/Tail Framing
//!
//! Frames are delimited by marker bytes instead of a length field:
//!
//! ```text
//! [HEAD(n)] [TYPE(t, optional)] [BODY(..)] [TAIL(m)] [CHECK(0|2)]
//! ```
//!
//! The body is whatever lies strictly between the type tag and the first
//! tail match after it; the check, when configured, covers `TYPE | BODY`.
//!
//! Bodies are not escaped. A body containing the tail marker is cut short
//! at that point, so the markers must be chosen to never occur in payloads.

use bytes::{Buf, Bytes, BytesMut};

use crate::core::checksum::CheckKind;
use crate::core::packet::{HeadTailPacket, Packet};
use crate::core::protocol::{discard_drift, find, find_from};
use crate::error::{ProtocolError, Result};

/// Marker-delimited framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTailProtocol {
    head: Bytes,
    tail: Bytes,
    type_len: usize,
    check: CheckKind,
}

impl HeadTailProtocol {
    /// Both markers must be non-empty.
    pub fn new(
        head: impl Into<Bytes>,
        tail: impl Into<Bytes>,
        type_len: usize,
        check: CheckKind,
    ) -> Result<Self> {
        let head = head.into();
        let tail = tail.into();
        if head.is_empty() || tail.is_empty() {
            return Err(ProtocolError::ConfigError(
                "head/tail framing requires non-empty head and tail markers".to_string(),
            ));
        }
        Ok(Self {
            head,
            tail,
            type_len,
            check,
        })
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    pub fn type_len(&self) -> usize {
        self.type_len
    }

    pub fn check_kind(&self) -> CheckKind {
        self.check
    }

    /// Size of a frame with an empty body.
    pub fn min_frame_len(&self) -> usize {
        self.head.len() + self.type_len + self.tail.len() + self.check.len()
    }

    /// Try to cut one frame off the front of `buf`.
    ///
    /// Call repeatedly while it yields packets: a single read may carry
    /// several frames.
    pub fn get_frame(&self, buf: &mut BytesMut) -> Result<Option<Packet>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let head_at = match find(&buf[..], &self.head) {
            Some(at) => at,
            None => {
                discard_drift(buf);
                return Ok(None);
            }
        };

        match find(&buf[..], &self.tail) {
            None => return Ok(None),
            Some(tail_at) if tail_at < head_at => {
                buf.advance(head_at);
                return Err(ProtocolError::MarkersOutOfOrder);
            }
            Some(_) => {}
        }

        let body_start = head_at + self.head.len() + self.type_len;
        let Some(tail_at) = find_from(&buf[..], &self.tail, body_start) else {
            return Ok(None);
        };

        let frame_end = tail_at + self.tail.len() + self.check.len();
        if buf.len() < frame_end {
            return Ok(None);
        }

        buf.advance(head_at);
        let mut frame = buf.split_to(frame_end - head_at).freeze();
        let head = frame.split_to(self.head.len());
        let frame_type = frame.split_to(self.type_len);
        let body = frame.split_to(tail_at - body_start);
        let tail = frame.split_to(self.tail.len());
        let check = frame;

        self.check.verify(&[&frame_type[..], &body[..]], &check)?;

        Ok(Some(Packet::HeadTail(HeadTailPacket {
            head,
            frame_type,
            body,
            tail,
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

        let check = self.check.compute(&[frame_type, content]);

        Ok(Packet::HeadTail(HeadTailPacket {
            head: self.head.clone(),
            frame_type: Bytes::copy_from_slice(frame_type),
            body: Bytes::copy_from_slice(content),
            tail: self.tail.clone(),
            check: Bytes::from(check),
        }))
    }
}
