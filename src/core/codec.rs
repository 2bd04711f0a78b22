//! # Frame Codec
//!
//! Adapter exposing a [`FramingProtocol`] as a `tokio_util` codec, so a
//! socket can be wrapped in `Framed`/`FramedRead` and consumed as a stream
//! of [`Packet`]s. The `FramedRead` read buffer is the accumulation buffer.

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::core::packet::Packet;
use crate::core::protocol::FramingProtocol;
use crate::error::ProtocolError;

#[derive(Debug, Clone)]
pub struct FrameCodec {
    protocol: Arc<FramingProtocol>,
}

impl FrameCodec {
    pub fn new(protocol: Arc<FramingProtocol>) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &FramingProtocol {
        &self.protocol
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.protocol.get_frame(src)
    }

    /// A partial frame left at end of stream is dropped, not reported.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "Discarding incomplete frame at EOF");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

impl Encoder<&Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
