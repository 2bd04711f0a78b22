//! # Core Framing Components
//!
//! Stateless codecs that turn a growing byte buffer into packets and
//! payloads into wire frames.
//!
//! ## Components
//! - **Checksum**: 16-bit sum or CRC-16 trailing check
//! - **Packet**: decoded frame with `split()`/`to_bytes()`
//! - **FixedHead**: `[HEAD][TYPE][LEN][BODY][CHECK]`, length-prefixed
//! - **HeadTail**: `[HEAD][TYPE][BODY][TAIL][CHECK]`, marker-delimited
//! - **Protocol**: the `FramingProtocol` enum over both strategies
//! - **Codec**: `tokio_util` Decoder/Encoder adapter
//!
//! ## Robustness
//! - Bytes preceding a head marker are treated as drift and dropped
//! - Declared lengths are bounded before any buffering decision
//! - A checksum mismatch is a fault, never silently skipped

pub mod checksum;
pub mod codec;
pub mod fixed_head;
pub mod head_tail;
pub mod packet;
pub mod protocol;
