//! # frame-link
//!
//! Framed message transport over TCP.
//!
//! A [`FramingProtocol`] splits a byte stream into [`Packet`]s and builds
//! frames from payloads. Two strategies are provided:
//!
//! - **FixedHead**: `HEAD | TYPE | LEN | BODY | CHECK`, length-prefixed
//! - **HeadTail**: `HEAD | TYPE | BODY | TAIL | CHECK`, marker-delimited
//!
//! with an optional 2-byte trailing check (16-bit sum or CRC-16/MODBUS).
//!
//! On top of the codecs, [`transport`] runs framed TCP connections: a
//! [`Server`] with a self-re-arming accept loop, and a [`Client`] that keeps
//! one connection alive and reconnects with a fixed backoff. Events reach the
//! application through the [`ConnCallback`] trait.
//!
//! ## Example
//! ```rust
//! use bytes::BytesMut;
//! use frame_link::{CheckKind, FramingProtocol, HeadTailProtocol};
//!
//! let protocol: FramingProtocol = HeadTailProtocol::new(&b"##"[..], &b"$$"[..], 1, CheckKind::Sum)
//!     .unwrap()
//!     .into();
//!
//! let mut stream = BytesMut::new();
//! for body in [&b"one"[..], b"two"] {
//!     stream.extend_from_slice(&protocol.build_frame(&[0x10], body).unwrap().to_bytes());
//! }
//!
//! let packets = protocol.get_frames(&mut stream).unwrap();
//! assert_eq!(packets.len(), 2);
//! assert_eq!(packets[1].split(), (&[0x10][..], &b"two"[..]));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::checksum::CheckKind;
pub use crate::core::codec::FrameCodec;
pub use crate::core::fixed_head::{ByteOrder, FixedHeadProtocol, LengthWidth};
pub use crate::core::head_tail::HeadTailProtocol;
pub use crate::core::packet::{FixedHeadPacket, HeadTailPacket, Packet};
pub use crate::core::protocol::FramingProtocol;
pub use crate::error::{ProtocolError, Result};
pub use crate::transport::{Client, ConnCallback, Connection, Server};
