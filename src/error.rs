//! # Error Types
//!
//! Error handling for the framing codecs and the TCP transport.
//!
//! ## Error Categories
//! - **I/O Errors**: socket read/write/dial/bind failures
//! - **Framing Faults**: checksum mismatch, head/tail out of order, malformed length field.
//!   These terminate the connection they occur on.
//! - **Frame Construction Errors**: wrong type-tag width, body too long for the length field.
//!   Returned to the caller building the frame, never coerced.
//! - **Lifecycle Errors**: operations on a closed connection, double start/stop
//! - **Configuration Errors**: invalid or unparsable configuration
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use frame_link::core::protocol::FramingProtocol;
//! use frame_link::error::ProtocolError;
//!
//! let protocol = FramingProtocol::fixed_head_default();
//! match protocol.build_frame(&[0x01, 0x02, 0x03], b"hello") {
//!     Err(ProtocolError::TypeLengthMismatch { expected, actual }) => {
//!         assert_eq!((expected, actual), (1, 3));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

// ProtocolError is the primary error type for all framing and transport operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("the connection has been closed")]
    ConnectionClosed,

    #[error("packet check failed: expected {expected:02X?}, got {actual:02X?}")]
    ChecksumMismatch { expected: Vec<u8>, actual: Vec<u8> },

    #[error("frame tail found before frame head")]
    MarkersOutOfOrder,

    #[error("length field declares {0} bytes, above the configured maximum")]
    OversizedPacket(usize),

    #[error("type bytes length is not matched: expected {expected}, got {actual}")]
    TypeLengthMismatch { expected: usize, actual: usize },

    #[error("body of {len} bytes does not fit a {bits}-bit length field")]
    LengthOverflow { len: usize, bits: u32 },

    #[error("Operation timed out")]
    Timeout,

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True for faults detected while parsing the inbound byte stream.
    ///
    /// A framing fault means the stream can no longer be trusted; the
    /// connection that produced it is closed.
    pub fn is_framing_fault(&self) -> bool {
        matches!(
            self,
            ProtocolError::ChecksumMismatch { .. }
                | ProtocolError::MarkersOutOfOrder
                | ProtocolError::OversizedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
