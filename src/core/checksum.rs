//! # Frame Integrity Checks
//!
//! Both framing strategies may append a 2-byte check value after the frame
//! body (after the tail marker for head/tail frames).
//!
//! - [`CheckKind::Sum`]: 16-bit wrapping sum of all covered bytes, big-endian on the wire.
//! - [`CheckKind::Crc16`]: CRC-16/MODBUS (reflected polynomial `0xA001`, init `0xFFFF`),
//!   low byte first on the wire as Modbus RTU does.
//!
//! The covered region is passed as a list of slices so callers can check
//! `TYPE | LEN | BODY` without first concatenating the fields.

use crc::{Crc, CRC_16_MODBUS};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Width in bytes of every non-empty check value.
pub const CHECK_LEN: usize = 2;

const CRC16_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Integrity check applied to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// No check bytes on the wire.
    #[default]
    None,
    /// 16-bit additive checksum.
    Sum,
    /// CRC-16/MODBUS.
    Crc16,
}

impl CheckKind {
    /// Number of check bytes this kind puts on the wire.
    pub const fn len(self) -> usize {
        match self {
            CheckKind::None => 0,
            CheckKind::Sum | CheckKind::Crc16 => CHECK_LEN,
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, CheckKind::None)
    }

    /// Compute the wire bytes of the check over `parts`, in order.
    ///
    /// Returns an empty vector for [`CheckKind::None`].
    pub fn compute(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            CheckKind::None => Vec::new(),
            CheckKind::Sum => checksum16(parts).to_be_bytes().to_vec(),
            CheckKind::Crc16 => crc16(parts).to_le_bytes().to_vec(),
        }
    }

    /// Recompute the check over `parts` and compare it byte-for-byte with `check`.
    pub fn verify(self, parts: &[&[u8]], check: &[u8]) -> Result<()> {
        if self.is_none() {
            return Ok(());
        }
        let expected = self.compute(parts);
        if expected.as_slice() == check {
            Ok(())
        } else {
            Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: check.to_vec(),
            })
        }
    }
}

/// 16-bit wrapping sum of every byte in `parts`.
pub fn checksum16(parts: &[&[u8]]) -> u16 {
    parts
        .iter()
        .flat_map(|part| part.iter())
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// CRC-16/MODBUS over every byte in `parts`.
pub fn crc16(parts: &[&[u8]]) -> u16 {
    let mut digest = CRC16_MODBUS.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}
