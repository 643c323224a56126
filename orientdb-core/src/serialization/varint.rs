//! Zigzag variable-length integers used inside record payloads.
//!
//! Signed values are zigzag-mapped to unsigned ones, then written in 7-bit
//! groups, least significant group first, with the high bit of each byte set
//! while more groups follow.

use super::{DataInput, DataOutput};
use crate::error::{OrientError, Result};

/// Longest encoding of a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

/// Maps a signed value onto the unsigned range so small magnitudes stay short.
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Varint writers, available on every [`DataOutput`].
pub trait VarIntOutput: DataOutput {
    /// Writes an unsigned value in 7-bit groups.
    fn write_unsigned_varint(&mut self, mut v: u64) -> Result<()> {
        while v & !0x7F != 0 {
            self.write_byte(((v & 0x7F) | 0x80) as u8 as i8)?;
            v >>= 7;
        }
        self.write_byte(v as u8 as i8)
    }

    /// Writes a signed value with zigzag mapping.
    fn write_varint(&mut self, v: i64) -> Result<()> {
        self.write_unsigned_varint(zigzag_encode(v))
    }

    /// Writes bytes prefixed with their varint length.
    fn write_varint_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.write_varint(v.len() as i64)?;
        self.write_raw(v)
    }

    /// Writes a UTF-8 string prefixed with its varint byte length.
    fn write_varint_string(&mut self, v: &str) -> Result<()> {
        self.write_varint_bytes(v.as_bytes())
    }
}

impl<T: DataOutput + ?Sized> VarIntOutput for T {}

/// Varint readers, available on every [`DataInput`].
pub trait VarIntInput: DataInput {
    /// Reads an unsigned value written in 7-bit groups.
    fn read_unsigned_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let b = self.read_byte()? as u8;
            value |= u64::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(OrientError::CorruptStream(format!(
            "varint longer than {} bytes",
            MAX_VARINT_LEN
        )))
    }

    /// Reads a zigzag-mapped signed value.
    fn read_varint(&mut self) -> Result<i64> {
        self.read_unsigned_varint().map(zigzag_decode)
    }

    /// Reads a varint that must fit in an `i32`.
    fn read_varint_i32(&mut self) -> Result<i32> {
        let v = self.read_varint()?;
        i32::try_from(v)
            .map_err(|_| OrientError::CorruptStream(format!("varint {} overflows i32", v)))
    }

    /// Reads bytes prefixed with their varint length.
    fn read_varint_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()?;
        if len < 0 {
            return Err(OrientError::CorruptStream(format!(
                "negative length: {}",
                len
            )));
        }
        self.read_raw(len as usize)
    }

    /// Reads a UTF-8 string prefixed with its varint byte length.
    fn read_varint_string(&mut self) -> Result<String> {
        let bytes = self.read_varint_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| OrientError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }
}

impl<T: DataInput + ?Sized> VarIntInput for T {}
