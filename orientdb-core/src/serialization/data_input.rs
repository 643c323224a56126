//! Data input traits and implementations for OrientDB wire primitives.

use crate::error::{OrientError, Result};
use bytes::Buf;
use std::io::Cursor;

/// Trait for reading fixed-width primitive values.
///
/// All multi-byte values are read in big-endian byte order. Byte arrays and
/// strings carry a 4-byte length prefix where `-1` denotes null.
pub trait DataInput {
    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 16-bit signed integer in big-endian order.
    fn read_short(&mut self) -> Result<i16>;

    /// Reads a 32-bit signed integer in big-endian order.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer in big-endian order.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 32-bit floating point in big-endian order.
    fn read_float(&mut self) -> Result<f32>;

    /// Reads a 64-bit floating point in big-endian order.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads the specified number of raw bytes.
    fn read_raw(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads a length-prefixed byte array; `None` for a null array.
    fn read_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_int()?;
        match len {
            -1 => Ok(None),
            n if n < 0 => Err(OrientError::CorruptStream(format!(
                "invalid byte array length: {}",
                n
            ))),
            n => self.read_raw(n as usize).map(Some),
        }
    }

    /// Reads a length-prefixed, possibly null string.
    fn read_nullable_string(&mut self) -> Result<Option<String>> {
        match self.read_bytes()? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| OrientError::Serialization(format!("invalid UTF-8 string: {}", e))),
            None => Ok(None),
        }
    }

    /// Reads a length-prefixed string that must not be null.
    fn read_string(&mut self) -> Result<String> {
        self.read_nullable_string()?
            .ok_or_else(|| OrientError::Serialization("unexpected null string".to_string()))
    }
}

/// A seekable buffer-based implementation of `DataInput`.
///
/// Record payloads address their values by absolute offset, so besides
/// sequential reads this input supports repositioning with [`seek`](Self::seek).
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Returns the total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    /// Returns true if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Moves the read position to an absolute offset.
    ///
    /// Seeking to the end of the buffer is allowed; seeking past it is not.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.len() {
            return Err(OrientError::Serialization(format!(
                "seek to {} past end of {}-byte buffer",
                position,
                self.len()
            )));
        }
        self.cursor.set_position(position as u64);
        Ok(())
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.cursor.remaining() < n {
            Err(OrientError::Serialization(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.cursor.remaining()
            )))
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_i8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8() != 0)
    }

    fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.cursor.get_i16())
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_i64())
    }

    fn read_float(&mut self) -> Result<f32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_f32())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_f64())
    }

    fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len)?;
        let mut buf = vec![0u8; len];
        self.cursor.copy_to_slice(&mut buf);
        Ok(buf)
    }
}
