//! Data output traits and implementations for OrientDB wire primitives.

use crate::error::{OrientError, Result};
use bytes::{BufMut, BytesMut};

/// Trait for writing fixed-width primitive values.
///
/// All multi-byte values are written in big-endian byte order.
pub trait DataOutput {
    /// Writes a single byte (i8).
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a 16-bit signed integer in big-endian order.
    fn write_short(&mut self, v: i16) -> Result<()>;

    /// Writes a 32-bit signed integer in big-endian order.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer in big-endian order.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 32-bit floating point in big-endian order.
    fn write_float(&mut self, v: f32) -> Result<()>;

    /// Writes a 64-bit floating point in big-endian order.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without length prefix.
    fn write_raw(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a byte array with its 4-byte length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        let len = i32::try_from(v.len()).map_err(|_| {
            OrientError::Serialization(format!("byte array too long: {} bytes", v.len()))
        })?;
        self.write_int(len)?;
        self.write_raw(v)
    }

    /// Writes a string with its length prefix.
    fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_bytes(v.as_bytes())
    }

    /// Writes a possibly null string; null is encoded as length `-1`.
    fn write_nullable_string(&mut self, v: Option<&str>) -> Result<()> {
        match v {
            Some(s) => self.write_string(s),
            None => self.write_int(-1),
        }
    }
}

/// A buffer-based implementation of `DataOutput`.
///
/// Besides appending, the buffer supports overwriting previously written
/// 4-byte slots, which the record serializer uses to back-patch pointers.
#[derive(Debug)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
}

impl ObjectDataOutput {
    /// Creates a new `ObjectDataOutput` with default capacity.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Creates a new `ObjectDataOutput` with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clears the buffer, removing all written data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Reserves `len` zeroed bytes and returns their starting offset.
    pub fn alloc(&mut self, len: usize) -> usize {
        let position = self.buffer.len();
        self.buffer.put_bytes(0, len);
        position
    }

    /// Overwrites a previously written big-endian i32 at `position`.
    pub fn patch_int(&mut self, position: usize, v: i32) -> Result<()> {
        self.patch(position, &v.to_be_bytes())
    }

    fn patch(&mut self, position: usize, bytes: &[u8]) -> Result<()> {
        let end = position + bytes.len();
        if end > self.buffer.len() {
            return Err(OrientError::Serialization(format!(
                "patch at {}..{} outside {}-byte buffer",
                position,
                end,
                self.buffer.len()
            )));
        }
        self.buffer[position..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl Default for ObjectDataOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.buffer.put_u8(if v { 1 } else { 0 });
        Ok(())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.buffer.put_i16(v);
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.buffer.put_f32(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_raw(&mut self, v: &[u8]) -> Result<()> {
        self.buffer.put_slice(v);
        Ok(())
    }
}
