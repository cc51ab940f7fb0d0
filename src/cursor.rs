//! Bounds-checked read cursor over an immutable byte buffer.
//!
//! The [`Cursor`] is the lowest layer of the decoder stack: row values, varints and
//! fixed-width numbers are all read through it. Every read is checked against the
//! buffer length and fails with [`OutOfBounds`] instead of panicking, which makes it
//! safe to point at server-supplied bytes.
//!
//! # Example
//! ```rust
//! use xproto::cursor::Cursor;
//!
//! let mut cursor = Cursor::new(b"abc");
//! assert_eq!(cursor.read_byte().unwrap(), b'a');
//! assert_eq!(cursor.read_slice(2).unwrap(), b"bc");
//! assert!(cursor.read_byte().is_err());
//! ```
use thiserror::Error;

/// Raised when a read or seek would leave the buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("out of bounds: offset {offset} + {requested} exceeds buffer length {length}")]
pub struct OutOfBounds {
    pub offset: isize,
    pub requested: usize,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current offset into the buffer.
    pub fn tell(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Moves the cursor by `delta` bytes. The resulting offset must address an
    /// existing byte, so it has to be within `0..len`.
    pub fn seek(&mut self, delta: isize) -> Result<usize, OutOfBounds> {
        let out_of_bounds = |offset| OutOfBounds {
            offset,
            requested: 0,
            length: self.data.len(),
        };
        let target = (self.offset as isize)
            .checked_add(delta)
            .ok_or_else(|| out_of_bounds(if delta < 0 { isize::MIN } else { isize::MAX }))?;
        if target < 0 || target as usize >= self.data.len() {
            return Err(out_of_bounds(target));
        }
        self.offset = target as usize;
        Ok(self.offset)
    }

    pub fn read_byte(&mut self) -> Result<u8, OutOfBounds> {
        match self.data.get(self.offset) {
            Some(b) => {
                self.offset += 1;
                Ok(*b)
            }
            None => Err(self.out_of_bounds(1)),
        }
    }

    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.out_of_bounds(n))?;
        let out = &self.data[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    /// Returns everything left in the buffer and moves to the end.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.offset.min(self.data.len())..];
        self.offset = self.data.len();
        out
    }

    /// Reads a base-128 varint as used by protobuf and the row encoding.
    pub fn read_varint_u64(&mut self) -> Result<u64, OutOfBounds> {
        let mut value = 0_u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        // More than ten continuation bytes can never be a valid 64-bit varint.
        Err(self.out_of_bounds(1))
    }

    /// Reads a zigzag-encoded signed varint.
    pub fn read_zigzag_i64(&mut self) -> Result<i64, OutOfBounds> {
        let raw = self.read_varint_u64()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, OutOfBounds> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32_le(&mut self) -> Result<f32, OutOfBounds> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    pub fn read_f64_le(&mut self) -> Result<f64, OutOfBounds> {
        let bytes = self.read_slice(8)?;
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    fn out_of_bounds(&self, requested: usize) -> OutOfBounds {
        OutOfBounds {
            offset: self.offset as isize,
            requested,
            length: self.data.len(),
        }
    }
}
