//! Packed binary codec
//!
//! Every protocol payload is written with [`PackedWriter`] and read back with
//! [`PackedReader`]. Wire conventions:
//! - unsigned integers are LEB128 varints (7 bits per byte, low group first)
//! - signed integers are zig-zag mapped before varint encoding
//! - floats are IEEE-754, little endian
//! - byte blocks and strings carry a varint length prefix
//! - 128-bit identifiers are 16 raw bytes

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Upper bound for a single length-prefixed block (16 MB)
pub const MAX_BLOCK_LEN: usize = 16 * 1024 * 1024;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("varint does not fit the target integer")]
    VarintOverflow,
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),
    #[error("length prefix too large: {0}")]
    LengthTooLarge(usize),
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Packed writer over a growable buffer
#[derive(Debug, Default, Clone)]
pub struct PackedWriter {
    buf: BytesMut,
}

impl PackedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16_packed(&mut self, value: u16) {
        self.write_u64_packed(value as u64);
    }

    pub fn write_u32_packed(&mut self, value: u32) {
        self.write_u64_packed(value as u64);
    }

    pub fn write_u64_packed(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.put_u8(byte);
                return;
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    pub fn write_i32_packed(&mut self, value: i32) {
        self.write_u32_packed(((value << 1) ^ (value >> 31)) as u32);
    }

    pub fn write_i64_packed(&mut self, value: i64) {
        self.write_u64_packed(((value << 1) ^ (value >> 63)) as u64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// Write a varint length prefix followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u64_packed(bytes.len() as u64);
        self.buf.put_slice(bytes);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Write bytes without a length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_id128(&mut self, id: &[u8; 16]) {
        self.buf.put_slice(id);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Packed reader over a borrowed payload
///
/// Reads never panic: every method checks the remaining length first and
/// returns a [`CodecError`] on malformed input.
#[derive(Debug, Clone)]
pub struct PackedReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> PackedReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.total - self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Unread bytes, without consuming them
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16_packed(&mut self) -> Result<u16, CodecError> {
        u16::try_from(self.read_u64_packed()?).map_err(|_| CodecError::VarintOverflow)
    }

    pub fn read_u32_packed(&mut self) -> Result<u32, CodecError> {
        u32::try_from(self.read_u64_packed()?).map_err(|_| CodecError::VarintOverflow)
    }

    pub fn read_u64_packed(&mut self) -> Result<u64, CodecError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let group = (byte & 0x7f) as u64;
            // the tenth byte may only contribute the top bit
            if shift == 63 && group > 1 {
                return Err(CodecError::VarintOverflow);
            }
            value |= group << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::VarintOverflow);
            }
        }
    }

    pub fn read_i32_packed(&mut self) -> Result<i32, CodecError> {
        let raw = self.read_u32_packed()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    pub fn read_i64_packed(&mut self) -> Result<i64, CodecError> {
        let raw = self.read_u64_packed()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Read a length-prefixed block, borrowing from the payload
    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u64_packed()?;
        let len = usize::try_from(len).map_err(|_| CodecError::LengthTooLarge(usize::MAX))?;
        if len > MAX_BLOCK_LEN {
            return Err(CodecError::LengthTooLarge(len));
        }
        self.read_raw(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, CodecError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read exactly `len` bytes without a length prefix
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_id128(&mut self) -> Result<[u8; 16], CodecError> {
        let raw = self.read_raw(16)?;
        let mut id = [0u8; 16];
        id.copy_from_slice(raw);
        Ok(id)
    }
}
