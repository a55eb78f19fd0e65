use std::fmt;
use std::io::{Read, Write};

use mfs_types::ContentHash;

use crate::error::{BufferError, BufferResult};
use crate::packed::Packed;

/// Alignment unit for capacities and variable-length sections.
pub const WORD: usize = 8;

/// Round `n` up to the next multiple of [`WORD`].
pub const fn align_up(n: usize) -> usize {
    n.div_ceil(WORD) * WORD
}

/// Round `n` up to the next multiple of [`WORD`], or `None` on overflow.
pub const fn checked_align_up(n: usize) -> Option<usize> {
    n.checked_next_multiple_of(WORD)
}

/// Number of zero bytes needed after `n` bytes to reach a word boundary.
pub const fn padding_for(n: usize) -> usize {
    align_up(n) - n
}

/// Fixed-capacity, word-aligned byte buffer with a shared read/write cursor.
///
/// Invariant: `offset <= capacity`. Operations that would break it fail
/// before committing anything.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl ByteBuffer {
    /// Allocate a zero-filled buffer. Capacity is rounded up to a multiple of 8.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; align_up(capacity)],
            offset: 0,
        }
    }

    /// Allocate a buffer holding a copy of `bytes`, cursor at 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = vec![0u8; align_up(bytes.len())];
        data[..bytes.len()].copy_from_slice(bytes);
        Self { data, offset: 0 }
    }

    /// Allocate a buffer of `length` bytes and fill it from `reader`.
    ///
    /// The cursor is left at 0. A short read leaves the tail zeroed.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R, length: usize) -> BufferResult<Self> {
        let mut buf = Self::new(length);
        buf.read_from(reader, length)?;
        buf.offset = 0;
        Ok(buf)
    }

    /// Allocated size in bytes (always a multiple of 8).
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// The full buffer content, independent of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return its content.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Move the cursor to `position`.
    pub fn seek(&mut self, position: usize) -> BufferResult<()> {
        if position > self.data.len() {
            return Err(BufferError::OutOfRange {
                position: position as i128,
                capacity: self.data.len(),
            });
        }
        self.offset = position;
        Ok(())
    }

    /// Move the cursor by `delta` bytes, forwards or backwards.
    pub fn seek_relative(&mut self, delta: i64) -> BufferResult<()> {
        let target = self.offset as i128 + delta as i128;
        if target < 0 || target > self.data.len() as i128 {
            return Err(BufferError::OutOfRange {
                position: target,
                capacity: self.data.len(),
            });
        }
        self.offset = target as usize;
        Ok(())
    }

    /// Advance the cursor to the next word boundary (no-op when already aligned).
    pub fn align(&mut self) -> BufferResult<()> {
        self.seek(align_up(self.offset))
    }

    fn ensure(&self, requested: usize) -> BufferResult<()> {
        let available = self.remaining();
        if requested > available {
            return Err(BufferError::BufferOverflow {
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Copy `bytes` at the cursor and advance past them.
    pub fn write(&mut self, bytes: &[u8]) -> BufferResult<()> {
        self.ensure(bytes.len())?;
        let end = self.offset + bytes.len();
        self.data[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
        Ok(())
    }

    /// Copy the full content of another buffer at the cursor.
    pub fn write_buffer(&mut self, other: &ByteBuffer) -> BufferResult<()> {
        self.write(other.as_bytes())
    }

    /// Write `count` zero bytes.
    pub fn write_zeros(&mut self, count: usize) -> BufferResult<()> {
        self.ensure(count)?;
        let end = self.offset + count;
        self.data[self.offset..end].fill(0);
        self.offset = end;
        Ok(())
    }

    /// Replace the content with `bytes` (rest zeroed) and rewind to 0.
    pub fn set(&mut self, bytes: &[u8]) -> BufferResult<()> {
        if bytes.len() > self.data.len() {
            return Err(BufferError::BufferOverflow {
                requested: bytes.len(),
                available: self.data.len(),
            });
        }
        self.data.fill(0);
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        Ok(())
    }

    /// Read `count` bytes from the cursor.
    pub fn read(&mut self, count: usize) -> BufferResult<Vec<u8>> {
        self.raw_read(count, false)
    }

    /// Read `count` bytes from the cursor.
    ///
    /// With `strip_terminator` the returned bytes are truncated at the first
    /// zero byte within the span. The cursor always advances by `count`.
    pub fn raw_read(&mut self, count: usize, strip_terminator: bool) -> BufferResult<Vec<u8>> {
        self.ensure(count)?;
        let end = self.offset + count;
        let mut span = &self.data[self.offset..end];
        if strip_terminator {
            if let Some(nul) = span.iter().position(|&b| b == 0) {
                span = &span[..nul];
            }
        }
        let out = span.to_vec();
        self.offset = end;
        Ok(out)
    }

    /// Read exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> BufferResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.offset += N;
        Ok(out)
    }

    /// Return the byte at the cursor without moving it.
    pub fn peek_u8(&self) -> BufferResult<u8> {
        self.ensure(1)?;
        Ok(self.data[self.offset])
    }

    /// Write a group of little-endian integers in one call.
    ///
    /// The whole group is checked against capacity before anything is written.
    pub fn pack(&mut self, fields: &[Packed]) -> BufferResult<()> {
        let total: usize = fields.iter().map(Packed::width).sum();
        self.ensure(total)?;
        for field in fields {
            let end = self.offset + field.width();
            field.write_le(&mut self.data[self.offset..end]);
            self.offset = end;
        }
        Ok(())
    }

    /// Decode one little-endian unsigned integer of `width` bytes (1, 2, 4 or 8).
    pub fn read_uint(&mut self, width: usize) -> BufferResult<u64> {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(BufferError::UnsupportedWidth(width));
        }
        self.ensure(width)?;
        let mut le = [0u8; 8];
        le[..width].copy_from_slice(&self.data[self.offset..self.offset + width]);
        self.offset += width;
        Ok(u64::from_le_bytes(le))
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> BufferResult<u8> {
        Ok(u8::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u16`.
    pub fn read_u16(&mut self) -> BufferResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> BufferResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&mut self) -> BufferResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// SHA-1 digest of the full content as a new 20-byte (24 allocated) buffer.
    pub fn hash(&self) -> ByteBuffer {
        ByteBuffer::from_bytes(self.digest().as_bytes())
    }

    /// SHA-1 digest of the full content, independent of the cursor.
    pub fn digest(&self) -> ContentHash {
        ContentHash::digest(&self.data)
    }

    /// Copy up to `length` bytes from `reader` into the buffer at the cursor.
    ///
    /// Capacity for the full `length` is checked up front. End of stream is
    /// not an error; the number of bytes actually read is returned and the
    /// cursor advances by that amount. On I/O failure nothing is committed.
    pub fn read_from<R: Read + ?Sized>(&mut self, reader: &mut R, length: usize) -> BufferResult<usize> {
        self.ensure(length)?;
        let mut chunk = Vec::with_capacity(length);
        reader.take(length as u64).read_to_end(&mut chunk)?;
        let end = self.offset + chunk.len();
        self.data[self.offset..end].copy_from_slice(&chunk);
        self.offset = end;
        Ok(chunk.len())
    }

    /// Write the full buffer content to `writer`.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> BufferResult<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("capacity", &self.data.len())
            .field("offset", &self.offset)
            .finish()
    }
}
