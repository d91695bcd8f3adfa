//! Sequential bit reader over an in-memory demo buffer.
//!
//! Bits are consumed least-significant first, multi-byte values are
//! little-endian. Reads can be confined to nested chunks: inside a chunk
//! nothing past its end is readable, and [`BitReader::end_chunk`] always
//! leaves the cursor exactly at the end of the chunk, whatever the consumer
//! did with the bytes in between.

use byteorder::{ByteOrder, LittleEndian};
use smallvec::SmallVec;

use crate::traits::{ParseError, ParseResult};

/// Bit-level cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Current position in bits
    position: usize,
    /// End positions (in bits) of the open chunks, innermost last
    chunk_ends: SmallVec<[usize; 4]>,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            chunk_ends: SmallVec::new(),
        }
    }

    /// Current position in bits
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current position in whole bytes (rounded down)
    pub fn byte_position(&self) -> usize {
        self.position / 8
    }

    /// Total length of the underlying buffer in bytes
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// Bits that can still be read before the innermost limit
    pub fn remaining_bits(&self) -> usize {
        self.limit().saturating_sub(self.position)
    }

    /// Number of chunks currently open
    pub fn chunk_depth(&self) -> usize {
        self.chunk_ends.len()
    }

    fn limit(&self) -> usize {
        self.chunk_ends
            .last()
            .copied()
            .unwrap_or(self.data.len() * 8)
    }

    fn ensure(&self, bits: usize) -> ParseResult<()> {
        let available = self.remaining_bits();
        if bits > available {
            return Err(ParseError::UnexpectedEof {
                position: self.position,
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    /// Read up to 32 bits as an unsigned value
    pub fn read_bits(&mut self, count: usize) -> ParseResult<u32> {
        if count > 32 {
            return Err(ParseError::InvalidStructure(format!(
                "cannot read {} bits into a 32-bit value",
                count
            )));
        }
        self.ensure(count)?;

        // Byte-aligned fast path
        if count > 0 && self.position % 8 == 0 && count % 8 == 0 {
            let start = self.position / 8;
            let value = LittleEndian::read_uint(&self.data[start..start + count / 8], count / 8);
            self.position += count;
            return Ok(value as u32);
        }

        let mut value: u64 = 0;
        let mut read = 0;
        while read < count {
            let byte = self.data[self.position / 8];
            let offset = self.position % 8;
            let take = (8 - offset).min(count - read);
            let bits = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            value |= bits << read;
            read += take;
            self.position += take;
        }
        Ok(value as u32)
    }

    /// Read a single bit as a flag
    pub fn read_bit(&mut self) -> ParseResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read an unsigned integer of `bits` width
    pub fn read_int(&mut self, bits: usize) -> ParseResult<u32> {
        self.read_bits(bits)
    }

    /// Read a two's complement signed integer of `bits` width
    pub fn read_signed_int(&mut self, bits: usize) -> ParseResult<i32> {
        let raw = self.read_bits(bits)?;
        if bits == 0 {
            return Ok(0);
        }
        let shift = 32 - bits as u32;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Read one byte
    pub fn read_single_byte(&mut self) -> ParseResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Read `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> ParseResult<Vec<u8>> {
        self.ensure(count * 8)?;
        if self.position % 8 == 0 {
            let start = self.position / 8;
            self.position += count * 8;
            return Ok(self.data[start..start + count].to_vec());
        }
        (0..count).map(|_| self.read_single_byte()).collect()
    }

    /// Read an IEEE-754 single precision float
    pub fn read_float(&mut self) -> ParseResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    /// Read a NUL-terminated string stored in a fixed `capacity`-byte field.
    ///
    /// Always consumes exactly `capacity` bytes. Without a terminator the
    /// whole field is the string.
    pub fn read_cstring(&mut self, capacity: usize) -> ParseResult<String> {
        let bytes = self.read_bytes(capacity)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Skip `count` bits
    pub fn skip_bits(&mut self, count: usize) -> ParseResult<()> {
        self.ensure(count)?;
        self.position += count;
        Ok(())
    }

    /// Skip `count` bytes
    pub fn skip_bytes(&mut self, count: usize) -> ParseResult<()> {
        self.skip_bits(count * 8)
    }

    /// Open a chunk of `length` bits starting at the current position
    pub fn begin_chunk(&mut self, length: usize) -> ParseResult<()> {
        self.ensure(length)?;
        self.chunk_ends.push(self.position + length);
        Ok(())
    }

    /// Read a signed 32-bit byte length and open a chunk of that size
    pub fn begin_sized_chunk(&mut self) -> ParseResult<usize> {
        let length = self.read_signed_int(32)?;
        if length < 0 {
            return Err(ParseError::InvalidStructure(format!(
                "negative chunk length {} at bit {}",
                length, self.position
            )));
        }
        let bytes = length as usize;
        self.begin_chunk(bytes * 8)?;
        Ok(bytes)
    }

    /// Close the innermost chunk, moving the cursor to its end
    pub fn end_chunk(&mut self) -> ParseResult<()> {
        let end = self.chunk_ends.pop().ok_or_else(|| {
            ParseError::InvalidStructure("end_chunk called without an open chunk".to_string())
        })?;
        if self.position > end {
            return Err(ParseError::ChunkOverrun {
                position: self.position,
                end,
            });
        }
        self.position = end;
        Ok(())
    }

    /// Whether the innermost chunk (or the buffer) has been fully consumed
    pub fn chunk_finished(&self) -> bool {
        self.remaining_bits() == 0
    }
}
