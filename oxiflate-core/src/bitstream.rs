//! LSB-first bit I/O for DEFLATE streams.
//!
//! `BitReader` pulls bytes from any `Read` through an internal input buffer
//! and serves bits out of a 64-bit accumulator. `BitWriter` does the reverse,
//! staging finished bytes before handing them to the sink.
//!
//! # End of stream
//!
//! Peeking past the end of the input never fails: the missing bits read as
//! `1`. Only *consuming* bits that do not exist is an error
//! ([`OxiFlateError::Truncated`]). This lets a Huffman decoder peek a full
//! 15-bit window even when the last code in the stream is shorter.
//!
//! # Example
//!
//! ```
//! use oxiflate_core::bitstream::{BitReader, BitWriter};
//! use std::io::Cursor;
//!
//! let mut output = Vec::new();
//! let mut writer = BitWriter::new(&mut output);
//! writer.write_bits(0b101, 3).unwrap();
//! writer.write_bits(0b1100, 4).unwrap();
//! writer.flush().unwrap();
//! drop(writer);
//!
//! let mut reader = BitReader::new(Cursor::new(&output));
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
//! ```

use crate::error::{OxiFlateError, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the internal input and output staging buffers.
pub const IO_BUFFER_SIZE: usize = 1 << 16;

/// Largest bit count accepted by `peek_bits` / `read_bits` / `write_bits`.
pub const MAX_BITS_PER_CALL: u8 = 32;

/// A buffered LSB-first bit reader over any `Read` implementation.
#[derive(Debug)]
pub struct BitReader<R: Read> {
    reader: R,
    /// Raw bytes fetched from `reader` but not yet shifted into `bit_buf`.
    input: Box<[u8]>,
    input_pos: usize,
    input_len: usize,
    /// Set once `reader` returned 0.
    eof: bool,
    /// Bit accumulator; the next stream bit is bit 0.
    bit_buf: u64,
    /// Number of real (non-padding) bits in `bit_buf`.
    bit_count: u32,
    /// Bits consumed so far.
    total_bits_read: u64,
}

impl<R: Read> BitReader<R> {
    /// Create a new `BitReader` wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, IO_BUFFER_SIZE)
    }

    /// Create a reader with a specific input buffer size (at least 8 bytes).
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            input: vec![0u8; capacity.max(8)].into_boxed_slice(),
            input_pos: 0,
            input_len: 0,
            eof: false,
            bit_buf: 0,
            bit_count: 0,
            total_bits_read: 0,
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume this `BitReader` and return the underlying reader.
    ///
    /// Buffered but unconsumed bytes are lost; fetch them first with
    /// [`unused_input`](Self::unused_input) if a trailer follows.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Total number of bits consumed so far.
    pub fn bits_read(&self) -> u64 {
        self.total_bits_read
    }

    /// Number of input bytes touched by consumed bits (a partially used
    /// byte counts as consumed).
    pub fn bytes_consumed(&self) -> u64 {
        self.total_bits_read.div_ceil(8)
    }

    /// Whether the backing reader is exhausted and every real bit is consumed.
    pub fn is_exhausted(&mut self) -> Result<bool> {
        self.refill(1)?;
        Ok(self.bit_count == 0)
    }

    /// Bytes that were fetched from the backing reader but lie past the
    /// last consumed byte.
    pub fn unused_input(&self) -> Vec<u8> {
        let skip = self.bit_count % 8;
        let whole = self.bit_count / 8;
        let mut out = Vec::with_capacity(whole as usize + self.input_len - self.input_pos);
        let mut acc = self.bit_buf >> skip;
        for _ in 0..whole {
            out.push(acc as u8);
            acc >>= 8;
        }
        out.extend_from_slice(&self.input[self.input_pos..self.input_len]);
        out
    }

    /// Fetch the next chunk of raw input. Returns `false` at end of stream.
    fn fetch_input(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        loop {
            match self.reader.read(&mut self.input) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.input_pos = 0;
                    self.input_len = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    self.eof = true;
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Shift bytes into the accumulator until it holds at least `count`
    /// real bits or the input runs dry.
    #[inline]
    fn refill(&mut self, count: u32) -> Result<()> {
        while self.bit_count < count {
            if self.input_pos == self.input_len && !self.fetch_input()? {
                break;
            }
            // Bulk path: eight bytes at once into an empty accumulator.
            if self.bit_count == 0 && self.input_len - self.input_pos >= 8 {
                let mut word = [0u8; 8];
                word.copy_from_slice(&self.input[self.input_pos..self.input_pos + 8]);
                self.bit_buf = u64::from_le_bytes(word);
                self.bit_count = 64;
                self.input_pos += 8;
                continue;
            }
            while self.bit_count <= 56 && self.input_pos < self.input_len {
                self.bit_buf |= (self.input[self.input_pos] as u64) << self.bit_count;
                self.bit_count += 8;
                self.input_pos += 1;
            }
        }
        Ok(())
    }

    /// Peek at up to 32 bits without consuming them.
    ///
    /// Bits beyond the end of the stream read as `1`.
    #[inline]
    pub fn peek_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= MAX_BITS_PER_CALL, "Cannot peek more than 32 bits at once");
        if count == 0 {
            return Ok(0);
        }
        let count = count as u32;
        self.refill(count)?;
        let mask = (1u64 << count) - 1;
        let bits = if self.bit_count >= count {
            self.bit_buf
        } else {
            self.bit_buf | (u64::MAX << self.bit_count)
        };
        Ok((bits & mask) as u32)
    }

    /// Peek at `count` bits with their order mirrored, so the first bit in
    /// the stream becomes the most significant bit of the result.
    #[inline]
    pub fn peek_reversed_bits(&mut self, count: u8) -> Result<u32> {
        if count == 0 {
            return Ok(0);
        }
        let bits = self.peek_bits(count)?;
        Ok(bits.reverse_bits() >> (32 - count as u32))
    }

    /// Discard `count` bits. Fails if fewer real bits remain.
    #[inline]
    pub fn consume_bits(&mut self, count: u8) -> Result<()> {
        let count = count as u32;
        if count == 0 {
            return Ok(());
        }
        self.refill(count)?;
        if self.bit_count < count {
            return Err(OxiFlateError::truncated(self.total_bits_read + self.bit_count as u64));
        }
        self.bit_buf >>= count;
        self.bit_count -= count;
        self.total_bits_read += count as u64;
        Ok(())
    }

    /// Read up to 32 bits; the first stream bit lands in the LSB.
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        let value = self.peek_bits(count)?;
        self.consume_bits(count)?;
        Ok(value)
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Discard bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let remainder = self.bit_count % 8;
        if remainder > 0 {
            self.bit_buf >>= remainder;
            self.bit_count -= remainder;
            self.total_bits_read += remainder as u64;
        }
    }

    /// Read raw bytes. The reader must be byte-aligned.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(self.bit_count % 8, 0, "read_bytes on unaligned reader");
        let mut offset = 0;
        while self.bit_count >= 8 && offset < buf.len() {
            buf[offset] = self.bit_buf as u8;
            self.bit_buf >>= 8;
            self.bit_count -= 8;
            self.total_bits_read += 8;
            offset += 1;
        }
        while offset < buf.len() {
            if self.input_pos == self.input_len && !self.fetch_input()? {
                return Err(OxiFlateError::truncated(self.total_bits_read));
            }
            let n = (self.input_len - self.input_pos).min(buf.len() - offset);
            buf[offset..offset + n].copy_from_slice(&self.input[self.input_pos..self.input_pos + n]);
            self.input_pos += n;
            offset += n;
            self.total_bits_read += n as u64 * 8;
        }
        Ok(())
    }
}

/// A buffered LSB-first bit writer over any `Write` implementation.
///
/// Finished bytes are staged internally; call [`flush`](Self::flush) (or
/// [`finish`](Self::finish)) to pad the last byte and push everything out.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    writer: W,
    /// Finished bytes awaiting a write to `writer`.
    staged: Vec<u8>,
    bit_buf: u64,
    bit_count: u32,
    total_bits_written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Create a new `BitWriter` wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            staged: Vec::with_capacity(IO_BUFFER_SIZE),
            bit_buf: 0,
            bit_count: 0,
            total_bits_written: 0,
        }
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Total number of bits written so far, padding included.
    pub fn bits_written(&self) -> u64 {
        self.total_bits_written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }

    #[inline]
    fn drain_whole_bytes(&mut self) -> Result<()> {
        while self.bit_count >= 8 {
            self.staged.push(self.bit_buf as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
        if self.staged.len() >= IO_BUFFER_SIZE {
            self.writer.write_all(&self.staged)?;
            self.staged.clear();
        }
        Ok(())
    }

    /// Write the low `count` bits of `value` (up to 32), LSB first.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<()> {
        debug_assert!(count <= MAX_BITS_PER_CALL, "Cannot write more than 32 bits at once");
        if count == 0 {
            return Ok(());
        }
        let mask = if count == 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        };
        self.bit_buf |= ((value & mask) as u64) << self.bit_count;
        self.bit_count += count as u32;
        self.total_bits_written += count as u64;
        if self.bit_count >= 32 {
            self.drain_whole_bytes()?;
        }
        Ok(())
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(bit as u32, 1)
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) -> Result<()> {
        let partial = (self.bit_count % 8) as u8;
        if partial != 0 {
            self.write_bits(0, 8 - partial)?;
        }
        self.drain_whole_bytes()
    }

    /// Write raw bytes. The writer must be byte-aligned.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(self.bit_count % 8, 0, "write_bytes on unaligned writer");
        self.drain_whole_bytes()?;
        if self.bit_count != 0 {
            for &byte in buf {
                self.write_bits(byte as u32, 8)?;
            }
            return Ok(());
        }
        self.staged.extend_from_slice(buf);
        self.total_bits_written += buf.len() as u64 * 8;
        if self.staged.len() >= IO_BUFFER_SIZE {
            self.writer.write_all(&self.staged)?;
            self.staged.clear();
        }
        Ok(())
    }

    /// Pad the final byte with zeros and push all staged bytes to the
    /// underlying writer, then flush it.
    pub fn flush(&mut self) -> Result<()> {
        self.align_to_byte()?;
        if !self.staged.is_empty() {
            self.writer.write_all(&self.staged)?;
            self.staged.clear();
        }
        self.writer.flush()?;
        Ok(())
    }
}
