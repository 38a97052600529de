//! MSB-first bit stream operations.
//!
//! BZip2-style containers pack codes starting from the most significant bit
//! of each byte, the opposite of DEFLATE. The API mirrors
//! [`bitstream`](crate::bitstream), including the end-of-stream rule:
//! peeking past the end yields `1` bits, consuming them is an error.

use crate::error::{OxiFlateError, Result};
use std::io::{ErrorKind, Read, Write};

/// MSB-first bit reader over any `Read` implementation.
#[derive(Debug)]
pub struct MsbBitReader<R: Read> {
    reader: R,
    input: Box<[u8]>,
    input_pos: usize,
    input_len: usize,
    eof: bool,
    /// Bit buffer; the next stream bit is bit `bits_in_buffer - 1`.
    buffer: u64,
    bits_in_buffer: u32,
    total_bits_read: u64,
}

impl<R: Read> MsbBitReader<R> {
    /// Create a new MSB bit reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            input: vec![0u8; crate::bitstream::IO_BUFFER_SIZE].into_boxed_slice(),
            input_pos: 0,
            input_len: 0,
            eof: false,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_read: 0,
        }
    }

    /// Get total bits read.
    pub fn bits_read(&self) -> u64 {
        self.total_bits_read
    }

    fn fill_buffer(&mut self, count: u32) -> Result<()> {
        while self.bits_in_buffer < count {
            if self.input_pos == self.input_len {
                if self.eof {
                    return Ok(());
                }
                match self.reader.read(&mut self.input) {
                    Ok(0) => {
                        self.eof = true;
                        return Ok(());
                    }
                    Ok(n) => {
                        self.input_pos = 0;
                        self.input_len = n;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            while self.bits_in_buffer <= 56 && self.input_pos < self.input_len {
                self.buffer = (self.buffer << 8) | self.input[self.input_pos] as u64;
                self.bits_in_buffer += 8;
                self.input_pos += 1;
            }
        }
        Ok(())
    }

    /// Peek at up to 32 bits (MSB-first). Missing bits at the end read as `1`.
    pub fn peek_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32, "Cannot peek more than 32 bits at once");
        if count == 0 {
            return Ok(0);
        }
        let count = count as u32;
        self.fill_buffer(count)?;
        let mask = (1u64 << count) - 1;
        let value = if self.bits_in_buffer >= count {
            self.buffer >> (self.bits_in_buffer - count)
        } else {
            let missing = count - self.bits_in_buffer;
            (self.buffer << missing) | ((1u64 << missing) - 1)
        };
        Ok((value & mask) as u32)
    }

    /// Read up to 32 bits (MSB-first).
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        let value = self.peek_bits(count)?;
        let count = count as u32;
        if self.bits_in_buffer < count {
            return Err(OxiFlateError::truncated(
                self.total_bits_read + self.bits_in_buffer as u64,
            ));
        }
        self.bits_in_buffer -= count;
        self.total_bits_read += count as u64;
        Ok(value)
    }
}

/// MSB-first bit writer over any `Write` implementation.
#[derive(Debug)]
pub struct MsbBitWriter<W: Write> {
    writer: W,
    buffer: u64,
    bits_in_buffer: u32,
    total_bits_written: u64,
}

impl<W: Write> MsbBitWriter<W> {
    /// Create a new MSB bit writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_written: 0,
        }
    }

    /// Total bits written, padding included.
    pub fn bits_written(&self) -> u64 {
        self.total_bits_written
    }

    /// Write the low `count` bits of `value` (up to 32), MSB first.
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<()> {
        debug_assert!(count <= 32, "Cannot write more than 32 bits at once");
        if count == 0 {
            return Ok(());
        }
        let count = count as u32;
        let mask = (1u64 << count) - 1;
        self.buffer = (self.buffer << count) | (value as u64 & mask);
        self.bits_in_buffer += count;
        self.total_bits_written += count as u64;

        let mut bytes = [0u8; 5];
        let mut n = 0;
        while self.bits_in_buffer >= 8 {
            bytes[n] = (self.buffer >> (self.bits_in_buffer - 8)) as u8;
            self.bits_in_buffer -= 8;
            n += 1;
        }
        self.writer.write_all(&bytes[..n])?;
        Ok(())
    }

    /// Pad the last byte with zeros and flush the writer.
    pub fn flush(&mut self) -> Result<()> {
        if self.bits_in_buffer > 0 {
            let pad = 8 - self.bits_in_buffer;
            self.write_bits(0, pad as u8)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_msb_roundtrip() {
        let mut data = Vec::new();
        let mut writer = MsbBitWriter::new(&mut data);
        writer.write_bits(0b101, 3).unwrap();
        writer.write_bits(0b1100, 4).unwrap();
        writer.write_bits(0xFF, 8).unwrap();
        writer.write_bits(0x12345, 20).unwrap();
        writer.finish().unwrap();

        let mut reader = MsbBitReader::new(Cursor::new(&data));
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(20).unwrap(), 0x12345);
    }

    #[test]
    fn test_msb_byte_order() {
        let mut data = Vec::new();
        let mut writer = MsbBitWriter::new(&mut data);
        writer.write_bits(0b1, 1).unwrap();
        writer.write_bits(0xAB, 8).unwrap();
        writer.finish().unwrap();
        // 1 1010101 | 1 0000000
        assert_eq!(data, vec![0xD5, 0x80]);
    }

    #[test]
    fn test_msb_eof_semantics() {
        let mut reader = MsbBitReader::new(Cursor::new(vec![0x00]));
        assert_eq!(reader.peek_bits(10).unwrap(), 0b00000000_11);
        assert_eq!(reader.read_bits(8).unwrap(), 0);
        assert!(matches!(
            reader.read_bits(1),
            Err(OxiFlateError::Truncated { .. })
        ));
    }
}
