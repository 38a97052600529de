//! Sliding window history that doubles as the decoder's output stage.
//!
//! Decoded bytes land in a power-of-two circular buffer. Whenever the write
//! position wraps, the finished window is handed to the output sink, so the
//! buffer serves both as LZ77 history and as an output staging area. The
//! sink is borrowed per call; the ring buffer never owns a stream.
//!
//! # Sizes
//!
//! - DEFLATE: 32 KiB
//! - Deflate64: 64 KiB

use crate::error::{OxiFlateError, Result};
use std::io::Write;

/// Common window sizes.
pub mod sizes {
    /// Window size for DEFLATE (32 KiB).
    pub const DEFLATE: usize = 1 << 15;
    /// Window size for Deflate64 (64 KiB).
    pub const DEFLATE64: usize = 1 << 16;
}

/// Circular history buffer with write-through to a sink.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    /// Next write index.
    pos: usize,
    /// Index up to which bytes were already handed to the sink.
    flushed: usize,
    /// Total bytes ever produced.
    total: u64,
    mask: usize,
}

impl RingBuffer {
    /// Create a ring buffer of `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "Capacity must be a power of 2, got {}",
            capacity
        );
        Self {
            buffer: vec![0; capacity],
            pos: 0,
            flushed: 0,
            total: 0,
            mask: capacity - 1,
        }
    }

    /// Ring buffer sized for DEFLATE (32 KiB).
    pub fn deflate() -> Self {
        Self::new(sizes::DEFLATE)
    }

    /// Ring buffer sized for Deflate64 (64 KiB).
    pub fn deflate64() -> Self {
        Self::new(sizes::DEFLATE64)
    }

    /// Window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of history available for back-references.
    pub fn len(&self) -> usize {
        self.total.min(self.buffer.len() as u64) as usize
    }

    /// Whether nothing has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Total bytes produced since creation or the last [`clear`](Self::clear).
    pub fn total_out(&self) -> u64 {
        self.total
    }

    /// Bytes produced but not yet handed to a sink.
    pub fn pending(&self) -> usize {
        self.pos - self.flushed
    }

    /// Forget all history. Pending bytes are discarded, not flushed.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.flushed = 0;
        self.total = 0;
    }

    #[inline]
    fn wrap_if_full<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        if self.pos == self.buffer.len() {
            self.flush(sink)?;
            self.pos = 0;
            self.flushed = 0;
        }
        Ok(())
    }

    /// Append one byte.
    #[inline]
    pub fn put_byte<W: Write + ?Sized>(&mut self, byte: u8, sink: &mut W) -> Result<()> {
        self.buffer[self.pos] = byte;
        self.pos += 1;
        self.total += 1;
        self.wrap_if_full(sink)
    }

    /// Append a run of bytes.
    pub fn put_bytes<W: Write + ?Sized>(&mut self, mut bytes: &[u8], sink: &mut W) -> Result<()> {
        while !bytes.is_empty() {
            let n = bytes.len().min(self.buffer.len() - self.pos);
            self.buffer[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
            self.pos += n;
            self.total += n as u64;
            bytes = &bytes[n..];
            self.wrap_if_full(sink)?;
        }
        Ok(())
    }

    /// Copy `length` bytes starting `distance` bytes back (1 = the most
    /// recent byte). Overlapping copies repeat the pattern byte by byte.
    pub fn repeat_bytes<W: Write + ?Sized>(
        &mut self,
        distance: usize,
        length: usize,
        sink: &mut W,
    ) -> Result<()> {
        if distance == 0 || distance > self.buffer.len() || distance as u64 > self.total {
            return Err(OxiFlateError::invalid_distance(distance, self.len()));
        }
        let mut remaining = length;
        while remaining > 0 {
            let src = self.pos.wrapping_sub(distance) & self.mask;
            let room = self.buffer.len() - self.pos;
            // Contiguous, non-overlapping, non-wrapping span.
            if distance >= remaining && src + remaining <= self.buffer.len() && remaining <= room {
                self.buffer.copy_within(src..src + remaining, self.pos);
                self.pos += remaining;
                self.total += remaining as u64;
                self.wrap_if_full(sink)?;
                return Ok(());
            }
            let byte = self.buffer[src];
            self.put_byte(byte, sink)?;
            remaining -= 1;
        }
        Ok(())
    }

    /// Hand every pending byte to `sink`.
    ///
    /// The sink's own `flush` is not called.
    pub fn flush<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        if self.pos > self.flushed {
            sink.write_all(&self.buffer[self.flushed..self.pos])?;
            self.flushed = self.pos;
        }
        Ok(())
    }

    /// Byte `distance` positions back (1-based).
    pub fn byte_at_distance(&self, distance: usize) -> Result<u8> {
        if distance == 0 || distance > self.len() {
            return Err(OxiFlateError::invalid_distance(distance, self.len()));
        }
        Ok(self.buffer[self.pos.wrapping_sub(distance) & self.mask])
    }

    /// The last `count` bytes produced, oldest first.
    pub fn last_bytes(&self, count: usize) -> Vec<u8> {
        let count = count.min(self.len());
        (0..count)
            .map(|i| self.buffer[self.pos.wrapping_sub(count - i) & self.mask])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_last_bytes() {
        let mut out = Vec::new();
        let mut rb = RingBuffer::new(16);
        rb.put_bytes(b"hello", &mut out).unwrap();
        assert_eq!(rb.last_bytes(3), b"llo");
        assert_eq!(rb.byte_at_distance(1).unwrap(), b'o');
        assert!(out.is_empty());
        rb.flush(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_self_overlapping_repeat() {
        let mut out = Vec::new();
        let mut rb = RingBuffer::deflate();
        rb.put_bytes(b"abc", &mut out).unwrap();
        rb.repeat_bytes(1, 5, &mut out).unwrap();
        rb.flush(&mut out).unwrap();
        assert_eq!(out, b"abcccccc");

        rb.repeat_bytes(3, 7, &mut out).unwrap();
        rb.flush(&mut out).unwrap();
        assert_eq!(out, b"abccccccccccccc");
    }

    #[test]
    fn test_wraps_and_flushes() {
        let mut out = Vec::new();
        let mut rb = RingBuffer::new(8);
        rb.put_bytes(b"0123456789", &mut out).unwrap();
        // First window was written out on wrap.
        assert_eq!(out, b"01234567");
        assert_eq!(rb.pending(), 2);
        rb.repeat_bytes(8, 4, &mut out).unwrap();
        rb.flush(&mut out).unwrap();
        assert_eq!(out, b"01234567892345");
        assert_eq!(rb.total_out(), 14);
    }

    #[test]
    fn test_invalid_distances() {
        let mut out = Vec::new();
        let mut rb = RingBuffer::new(8);
        rb.put_bytes(b"ab", &mut out).unwrap();
        assert!(rb.repeat_bytes(0, 1, &mut out).is_err());
        assert!(rb.repeat_bytes(3, 1, &mut out).is_err());
        rb.put_bytes(b"cdefghij", &mut out).unwrap();
        assert!(rb.repeat_bytes(9, 1, &mut out).is_err());
        assert!(rb.repeat_bytes(8, 1, &mut out).is_ok());
    }

    #[test]
    fn test_clear() {
        let mut out = Vec::new();
        let mut rb = RingBuffer::deflate64();
        assert_eq!(rb.capacity(), 65536);
        rb.put_byte(7, &mut out).unwrap();
        rb.clear();
        assert!(rb.is_empty());
        assert!(rb.repeat_bytes(1, 1, &mut out).is_err());
    }
}
