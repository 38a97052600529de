//! Core traits and shared value types for stream codecs.

use crate::error::Result;
use std::io::{Cursor, Read, Write};

/// Totals reported by a finished encode or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Bytes consumed from the input stream.
    pub bytes_in: u64,
    /// Bytes written to the output stream.
    pub bytes_out: u64,
    /// CRC-32 of the uncompressed side.
    pub crc32: u32,
}

/// A decoder that turns a compressed stream into plain bytes.
pub trait StreamDecoder {
    /// Decode everything from `input` into `output`.
    fn decode<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W)
    -> Result<StreamStats>;

    /// Decode a complete in-memory stream.
    fn decode_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decode(&mut Cursor::new(input), &mut output)?;
        Ok(output)
    }
}

/// An encoder that turns plain bytes into a compressed stream.
pub trait StreamEncoder {
    /// Encode everything from `input` into `output`.
    fn encode<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W)
    -> Result<StreamStats>;

    /// Encode a complete in-memory buffer.
    fn encode_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.encode(&mut Cursor::new(input), &mut output)?;
        Ok(output)
    }
}

/// Compression level for algorithms that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (store only).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Default compression (balanced).
    pub const DEFAULT: Self = Self(5);
    /// Best compression (slowest).
    pub const BEST: Self = Self(9);

    /// Create a custom compression level, clamped to 0-9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
