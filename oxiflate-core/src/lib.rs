//! # OxiFlate Core
//!
//! Core components for the OxiFlate DEFLATE / Deflate64 codec.
//!
//! - [`bitstream`]: LSB-first bit I/O (DEFLATE bit order)
//! - [`bitstream_msb`]: MSB-first bit I/O (BZip2 bit order)
//! - [`ringbuffer`]: Sliding window history that writes through to a sink
//! - [`crc`]: CRC-32
//! - [`progress`]: Progress callbacks and cancellation
//! - [`traits`]: Codec traits and stream statistics
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L2: Codec (oxiflate-deflate)                            │
//! │     Huffman tables, match finder, block coder          │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: BitStream (this crate)                              │
//! │     BitReader/BitWriter, RingBuffer, CRC               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_core::bitstream::BitReader;
//! use oxiflate_core::crc::Crc32;
//! use std::io::Cursor;
//!
//! let mut reader = BitReader::new(Cursor::new(vec![0xAB, 0xCD]));
//! assert_eq!(reader.read_bits(12).unwrap(), 0xDAB);
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod bitstream_msb;
pub mod crc;
pub mod error;
pub mod progress;
pub mod ringbuffer;
pub mod traits;

pub use bitstream::{BitReader, BitWriter};
pub use bitstream_msb::{MsbBitReader, MsbBitWriter};
pub use crc::{Crc32, CrcReader, CrcWriter};
pub use error::{OxiFlateError, Result};
pub use progress::{Interrupt, NoProgress, Progress};
pub use ringbuffer::RingBuffer;
pub use traits::{CompressionLevel, StreamDecoder, StreamEncoder, StreamStats};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::{BitReader, BitWriter};
    pub use crate::crc::Crc32;
    pub use crate::error::{OxiFlateError, Result};
    pub use crate::progress::{Interrupt, Progress};
    pub use crate::ringbuffer::RingBuffer;
    pub use crate::traits::{CompressionLevel, StreamDecoder, StreamEncoder, StreamStats};
}
