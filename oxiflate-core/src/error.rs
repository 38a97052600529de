//! Error types for OxiFlate operations.
//!
//! The codec distinguishes five kinds of failure:
//!
//! - **Truncation**: the input ended before the protocol was satisfied.
//! - **Corruption**: a decoded value broke a structural invariant.
//! - **I/O**: the backing reader or writer itself failed.
//! - **Out of memory**: a table or buffer could not be allocated.
//! - **Interruption**: the caller cancelled the operation.
//!
//! None of them is retried internally; they propagate to the caller as-is.

use std::io;
use thiserror::Error;

/// The main error type for OxiFlate operations.
#[derive(Debug, Error)]
pub enum OxiFlateError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input ended while bits were still being consumed.
    #[error("Truncated stream at bit position {bit_position}")]
    Truncated {
        /// Bit position at which the input ran out.
        bit_position: u64,
    },

    /// Corrupted data in the compressed stream.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid Huffman code encountered during decompression.
    #[error("Invalid Huffman code at bit position {bit_position}")]
    InvalidHuffmanCode {
        /// Bit position where the invalid code was found.
        bit_position: u64,
    },

    /// Invalid distance in an LZ77 back-reference.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Current history buffer size.
        history_size: usize,
    },

    /// A table or buffer could not be allocated.
    #[error("Out of memory allocating {what} ({bytes} bytes)")]
    OutOfMemory {
        /// What was being allocated.
        what: &'static str,
        /// Requested size in bytes.
        bytes: usize,
    },

    /// The operation was cancelled through an [`Interrupt`](crate::progress::Interrupt).
    #[error("Operation interrupted")]
    Interrupted,

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// A configuration property was unknown, mistyped or out of range.
    #[error("Invalid property {name}: {message}")]
    InvalidProperty {
        /// Property name as given by the caller.
        name: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Result type alias for OxiFlate operations.
pub type Result<T> = std::result::Result<T, OxiFlateError>;

impl OxiFlateError {
    /// Create a truncation error.
    pub fn truncated(bit_position: u64) -> Self {
        Self::Truncated { bit_position }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(bit_position: u64) -> Self {
        Self::InvalidHuffmanCode { bit_position }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history_size: usize) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create an out-of-memory error.
    pub fn out_of_memory(what: &'static str, bytes: usize) -> Self {
        Self::OutOfMemory { what, bytes }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create an invalid property error.
    pub fn invalid_property(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the compressed data itself is bad
    /// (truncated or corrupted), as opposed to I/O, memory or cancellation.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::CorruptedData { .. }
                | Self::InvalidHuffmanCode { .. }
                | Self::InvalidDistance { .. }
        )
    }

    /// Whether this error is a cooperative cancellation.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
