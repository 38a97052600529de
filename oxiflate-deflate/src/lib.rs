//! # OxiFlate Deflate
//!
//! Pure Rust DEFLATE (RFC 1951) and Deflate64 codec.
//!
//! ## Features
//!
//! - **Decompression**: stored, fixed and dynamic blocks, both variants
//!   - Streaming in bounded chunks with progress and cancellation
//!   - Optional expected output size, stopping exactly there
//!   - Two-thread pipeline ([`MtInflater`]) producing identical output
//!   - NSIS mode tolerating mismatched stored-block lengths
//! - **Compression**: match finder + bit-price parsing + block splitting
//!   - Hash-chain and binary-tree match finders (2/3/4-byte hashes)
//!   - Greedy parsing in fast mode, multi-pass optimal parsing otherwise
//!   - Each block written stored, fixed or dynamic, whichever is smallest
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//!
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: stored blocks only
//! - Level 1-4: greedy parsing over a hash chain
//! - Level 5-6: one optimal pass (default is 5)
//! - Level 7-9: several optimal passes and deeper block splitting

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod decoder;
pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod inflate_mt;
pub mod match_finder;
pub mod optimal;
pub mod props;
pub mod tables;

// Re-exports
pub use decoder::{BlockDecoder, SymbolSink};
pub use deflate::{Deflater, deflate, deflate64};
pub use huffman::{HuffmanBuilder, HuffmanDecoder, huffman_generate};
pub use inflate::{InflateOptions, Inflater, inflate, inflate_with_size, inflate64};
pub use inflate_mt::{MtInflater, inflate_mt};
pub use match_finder::{Match, MatchFinder, MatchFinderConfig, MatchFinderKind};
pub use props::{DeflateProperties, Method, PropValue};
pub use tables::DeflateVariant;
