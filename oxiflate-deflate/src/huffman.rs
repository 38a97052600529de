//! Canonical Huffman coding for DEFLATE.
//!
//! # Decoding
//!
//! [`HuffmanDecoder`] keeps, per code length `len`, the left-justified 15-bit
//! upper bound `limits[len]` of all codes no longer than `len`, plus the index
//! `positions[len]` of the first symbol of that length in the sorted `symbols`
//! table. A symbol is decoded by peeking 15 bits in code order (first stream
//! bit as MSB), finding the smallest `len` with `value < limits[len]`, and
//! indexing `symbols[positions[len] + ((value - limits[len - 1]) >> (15 - len))]`.
//! Codes of up to [`TABLE_BITS`] bits resolve their length through a direct
//! lookup table instead of the scan.
//!
//! # Encoding
//!
//! [`huffman_generate`] turns symbol frequencies into length-limited code
//! lengths and LSB-first codes ready for a `BitWriter`.

use crate::tables::MAX_CODE_LENGTH;
use oxiflate_core::BitReader;
use oxiflate_core::error::{OxiFlateError, Result};
use std::io::Read;

/// Bits resolved by the fast length table.
pub const TABLE_BITS: u8 = 9;

const NUM_BITS_MAX: usize = MAX_CODE_LENGTH as usize;
const MAX_VALUE: u32 = 1 << NUM_BITS_MAX;

/// A table-driven canonical Huffman decoder.
#[derive(Debug, Clone)]
pub struct HuffmanDecoder {
    /// `limits[len]`: first left-justified code value longer than `len`.
    limits: [u32; NUM_BITS_MAX + 2],
    /// `positions[len]`: index in `symbols` of the first code of length `len`.
    positions: [u32; NUM_BITS_MAX + 1],
    /// Code length for each `TABLE_BITS`-bit prefix (0 = unassigned).
    fast_lengths: Box<[u8]>,
    /// Symbols sorted by (length, symbol).
    symbols: Vec<u16>,
    max_symbols: usize,
}

impl HuffmanDecoder {
    /// Create an empty decoder for an alphabet of `max_symbols` symbols.
    ///
    /// Every decode fails until [`set_code_lengths`](Self::set_code_lengths)
    /// succeeds.
    pub fn new(max_symbols: usize) -> Self {
        Self {
            limits: [0; NUM_BITS_MAX + 2],
            positions: [0; NUM_BITS_MAX + 1],
            fast_lengths: vec![0u8; 1 << TABLE_BITS].into_boxed_slice(),
            symbols: Vec::with_capacity(max_symbols),
            max_symbols,
        }
    }

    /// Alphabet size this decoder was created for.
    pub fn max_symbols(&self) -> usize {
        self.max_symbols
    }

    /// Number of symbols with a non-zero code length.
    pub fn num_used(&self) -> usize {
        self.symbols.len()
    }

    /// Rebuild the tables from per-symbol code lengths (0 = unused).
    ///
    /// Fails on lengths above 15, on more lengths than the alphabet holds,
    /// on over-subscribed sets, and on incomplete sets that use two or more
    /// symbols. On failure the decoder is left empty.
    pub fn set_code_lengths(&mut self, lengths: &[u8]) -> Result<()> {
        self.symbols.clear();
        self.limits = [0; NUM_BITS_MAX + 2];
        self.fast_lengths.fill(0);

        if lengths.len() > self.max_symbols {
            return Err(OxiFlateError::corrupted(
                0,
                format!(
                    "{} code lengths for an alphabet of {}",
                    lengths.len(),
                    self.max_symbols
                ),
            ));
        }

        let mut counts = [0u32; NUM_BITS_MAX + 1];
        for &len in lengths {
            if len > MAX_CODE_LENGTH {
                return Err(OxiFlateError::corrupted(
                    0,
                    format!("code length {len} exceeds {MAX_CODE_LENGTH}"),
                ));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;
        let used: u32 = counts.iter().sum();

        let mut limits = [0u32; NUM_BITS_MAX + 2];
        let mut positions = [0u32; NUM_BITS_MAX + 1];
        let mut start = 0u32;
        let mut index = 0u32;
        let shift = NUM_BITS_MAX - TABLE_BITS as usize;
        for len in 1..=NUM_BITS_MAX {
            start += counts[len] << (NUM_BITS_MAX - len);
            if start > MAX_VALUE {
                return Err(OxiFlateError::corrupted(0, "over-subscribed Huffman code"));
            }
            limits[len] = start;
            positions[len] = index;
            index += counts[len];
            if len <= TABLE_BITS as usize {
                let lo = (limits[len - 1] >> shift) as usize;
                let hi = (limits[len] >> shift) as usize;
                self.fast_lengths[lo..hi].fill(len as u8);
            }
        }
        if start != MAX_VALUE && used >= 2 {
            self.fast_lengths.fill(0);
            return Err(OxiFlateError::corrupted(0, "incomplete Huffman code"));
        }
        // Sentinel: nothing decodes past the last real limit.
        limits[NUM_BITS_MAX + 1] = MAX_VALUE;

        let mut next = positions;
        self.symbols.resize(used as usize, 0);
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut next[len as usize];
                self.symbols[*slot as usize] = symbol as u16;
                *slot += 1;
            }
        }

        self.limits = limits;
        self.positions = positions;
        Ok(())
    }

    /// Decode one symbol.
    #[inline]
    pub fn decode_symbol<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let value = reader.peek_reversed_bits(MAX_CODE_LENGTH)?;
        let len = if value < self.limits[TABLE_BITS as usize] {
            self.fast_lengths[(value >> (NUM_BITS_MAX - TABLE_BITS as usize)) as usize] as usize
        } else {
            let mut len = TABLE_BITS as usize + 1;
            while len <= NUM_BITS_MAX && value >= self.limits[len] {
                len += 1;
            }
            len
        };
        if len == 0 || len > NUM_BITS_MAX || value >= self.limits[len] {
            return Err(OxiFlateError::invalid_huffman(reader.bits_read()));
        }
        let index = self.positions[len] + ((value - self.limits[len - 1]) >> (NUM_BITS_MAX - len));
        let Some(&symbol) = self.symbols.get(index as usize) else {
            return Err(OxiFlateError::invalid_huffman(reader.bits_read()));
        };
        reader.consume_bits(len as u8)?;
        Ok(symbol)
    }
}

/// Reverse the low `length` bits of `code`.
#[inline]
pub fn reverse_bits(code: u16, length: u8) -> u16 {
    if length == 0 {
        return 0;
    }
    code.reverse_bits() >> (16 - length as u32)
}

/// Canonical LSB-first codes for a set of code lengths.
pub fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
    let mut counts = [0u16; NUM_BITS_MAX + 1];
    for &len in lengths {
        counts[len as usize] += 1;
    }
    counts[0] = 0;
    let mut next_code = [0u16; NUM_BITS_MAX + 2];
    let mut code = 0u16;
    for len in 1..=NUM_BITS_MAX {
        code = (code + counts[len - 1]) << 1;
        next_code[len] = code;
    }
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                0
            } else {
                let c = next_code[len as usize];
                next_code[len as usize] += 1;
                reverse_bits(c, len)
            }
        })
        .collect()
}

/// Tree node used while merging weights.
#[derive(Debug, Clone, Copy)]
struct Node {
    weight: u64,
    parent: usize,
}

/// Compute length-limited Huffman code lengths and their LSB-first codes.
///
/// Returns `(codes, lengths)` indexed by symbol. Symbols with zero frequency
/// get length 0, except that fewer than two used symbols are padded to two
/// 1-bit codes so the result is always a complete prefix code.
pub fn huffman_generate(freqs: &[u32], max_len: u8) -> (Vec<u16>, Vec<u8>) {
    let lengths = generate_lengths(freqs, max_len);
    (canonical_codes(&lengths), lengths)
}

fn generate_lengths(freqs: &[u32], max_len: u8) -> Vec<u8> {
    let num_symbols = freqs.len();
    let mut lengths = vec![0u8; num_symbols];

    let mut sorted: Vec<usize> = (0..num_symbols).filter(|&s| freqs[s] != 0).collect();
    sorted.sort_by_key(|&s| (freqs[s], s));

    if sorted.len() < 2 {
        let first = sorted.first().copied().unwrap_or(0);
        let second = if first == 0 { 1 } else { 0 };
        for s in [first, second] {
            if s < num_symbols {
                lengths[s] = 1;
            }
        }
        return lengths;
    }

    let n = sorted.len();
    let mut nodes: Vec<Node> = sorted
        .iter()
        .map(|&s| Node {
            weight: freqs[s] as u64,
            parent: 0,
        })
        .collect();
    nodes.reserve(n - 1);

    // Two queues: leaves in `0..n` (already sorted) and internal nodes in
    // creation order, which is also non-decreasing in weight.
    let mut leaf = 0usize;
    let mut internal = n;
    for next in n..2 * n - 1 {
        let mut pick = || {
            let take_leaf =
                leaf < n && (internal >= next || nodes[leaf].weight <= nodes[internal].weight);
            if take_leaf {
                leaf += 1;
                leaf - 1
            } else {
                internal += 1;
                internal - 1
            }
        };
        let a = pick();
        let b = pick();
        let weight = nodes[a].weight + nodes[b].weight;
        nodes[a].parent = next;
        nodes[b].parent = next;
        nodes.push(Node { weight, parent: 0 });
    }

    // Depths, root first; reuse `weight` as the depth.
    let root = 2 * n - 2;
    nodes[root].weight = 0;
    for i in (0..root).rev() {
        nodes[i].weight = nodes[nodes[i].parent].weight + 1;
    }

    let max_len = max_len.clamp(1, MAX_CODE_LENGTH) as usize;
    let mut num_at = [0u32; 64];
    for node in &nodes[..n] {
        num_at[(node.weight as usize).min(63)] += 1;
    }
    limit_lengths(&mut num_at, max_len);

    // Longest codes go to the rarest symbols.
    let mut rank = 0usize;
    for len in (1..=max_len).rev() {
        for _ in 0..num_at[len] {
            lengths[sorted[rank]] = len as u8;
            rank += 1;
        }
    }
    lengths
}

/// Fold depths above `max_len` back into a complete code of at most
/// `max_len` bits.
fn limit_lengths(num_at: &mut [u32; 64], max_len: usize) {
    for len in max_len + 1..num_at.len() {
        num_at[max_len] += num_at[len];
        num_at[len] = 0;
    }
    let mut total: u64 = (1..=max_len)
        .map(|len| (num_at[len] as u64) << (max_len - len))
        .sum();
    let target = 1u64 << max_len;
    while total > target {
        num_at[max_len] -= 1;
        for len in (1..max_len).rev() {
            if num_at[len] != 0 {
                num_at[len] -= 1;
                num_at[len + 1] += 2;
                break;
            }
        }
        total -= 1;
    }
}

/// Accumulates symbol frequencies and builds a code from them.
#[derive(Debug, Clone)]
pub struct HuffmanBuilder {
    frequencies: Vec<u32>,
    max_length: u8,
}

impl HuffmanBuilder {
    /// Create a builder for `alphabet_size` symbols and codes of at most
    /// `max_length` bits.
    pub fn new(alphabet_size: usize, max_length: u8) -> Self {
        Self {
            frequencies: vec![0; alphabet_size],
            max_length,
        }
    }

    /// Add a symbol occurrence.
    #[inline]
    pub fn add(&mut self, symbol: u16) {
        self.add_count(symbol, 1);
    }

    /// Add multiple occurrences of a symbol.
    #[inline]
    pub fn add_count(&mut self, symbol: u16, count: u32) {
        if let Some(f) = self.frequencies.get_mut(symbol as usize) {
            *f = f.saturating_add(count);
        }
    }

    /// Current frequencies.
    pub fn frequencies(&self) -> &[u32] {
        &self.frequencies
    }

    /// Reset every frequency to zero.
    pub fn clear(&mut self) {
        self.frequencies.fill(0);
    }

    /// Build code lengths from the frequencies.
    pub fn build_lengths(&self) -> Vec<u8> {
        generate_lengths(&self.frequencies, self.max_length)
    }

    /// Build `(codes, lengths)` from the frequencies.
    pub fn build(&self) -> (Vec<u16>, Vec<u8>) {
        huffman_generate(&self.frequencies, self.max_length)
    }
}
