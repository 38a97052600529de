//! Block costing and emission.
//!
//! A block is a run of [`Token`]s plus the raw bytes they cover. For every
//! block the encoder computes the exact size in bits of all three encodings
//! and writes the smallest:
//!
//! - **Stored**: header, padding to a byte boundary, LEN/NLEN, raw bytes.
//! - **Fixed**: RFC 1951 fixed codes, no table.
//! - **Dynamic**: codes built from the block's own frequencies, sent as a
//!   run-length coded table of code lengths.

use crate::huffman::{canonical_codes, huffman_generate};
use crate::tables::{
    CODE_LENGTH_ORDER, DeflateVariant, END_OF_BLOCK, LEN_START, MAX_CODE_LENGTH,
    MAX_LEVEL_CODE_LENGTH, MAX_LITLEN_USED, NUM_DIST_SYMBOLS, NUM_LEVEL_SYMBOLS,
    distance_to_code, fixed_distance_lengths, fixed_litlen_lengths, length_to_slot,
};
use oxiflate_core::BitWriter;
use oxiflate_core::error::Result;
use std::io::Write;

/// Largest payload of one stored block.
pub const MAX_STORED_BLOCK: usize = 0xFFFF;

/// Block header: final flag plus two type bits.
const HEADER_BITS: u64 = 3;

/// One LZ77 output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference of `len` bytes, `dist` bytes back (1-based).
    Match {
        /// Match length (3-258).
        len: u16,
        /// Distance (1-65536).
        dist: u32,
    },
}

impl Token {
    /// Uncompressed bytes covered.
    #[inline]
    pub fn covered(&self) -> usize {
        match *self {
            Self::Literal(_) => 1,
            Self::Match { len, .. } => len as usize,
        }
    }
}

/// Encoding chosen for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Raw bytes.
    Stored,
    /// Fixed Huffman codes.
    Fixed,
    /// Per-block Huffman codes.
    Dynamic,
}

/// Symbol frequencies of a token run.
#[derive(Debug, Clone)]
pub struct BlockStats {
    /// Literal/length frequencies, end-of-block included.
    pub litlen: [u32; MAX_LITLEN_USED],
    /// Distance code frequencies.
    pub dist: [u32; NUM_DIST_SYMBOLS],
    /// Length and distance extra bits, which cost the same under any table.
    pub extra_bits: u64,
}

impl BlockStats {
    /// Count the symbols `tokens` will produce.
    pub fn from_tokens(tokens: &[Token], variant: DeflateVariant) -> Self {
        let mut stats = Self {
            litlen: [0; MAX_LITLEN_USED],
            dist: [0; NUM_DIST_SYMBOLS],
            extra_bits: 0,
        };
        for token in tokens {
            match *token {
                Token::Literal(b) => stats.litlen[b as usize] += 1,
                Token::Match { len, dist } => {
                    let (slot, len_bits, _) = length_to_slot(len as usize, variant);
                    let (code, dist_bits, _) = distance_to_code(dist as usize);
                    stats.litlen[LEN_START as usize + slot] += 1;
                    stats.dist[code] += 1;
                    stats.extra_bits += len_bits as u64 + dist_bits as u64;
                }
            }
        }
        stats.litlen[END_OF_BLOCK as usize] = 1;
        stats
    }

    fn symbol_bits(&self, litlen_lens: &[u8], dist_lens: &[u8]) -> u64 {
        let lit: u64 = self
            .litlen
            .iter()
            .zip(litlen_lens)
            .map(|(&f, &l)| f as u64 * l as u64)
            .sum();
        let dist: u64 = self
            .dist
            .iter()
            .zip(dist_lens)
            .map(|(&f, &l)| f as u64 * l as u64)
            .sum();
        lit + dist + self.extra_bits
    }
}

/// Extra bits carried by code-length symbols 16, 17 and 18.
#[inline]
fn level_extra_bits(symbol: u8) -> u8 {
    match symbol {
        16 => 2,
        17 => 3,
        18 => 7,
        _ => 0,
    }
}

/// Run-length code a sequence of code lengths as `(symbol, extra)` pairs.
fn rle_code_lengths(lengths: &[u8]) -> Vec<(u8, u8)> {
    let mut out = Vec::with_capacity(lengths.len());
    let mut i = 0;
    while i < lengths.len() {
        let value = lengths[i];
        let run = lengths[i..].iter().take_while(|&&l| l == value).count();
        let mut left = run;
        if value == 0 {
            while left >= 11 {
                let take = left.min(138);
                out.push((18, (take - 11) as u8));
                left -= take;
            }
            if left >= 3 {
                out.push((17, (left - 3) as u8));
                left = 0;
            }
        } else {
            out.push((value, 0));
            left -= 1;
            while left >= 3 {
                let take = left.min(6);
                out.push((16, (take - 3) as u8));
                left -= take;
            }
        }
        out.extend(std::iter::repeat_n((value, 0), left));
        i += run;
    }
    out
}

/// Per-block Huffman tables and their serialized header.
#[derive(Debug, Clone)]
pub struct DynamicTables {
    litlen_codes: Vec<u16>,
    litlen_lens: Vec<u8>,
    dist_codes: Vec<u16>,
    dist_lens: Vec<u8>,
    num_litlen: usize,
    num_dist: usize,
    num_levels: usize,
    level_codes: Vec<u16>,
    level_lens: Vec<u8>,
    rle: Vec<(u8, u8)>,
}

impl DynamicTables {
    /// Build tables for `stats`.
    pub fn build(stats: &BlockStats) -> Self {
        let (litlen_codes, litlen_lens) = huffman_generate(&stats.litlen, MAX_CODE_LENGTH);
        let (dist_codes, dist_lens) = huffman_generate(&stats.dist, MAX_CODE_LENGTH);

        let num_litlen = 257 + litlen_lens[257..]
            .iter()
            .rposition(|&l| l != 0)
            .map_or(0, |p| p + 1);
        let num_dist = dist_lens.iter().rposition(|&l| l != 0).map_or(1, |p| p + 1);

        let mut all = Vec::with_capacity(num_litlen + num_dist);
        all.extend_from_slice(&litlen_lens[..num_litlen]);
        all.extend_from_slice(&dist_lens[..num_dist]);
        let rle = rle_code_lengths(&all);

        let mut level_freqs = [0u32; NUM_LEVEL_SYMBOLS];
        for &(symbol, _) in &rle {
            level_freqs[symbol as usize] += 1;
        }
        let (level_codes, level_lens) = huffman_generate(&level_freqs, MAX_LEVEL_CODE_LENGTH);
        let num_levels = 4 + CODE_LENGTH_ORDER[4..]
            .iter()
            .rposition(|&s| level_lens[s] != 0)
            .map_or(0, |p| p + 1);

        Self {
            litlen_codes,
            litlen_lens,
            dist_codes,
            dist_lens,
            num_litlen,
            num_dist,
            num_levels,
            level_codes,
            level_lens,
            rle,
        }
    }

    /// Code lengths of the literal/length alphabet.
    pub fn litlen_lengths(&self) -> &[u8] {
        &self.litlen_lens
    }

    /// Code lengths of the distance alphabet.
    pub fn dist_lengths(&self) -> &[u8] {
        &self.dist_lens
    }

    /// Size of the table header in bits (block header excluded).
    pub fn header_bits(&self) -> u64 {
        let rle_bits: u64 = self
            .rle
            .iter()
            .map(|&(s, _)| self.level_lens[s as usize] as u64 + level_extra_bits(s) as u64)
            .sum();
        5 + 5 + 4 + 3 * self.num_levels as u64 + rle_bits
    }

    /// Exact block size in bits for `stats` coded with these tables.
    pub fn block_bits(&self, stats: &BlockStats) -> u64 {
        HEADER_BITS + self.header_bits() + stats.symbol_bits(&self.litlen_lens, &self.dist_lens)
    }

    fn write_header<W: Write>(&self, writer: &mut BitWriter<W>) -> Result<()> {
        writer.write_bits((self.num_litlen - 257) as u32, 5)?;
        writer.write_bits((self.num_dist - 1) as u32, 5)?;
        writer.write_bits((self.num_levels - 4) as u32, 4)?;
        for &symbol in &CODE_LENGTH_ORDER[..self.num_levels] {
            writer.write_bits(self.level_lens[symbol] as u32, 3)?;
        }
        for &(symbol, extra) in &self.rle {
            let s = symbol as usize;
            writer.write_bits(self.level_codes[s] as u32, self.level_lens[s])?;
            writer.write_bits(extra as u32, level_extra_bits(symbol))?;
        }
        Ok(())
    }
}

/// Size in bits of a stored block of `len` bytes whose header starts at
/// bit `bit_offset % 8` of a byte.
pub fn stored_bits(len: usize, bit_offset: u64) -> u64 {
    let pad = (8 - (bit_offset + HEADER_BITS) % 8) % 8;
    HEADER_BITS + pad + 32 + 8 * len as u64
}

/// Size in bits of `stats` coded with the fixed tables.
pub fn fixed_bits(stats: &BlockStats) -> u64 {
    HEADER_BITS + stats.symbol_bits(&fixed_litlen_lengths(), &fixed_distance_lengths())
}

/// Size in bits of the cheaper Huffman encoding, fixed or dynamic.
pub fn huffman_bits(tokens: &[Token], variant: DeflateVariant) -> u64 {
    let stats = BlockStats::from_tokens(tokens, variant);
    fixed_bits(&stats).min(DynamicTables::build(&stats).block_bits(&stats))
}

/// The cheapest encoding of a block.
#[derive(Debug, Clone)]
pub struct BlockChoice {
    /// Encoding to use.
    pub kind: BlockKind,
    /// Block size in bits.
    pub bits: u64,
    tables: Option<DynamicTables>,
}

/// Price all three encodings and pick the smallest.
///
/// Stored is only considered when `raw_len` fits one stored block.
pub fn choose_block(
    tokens: &[Token],
    raw_len: usize,
    variant: DeflateVariant,
    bit_offset: u64,
) -> BlockChoice {
    let stats = BlockStats::from_tokens(tokens, variant);
    let tables = DynamicTables::build(&stats);
    let dynamic = tables.block_bits(&stats);
    let fixed = fixed_bits(&stats);

    let mut choice = if dynamic < fixed {
        BlockChoice {
            kind: BlockKind::Dynamic,
            bits: dynamic,
            tables: Some(tables),
        }
    } else {
        BlockChoice {
            kind: BlockKind::Fixed,
            bits: fixed,
            tables: None,
        }
    };
    if raw_len <= MAX_STORED_BLOCK {
        let stored = stored_bits(raw_len, bit_offset);
        if stored <= choice.bits {
            choice = BlockChoice {
                kind: BlockKind::Stored,
                bits: stored,
                tables: None,
            };
        }
    }
    choice
}

/// Write one block.
///
/// `raw` must be exactly the bytes `tokens` decode to.
pub fn write_block<W: Write>(
    writer: &mut BitWriter<W>,
    tokens: &[Token],
    raw: &[u8],
    choice: &BlockChoice,
    is_final: bool,
    variant: DeflateVariant,
) -> Result<()> {
    debug_assert_eq!(
        tokens.iter().map(Token::covered).sum::<usize>(),
        raw.len(),
        "tokens do not cover the block"
    );
    match (choice.kind, &choice.tables) {
        (BlockKind::Stored, _) => write_stored(writer, raw, is_final),
        (BlockKind::Dynamic, Some(tables)) => {
            writer.write_bit(is_final)?;
            writer.write_bits(2, 2)?;
            tables.write_header(writer)?;
            write_symbols(
                writer,
                tokens,
                (tables.litlen_codes.as_slice(), tables.litlen_lens.as_slice()),
                (tables.dist_codes.as_slice(), tables.dist_lens.as_slice()),
                variant,
            )
        }
        _ => {
            let litlen_lens = fixed_litlen_lengths();
            let dist_lens = fixed_distance_lengths();
            writer.write_bit(is_final)?;
            writer.write_bits(1, 2)?;
            write_symbols(
                writer,
                tokens,
                (canonical_codes(&litlen_lens).as_slice(), &litlen_lens[..]),
                (canonical_codes(&dist_lens).as_slice(), &dist_lens[..]),
                variant,
            )
        }
    }
}

/// Write a stored block. `raw` must fit one block.
pub fn write_stored<W: Write>(writer: &mut BitWriter<W>, raw: &[u8], is_final: bool) -> Result<()> {
    debug_assert!(raw.len() <= MAX_STORED_BLOCK);
    let len = raw.len() as u16;
    writer.write_bit(is_final)?;
    writer.write_bits(0, 2)?;
    writer.align_to_byte()?;
    writer.write_bits(len as u32, 16)?;
    writer.write_bits(!len as u32, 16)?;
    writer.write_bytes(raw)
}

fn write_symbols<W: Write>(
    writer: &mut BitWriter<W>,
    tokens: &[Token],
    (litlen_codes, litlen_lens): (&[u16], &[u8]),
    (dist_codes, dist_lens): (&[u16], &[u8]),
    variant: DeflateVariant,
) -> Result<()> {
    for token in tokens {
        match *token {
            Token::Literal(b) => {
                let s = b as usize;
                writer.write_bits(litlen_codes[s] as u32, litlen_lens[s])?;
            }
            Token::Match { len, dist } => {
                let (slot, len_bits, len_extra) = length_to_slot(len as usize, variant);
                let s = LEN_START as usize + slot;
                writer.write_bits(litlen_codes[s] as u32, litlen_lens[s])?;
                writer.write_bits(len_extra, len_bits)?;
                let (code, dist_bits, dist_extra) = distance_to_code(dist as usize);
                writer.write_bits(dist_codes[code] as u32, dist_lens[code])?;
                writer.write_bits(dist_extra, dist_bits)?;
            }
        }
    }
    let eob = END_OF_BLOCK as usize;
    writer.write_bits(litlen_codes[eob] as u32, litlen_lens[eob])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::inflate;

    fn tokens_for(text: &[u8]) -> Vec<Token> {
        text.iter().map(|&b| Token::Literal(b)).collect()
    }

    fn encode_one(tokens: &[Token], raw: &[u8], kind: Option<BlockKind>) -> (Vec<u8>, BlockChoice) {
        let mut choice = choose_block(tokens, raw.len(), DeflateVariant::Deflate, 0);
        if let Some(kind) = kind {
            let stats = BlockStats::from_tokens(tokens, DeflateVariant::Deflate);
            choice = BlockChoice {
                kind,
                bits: 0,
                tables: (kind == BlockKind::Dynamic).then(|| DynamicTables::build(&stats)),
            };
        }
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        write_block(&mut writer, tokens, raw, &choice, true, DeflateVariant::Deflate).unwrap();
        writer.finish().unwrap();
        (out, choice)
    }

    #[test]
    fn test_rle_code_lengths() {
        let rle = rle_code_lengths(&[0, 0, 5, 5, 5, 5, 5, 5, 5, 5, 0, 0, 0]);
        assert_eq!(rle, vec![(0, 0), (0, 0), (5, 0), (16, 3), (5, 0), (17, 0)]);

        let rle = rle_code_lengths(&[0; 150]);
        assert_eq!(rle, vec![(18, 127), (18, 1)]);

        let expanded: usize = rle_code_lengths(&[3; 20])
            .iter()
            .map(|&(s, e)| if s == 16 { e as usize + 3 } else { 1 })
            .sum();
        assert_eq!(expanded, 20);
    }

    #[test]
    fn test_every_kind_decodes() {
        let raw = b"abracadabra abracadabra";
        let mut tokens = tokens_for(&raw[..12]);
        tokens.push(Token::Match { len: 11, dist: 12 });
        for kind in [BlockKind::Stored, BlockKind::Fixed, BlockKind::Dynamic] {
            let (out, _) = encode_one(&tokens, raw, Some(kind));
            assert_eq!(inflate(&out).unwrap(), raw, "{kind:?}");
        }
    }

    #[test]
    fn test_cost_is_exact() {
        let raw: Vec<u8> = (0..400u32).map(|i| (i * i % 17) as u8 + b'a').collect();
        let mut tokens = tokens_for(&raw[..100]);
        tokens.push(Token::Match { len: 258, dist: 100 });
        tokens.extend(tokens_for(&raw[358..]));
        // The match must actually reproduce the data for decoding below.
        let mut check = raw[..100].to_vec();
        for i in 0..258 {
            check.push(check[100 + i - 100]);
        }
        check.extend_from_slice(&raw[358..]);

        for kind in [BlockKind::Fixed, BlockKind::Dynamic] {
            let stats = BlockStats::from_tokens(&tokens, DeflateVariant::Deflate);
            let expected_bits = match kind {
                BlockKind::Fixed => fixed_bits(&stats),
                _ => DynamicTables::build(&stats).block_bits(&stats),
            };
            let (out, _) = encode_one(&tokens, &check, Some(kind));
            assert_eq!(out.len() as u64, expected_bits.div_ceil(8), "{kind:?}");
            assert_eq!(inflate(&out).unwrap(), check);
        }
    }

    #[test]
    fn test_stored_chosen_for_noise() {
        let raw: Vec<u8> = (0..200u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let (out, choice) = encode_one(&tokens_for(&raw), &raw, None);
        assert_eq!(choice.kind, BlockKind::Stored);
        assert_eq!(out.len(), raw.len() + 5);
    }

    #[test]
    fn test_fixed_chosen_for_tiny_block() {
        let (out, choice) = encode_one(&tokens_for(b"hi"), b"hi", None);
        assert_eq!(choice.kind, BlockKind::Fixed);
        assert_eq!(inflate(&out).unwrap(), b"hi");
    }

    #[test]
    fn test_empty_block() {
        let (out, choice) = encode_one(&[], &[], None);
        assert_eq!(choice.kind, BlockKind::Fixed);
        assert_eq!(out, [0x03, 0x00]);
    }

    #[test]
    fn test_stored_bits_padding() {
        assert_eq!(stored_bits(10, 0), 3 + 5 + 32 + 80);
        assert_eq!(stored_bits(0, 5), 3 + 0 + 32);
        assert_eq!(stored_bits(0, 6), 3 + 7 + 32);
    }
}
