//! Match recording and parsing.
//!
//! The encoder works on spans of at most [`MAX_SPAN`] bytes, so that any span
//! (and every part of it) still fits one stored block. For each span the
//! match finder is run once and its candidate lists are recorded per
//! position in a [`SpanMatches`]. Parsing then turns those lists into
//! [`Token`]s, either greedily or with a shortest-path search over bit
//! prices, and can be repeated with refined prices without searching again.

use crate::block::{BlockStats, DynamicTables, MAX_STORED_BLOCK, Token};
use crate::match_finder::{Match, MatchFinder};
use crate::tables::{
    DISTANCE_EXTRA_BITS, DeflateVariant, LEN_START, MIN_MATCH, NUM_DIST_SYMBOLS,
    distance_to_code, fixed_distance_lengths, fixed_litlen_lengths, length_to_slot,
};
use oxiflate_core::error::Result;
use std::io::Read;

/// Longest span recorded before a block is emitted.
///
/// A position is only started below this limit, and the longest match
/// (258) still ends inside one stored block.
pub const MAX_SPAN: usize = MAX_STORED_BLOCK - 258;

/// Positions covered by one shortest-path search.
pub const OPT_WINDOW: usize = 1 << 12;

/// Positions searched past a window before its parse is committed.
pub const OPT_LOOKAHEAD: usize = 1 << 10;

/// Bit price assumed for a symbol the current table does not code.
const UNUSED_SYMBOL_PRICE: u32 = 13;

const INFINITE: u32 = u32::MAX;

/// Match candidates recorded for one span.
#[derive(Debug, Clone, Default)]
pub struct SpanMatches {
    bytes: Vec<u8>,
    /// `ends[i]` is the end of position `i`'s list in `matches`.
    ends: Vec<u32>,
    matches: Vec<Match>,
}

impl SpanMatches {
    /// Create an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of the span.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Candidates at position `i`, shortest first.
    pub fn matches_at(&self, i: usize) -> &[Match] {
        let start = if i == 0 { 0 } else { self.ends[i - 1] as usize };
        &self.matches[start..self.ends[i] as usize]
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.ends.clear();
        self.matches.clear();
    }

    fn push_position(&mut self, byte: u8, found: &[Match]) {
        self.bytes.push(byte);
        self.matches
            .extend(found.iter().filter(|m| m.len as usize >= MIN_MATCH));
        self.ends.push(self.matches.len() as u32);
    }

    /// Record up to [`MAX_SPAN`] positions from `mf`, reading from `reader`
    /// as needed.
    ///
    /// When the longest candidate at a position reaches `fast_bytes`, the
    /// positions it covers are inserted into the match finder without a
    /// search. Each of them is recorded with the tail of that match (same
    /// distance, `len - k` bytes at `k` past the start) as its only
    /// candidate.
    pub fn record<R: Read + ?Sized>(
        &mut self,
        mf: &mut MatchFinder,
        reader: &mut R,
        fast_bytes: usize,
    ) -> Result<()> {
        self.clear();
        let mut found = Vec::new();
        while self.bytes.len() < MAX_SPAN {
            mf.fill(reader)?;
            let Some(byte) = mf.current_byte() else {
                break;
            };
            mf.get_matches(&mut found);
            self.push_position(byte, &found);

            let Some(&longest) = found.last() else {
                continue;
            };
            if longest.len as usize >= fast_bytes.max(MIN_MATCH) {
                let skip = longest.len as usize - 1;
                for (k, &byte) in (1..).zip(&mf.lookahead()[..skip]) {
                    let tail = Match {
                        len: longest.len - k,
                        dist: longest.dist,
                    };
                    self.push_position(byte, std::slice::from_ref(&tail));
                }
                mf.skip(skip);
            }
        }
        Ok(())
    }
}

/// Bit prices of every literal, match length and distance code.
#[derive(Debug, Clone)]
pub struct Prices {
    literal: [u32; 256],
    /// Indexed by match length; extra bits included.
    length: [u32; 259],
    /// Indexed by distance code; extra bits included.
    dist_code: [u32; NUM_DIST_SYMBOLS],
}

impl Prices {
    /// Prices implied by code lengths (0 = not coded).
    pub fn from_lengths(litlen_lens: &[u8], dist_lens: &[u8], variant: DeflateVariant) -> Self {
        let price = |lens: &[u8], s: usize| match lens.get(s) {
            Some(&l) if l != 0 => l as u32,
            _ => UNUSED_SYMBOL_PRICE,
        };
        let mut prices = Self {
            literal: [0; 256],
            length: [0; 259],
            dist_code: [0; NUM_DIST_SYMBOLS],
        };
        for (s, p) in prices.literal.iter_mut().enumerate() {
            *p = price(litlen_lens, s);
        }
        for len in MIN_MATCH..=258 {
            let (slot, extra_bits, _) = length_to_slot(len, variant);
            prices.length[len] = price(litlen_lens, LEN_START as usize + slot) + extra_bits as u32;
        }
        for (code, p) in prices.dist_code.iter_mut().enumerate() {
            *p = price(dist_lens, code) + DISTANCE_EXTRA_BITS[code] as u32;
        }
        prices
    }

    /// Prices of the fixed tables.
    pub fn fixed(variant: DeflateVariant) -> Self {
        Self::from_lengths(&fixed_litlen_lengths(), &fixed_distance_lengths(), variant)
    }

    /// Prices of the dynamic tables `tokens` would get.
    pub fn for_tokens(tokens: &[Token], variant: DeflateVariant) -> Self {
        let tables = DynamicTables::build(&BlockStats::from_tokens(tokens, variant));
        Self::from_lengths(tables.litlen_lengths(), tables.dist_lengths(), variant)
    }

    /// Price of one literal.
    #[inline]
    pub fn literal(&self, byte: u8) -> u32 {
        self.literal[byte as usize]
    }

    /// Price of a match.
    #[inline]
    pub fn matched(&self, len: usize, dist: usize) -> u32 {
        self.length[len] + self.dist_code[distance_to_code(dist).0]
    }
}

/// Longest-match-first parse.
///
/// Spans recorded with `fast_bytes = MIN_MATCH` already skipped every
/// position inside a match, so this just reads the recording back.
pub fn greedy_parse(span: &SpanMatches, out: &mut Vec<Token>) {
    out.clear();
    let n = span.len();
    let mut i = 0;
    while i < n {
        match span.matches_at(i).last() {
            Some(m) if m.len as usize <= n - i => {
                out.push(Token::Match {
                    len: m.len as u16,
                    dist: m.dist,
                });
                i += m.len as usize;
            }
            _ => {
                out.push(Token::Literal(span.bytes[i]));
                i += 1;
            }
        }
    }
}

/// Cheapest parse of `span` under `prices`.
///
/// The span is searched in windows of [`OPT_WINDOW`] positions. Each search
/// also looks [`OPT_LOOKAHEAD`] positions past the window, so a match that
/// crosses the window end is kept whole: the parse is committed up to the
/// first token boundary at or past the end, and the next window starts there.
pub fn optimal_parse(span: &SpanMatches, prices: &Prices, out: &mut Vec<Token>) {
    out.clear();
    let mut cost = vec![INFINITE; OPT_WINDOW + OPT_LOOKAHEAD + 1];
    let mut step: Vec<(u16, u32)> = vec![(0, 0); OPT_WINDOW + OPT_LOOKAHEAD + 1];
    let mut reversed = Vec::with_capacity(OPT_WINDOW + OPT_LOOKAHEAD);

    let n = span.len();
    let mut start = 0;
    while start < n {
        let reach = (n - start).min(OPT_WINDOW + OPT_LOOKAHEAD);
        let commit = if reach == n - start {
            reach
        } else {
            OPT_WINDOW
        };
        cost[..=reach].fill(INFINITE);
        cost[0] = 0;

        for k in 0..reach {
            let base = cost[k];
            if base == INFINITE {
                continue;
            }
            let lit = base + prices.literal(span.bytes[start + k]);
            if lit < cost[k + 1] {
                cost[k + 1] = lit;
                step[k + 1] = (1, 0);
            }

            let room = reach - k;
            let mut len = MIN_MATCH;
            for candidate in span.matches_at(start + k) {
                let top = (candidate.len as usize).min(room);
                let dist = candidate.dist as usize;
                while len <= top {
                    let c = base + prices.matched(len, dist);
                    if c < cost[k + len] {
                        cost[k + len] = c;
                        step[k + len] = (len as u16, candidate.dist);
                    }
                    len += 1;
                }
            }
        }

        reversed.clear();
        let mut k = reach;
        while k > 0 {
            let (len, dist) = step[k];
            if len == 1 {
                reversed.push(Token::Literal(span.bytes[start + k - 1]));
            } else {
                reversed.push(Token::Match { len, dist });
            }
            k -= len as usize;
        }

        let mut end = 0;
        for &token in reversed.iter().rev() {
            if end >= commit {
                break;
            }
            out.push(token);
            end += token.covered();
        }
        start += end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_finder::{MatchFinderConfig, MatchFinderKind};
    use std::io::Cursor;

    fn record(data: &[u8], kind: MatchFinderKind, fast_bytes: usize) -> SpanMatches {
        let mut mf = MatchFinder::new(MatchFinderConfig {
            kind,
            ..MatchFinderConfig::default()
        })
        .unwrap();
        let mut span = SpanMatches::new();
        span.record(&mut mf, &mut Cursor::new(data), fast_bytes).unwrap();
        span
    }

    /// Expand tokens back into bytes.
    fn expand(tokens: &[Token]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for token in tokens {
            match *token {
                Token::Literal(b) => out.push(b),
                Token::Match { len, dist } => {
                    for _ in 0..len {
                        out.push(out[out.len() - dist as usize]);
                    }
                }
            }
        }
        out
    }

    fn sample_text(size: usize) -> Vec<u8> {
        let words: [&[u8]; 6] = [b"lorem ", b"ipsum ", b"dolor ", b"sit ", b"amet, ", b"elit "];
        let mut seed = 7u32;
        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            out.extend_from_slice(words[(seed >> 16) as usize % words.len()]);
        }
        out.truncate(size);
        out
    }

    #[test]
    fn test_record_covers_span() {
        let data = sample_text(5000);
        let span = record(&data, MatchFinderKind::BinaryTree3, 32);
        assert_eq!(span.bytes(), &data[..]);
        assert_eq!(span.ends.len(), data.len());
        for i in 0..span.len() {
            for m in span.matches_at(i) {
                let (len, dist) = (m.len as usize, m.dist as usize);
                assert!(len >= MIN_MATCH && dist <= i);
                assert_eq!(data[i..i + len], data[i - dist..i - dist + len]);
            }
        }
    }

    #[test]
    fn test_record_stops_at_span_limit() {
        let data = vec![b'x'; MAX_SPAN + 10_000];
        let mut mf = MatchFinder::new(MatchFinderConfig::default()).unwrap();
        let mut reader = Cursor::new(&data);
        let mut span = SpanMatches::new();
        span.record(&mut mf, &mut reader, 32).unwrap();
        assert!(span.len() >= MAX_SPAN && span.len() <= MAX_STORED_BLOCK);
        let first = span.len();
        span.record(&mut mf, &mut reader, 32).unwrap();
        assert_eq!(first + span.len(), data.len());
    }

    #[test]
    fn test_greedy_parse_round_trip() {
        let data = sample_text(8000);
        let span = record(&data, MatchFinderKind::HashChain3, MIN_MATCH);
        let mut tokens = Vec::new();
        greedy_parse(&span, &mut tokens);
        assert_eq!(expand(&tokens), data);
        assert!(tokens.len() < data.len() / 3);
    }

    #[test]
    fn test_optimal_parse_round_trip_and_cheaper() {
        // One search window, so every greedy match is open to the search.
        let data = sample_text(OPT_WINDOW);
        let variant = DeflateVariant::Deflate;
        let prices = Prices::fixed(variant);

        let span = record(&data, MatchFinderKind::BinaryTree3, 258);
        let mut optimal = Vec::new();
        optimal_parse(&span, &prices, &mut optimal);
        assert_eq!(expand(&optimal), data);

        let greedy_span = record(&data, MatchFinderKind::BinaryTree3, MIN_MATCH);
        let mut greedy = Vec::new();
        greedy_parse(&greedy_span, &mut greedy);

        let price_of = |tokens: &[Token]| -> u64 {
            tokens
                .iter()
                .map(|t| match *t {
                    Token::Literal(b) => prices.literal(b) as u64,
                    Token::Match { len, dist } => prices.matched(len as usize, dist as usize) as u64,
                })
                .sum()
        };
        assert!(price_of(&optimal) <= price_of(&greedy));
    }

    #[test]
    fn test_record_skipped_positions_keep_tail() {
        let data = b"abcdefgh".repeat(20);
        let span = record(&data, MatchFinderKind::HashChain3, 16);
        assert_eq!(span.matches_at(8).last(), Some(&Match { len: 152, dist: 8 }));
        assert_eq!(span.matches_at(9), &[Match { len: 151, dist: 8 }]);
        assert_eq!(span.matches_at(157), &[Match { len: 3, dist: 8 }]);
        assert!(span.matches_at(158).is_empty());
    }

    #[test]
    fn test_optimal_parse_keeps_matches_across_windows() {
        let pattern = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHI";
        let data: Vec<u8> = pattern
            .iter()
            .copied()
            .cycle()
            .take(4 * OPT_WINDOW + 300)
            .collect();
        let span = record(&data, MatchFinderKind::BinaryTree3, 128);
        let mut tokens = Vec::new();
        optimal_parse(&span, &Prices::fixed(DeflateVariant::Deflate), &mut tokens);
        assert_eq!(expand(&tokens), data);

        // One copy of the pattern as literals, then full-length matches.
        let literals = tokens
            .iter()
            .filter(|t| matches!(t, Token::Literal(_)))
            .count();
        assert_eq!(literals, pattern.len());
        assert!(tokens.len() <= pattern.len() + data.len() / 258 + 1);
    }

    #[test]
    fn test_optimal_parse_literals_only() {
        let data = b"abcdefghij";
        let span = record(data, MatchFinderKind::BinaryTree3, 32);
        let mut tokens = Vec::new();
        optimal_parse(&span, &Prices::fixed(DeflateVariant::Deflate), &mut tokens);
        assert_eq!(tokens.len(), 10);
        assert!(tokens.iter().all(|t| matches!(t, Token::Literal(_))));
    }

    #[test]
    fn test_prices_from_lengths() {
        let prices = Prices::fixed(DeflateVariant::Deflate);
        assert_eq!(prices.literal(b'a'), 8);
        assert_eq!(prices.literal(200), 9);
        // Length 3: 7-bit symbol; distance 1: 5-bit code.
        assert_eq!(prices.matched(3, 1), 12);
        // Length 258: 8-bit symbol 285; distance 32768: 5 bits + 13 extra.
        assert_eq!(prices.matched(258, 32768), 26);

        let sparse = Prices::from_lengths(&[1, 1], &[], DeflateVariant::Deflate);
        assert_eq!(sparse.literal(0), 1);
        assert_eq!(sparse.literal(9), UNUSED_SYMBOL_PRICE);
    }
}
