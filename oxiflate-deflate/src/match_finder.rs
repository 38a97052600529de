//! LZ77 match finder with hash-chain and binary-tree search.
//!
//! The finder owns a sliding byte window filled from a borrowed reader. Each
//! position is hashed (2, 3 or 4 bytes) into a head table; earlier positions
//! with the same hash are linked through `son`, either as a plain chain (HC)
//! or as a binary search tree ordered by the bytes that follow (BT).
//!
//! # Positions
//!
//! Table entries hold absolute 32-bit positions. Counting starts at
//! `cyclic_buffer_size`, so the value 0 always means "empty": its distance
//! from the current position is at least the cyclic buffer size and ends any
//! walk. When the position counter reaches the normalize limit every entry is
//! rebased by the same amount, preserving all distances.
//!
//! # Example
//!
//! ```
//! use oxiflate_deflate::match_finder::{MatchFinder, MatchFinderConfig, MatchFinderKind};
//! use std::io::Cursor;
//!
//! let mut mf = MatchFinder::new(MatchFinderConfig {
//!     kind: MatchFinderKind::BinaryTree3,
//!     ..MatchFinderConfig::default()
//! })
//! .unwrap();
//! mf.fill(&mut Cursor::new(b"abcabcabc")).unwrap();
//! let mut matches = Vec::new();
//! mf.skip(3);
//! mf.get_matches(&mut matches);
//! assert_eq!(matches.last().map(|m| (m.len, m.dist)), Some((6, 3)));
//! ```

use oxiflate_core::crc::crc32_table;
use oxiflate_core::error::{OxiFlateError, Result};
use std::io::{ErrorKind, Read};

const HASH2_SIZE: usize = 1 << 10;
const HASH3_SIZE: usize = 1 << 16;
const FIX3_HASH_OFFSET: usize = HASH2_SIZE;
const FIX4_HASH_OFFSET: usize = HASH2_SIZE + HASH3_SIZE;
const MAX_HISTORY_SIZE: u32 = 1 << 27;
const MAX_MATCH_LEN: u32 = 1 << 12;
const EMPTY: u32 = 0;

/// Search structure and hash width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchFinderKind {
    /// Hash chain over 2-byte hashes.
    HashChain2,
    /// Hash chain over 3-byte hashes.
    HashChain3,
    /// Hash chain over 4-byte hashes with 2/3-byte side tables.
    HashChain4,
    /// Binary tree over 2-byte hashes.
    BinaryTree2,
    /// Binary tree over 3-byte hashes.
    #[default]
    BinaryTree3,
    /// Binary tree over 4-byte hashes with 2/3-byte side tables.
    BinaryTree4,
}

impl MatchFinderKind {
    /// Bytes hashed per position.
    pub const fn num_hash_bytes(self) -> u32 {
        match self {
            Self::HashChain2 | Self::BinaryTree2 => 2,
            Self::HashChain3 | Self::BinaryTree3 => 3,
            Self::HashChain4 | Self::BinaryTree4 => 4,
        }
    }

    /// Whether `son` holds tree pairs rather than a chain.
    pub const fn is_binary_tree(self) -> bool {
        matches!(
            self,
            Self::BinaryTree2 | Self::BinaryTree3 | Self::BinaryTree4
        )
    }
}

/// Match finder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFinderConfig {
    /// Search structure and hash width.
    pub kind: MatchFinderKind,
    /// Largest distance reported.
    pub history_size: u32,
    /// Extra bytes kept behind the history window.
    pub keep_add_before: u32,
    /// Longest match reported.
    pub match_max_len: u32,
    /// Extra look-ahead kept beyond `match_max_len`.
    pub keep_add_after: u32,
    /// Maximum number of candidates visited per position.
    pub cut_value: u32,
}

impl Default for MatchFinderConfig {
    fn default() -> Self {
        Self {
            kind: MatchFinderKind::BinaryTree3,
            history_size: 1 << 15,
            keep_add_before: 0,
            match_max_len: 258,
            keep_add_after: 0,
            cut_value: 32,
        }
    }
}

/// One candidate match: `len` bytes at distance `dist` (1 = previous byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Match length.
    pub len: u32,
    /// 1-based distance.
    pub dist: u32,
}

/// Sliding-window LZ77 match finder.
#[derive(Debug)]
pub struct MatchFinder {
    kind: MatchFinderKind,
    buffer: Vec<u8>,
    /// Index of the current position in `buffer`.
    cur: usize,
    /// End of valid data in `buffer`.
    stream_end: usize,
    stream_end_reached: bool,
    keep_size_before: usize,
    keep_size_after: usize,

    /// Absolute position counter.
    pos: u32,
    normalize_limit: u32,
    /// Positions processed since creation.
    processed: u64,
    cyclic_buffer_pos: u32,
    cyclic_buffer_size: u32,

    /// Side tables (4-byte kinds) followed by the main head table.
    hash: Vec<u32>,
    hash_mask: u32,
    son: Vec<u32>,

    match_max_len: u32,
    cut_value: u32,
}

fn try_alloc<T: Clone + Default>(what: &'static str, len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| OxiFlateError::out_of_memory(what, len * std::mem::size_of::<T>()))?;
    v.resize(len, T::default());
    Ok(v)
}

impl MatchFinder {
    /// Create a match finder, allocating the window and all tables.
    pub fn new(config: MatchFinderConfig) -> Result<Self> {
        let hash_bytes = config.kind.num_hash_bytes();
        if config.history_size == 0 || config.history_size > MAX_HISTORY_SIZE {
            return Err(OxiFlateError::invalid_property(
                "history_size",
                format!("{} is outside 1..={MAX_HISTORY_SIZE}", config.history_size),
            ));
        }
        if config.match_max_len < hash_bytes || config.match_max_len > MAX_MATCH_LEN {
            return Err(OxiFlateError::invalid_property(
                "match_max_len",
                format!(
                    "{} is outside {hash_bytes}..={MAX_MATCH_LEN}",
                    config.match_max_len
                ),
            ));
        }

        let keep_size_before = (config.history_size + config.keep_add_before + 1) as usize;
        let keep_size_after = (config.match_max_len + config.keep_add_after) as usize;
        let reserve = ((config.history_size / 2) as usize).max(1 << 16);
        let block_size = keep_size_before + keep_size_after + reserve;

        let (fixed, main) = if hash_bytes == 4 {
            let mut hs = config.history_size - 1;
            hs |= hs >> 1;
            hs |= hs >> 2;
            hs |= hs >> 4;
            hs |= hs >> 8;
            hs >>= 1;
            hs |= 0xFFFF;
            if hs > 1 << 24 {
                hs >>= 1;
            }
            (FIX4_HASH_OFFSET, hs as usize + 1)
        } else {
            (0, 1 << 16)
        };

        let cyclic_buffer_size = config.history_size + 1;
        let son_len = if config.kind.is_binary_tree() {
            cyclic_buffer_size as usize * 2
        } else {
            cyclic_buffer_size as usize
        };

        Ok(Self {
            kind: config.kind,
            buffer: try_alloc("match finder window", block_size)?,
            cur: 0,
            stream_end: 0,
            stream_end_reached: false,
            keep_size_before,
            keep_size_after,
            pos: cyclic_buffer_size,
            normalize_limit: u32::MAX,
            processed: 0,
            cyclic_buffer_pos: 0,
            cyclic_buffer_size,
            hash: try_alloc("match finder hash table", fixed + main)?,
            hash_mask: (main - 1) as u32,
            son: try_alloc("match finder links", son_len)?,
            match_max_len: config.match_max_len,
            cut_value: config.cut_value.max(1),
        })
    }

    /// The configured search kind.
    pub fn kind(&self) -> MatchFinderKind {
        self.kind
    }

    /// Change the number of candidates visited per position.
    pub fn set_cut_value(&mut self, cut_value: u32) {
        self.cut_value = cut_value.max(1);
    }

    /// Bytes available from the current position onward.
    pub fn available_bytes(&self) -> usize {
        self.stream_end - self.cur
    }

    /// Stream offset of the current position.
    pub fn position(&self) -> u64 {
        self.processed
    }

    /// Byte at the current position.
    pub fn current_byte(&self) -> Option<u8> {
        self.buffer[self.cur..self.stream_end].first().copied()
    }

    /// Bytes from the current position to the end of buffered data.
    pub fn lookahead(&self) -> &[u8] {
        &self.buffer[self.cur..self.stream_end]
    }

    /// Byte `back` positions before the current one (1 = previous byte).
    pub fn byte_before(&self, back: usize) -> u8 {
        self.buffer[self.cur - back]
    }

    /// Whether the reader returned end of stream.
    pub fn stream_end_reached(&self) -> bool {
        self.stream_end_reached
    }

    /// Whether [`fill`](Self::fill) would read more input.
    pub fn needs_fill(&self) -> bool {
        !self.stream_end_reached && self.available_bytes() <= self.keep_size_after
    }

    /// Read from `reader` until the look-ahead exceeds `match_max_len` (plus
    /// the configured extra) or the stream ends.
    pub fn fill<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        while self.needs_fill() {
            if self.stream_end == self.buffer.len() {
                self.move_block();
            }
            match reader.read(&mut self.buffer[self.stream_end..]) {
                Ok(0) => self.stream_end_reached = true,
                Ok(n) => self.stream_end += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Slide the kept history to the start of the buffer.
    fn move_block(&mut self) {
        let from = self.cur.saturating_sub(self.keep_size_before);
        if from == 0 {
            return;
        }
        self.buffer.copy_within(from..self.stream_end, 0);
        self.cur -= from;
        self.stream_end -= from;
    }

    #[inline]
    fn move_pos(&mut self) {
        self.cyclic_buffer_pos += 1;
        if self.cyclic_buffer_pos == self.cyclic_buffer_size {
            self.cyclic_buffer_pos = 0;
        }
        self.cur += 1;
        self.processed += 1;
        self.pos += 1;
        if self.pos >= self.normalize_limit {
            self.normalize();
        }
    }

    /// Rebase all stored positions so that `pos` returns to
    /// `cyclic_buffer_size`.
    fn normalize(&mut self) {
        let sub = self.pos - self.cyclic_buffer_size;
        let rebase = |v: &mut u32| *v = if *v <= sub { EMPTY } else { *v - sub };
        self.hash.iter_mut().for_each(rebase);
        self.son.iter_mut().for_each(rebase);
        self.pos -= sub;
        log::trace!("match finder normalized by {sub}");
    }

    #[cfg(test)]
    fn set_normalize_limit(&mut self, limit: u32) {
        self.normalize_limit = limit;
    }

    /// Current `len_limit`, or `None` if too few bytes remain to hash.
    #[inline]
    fn len_limit(&self) -> Option<u32> {
        let limit = (self.available_bytes() as u32).min(self.match_max_len);
        (limit >= self.kind.num_hash_bytes()).then_some(limit)
    }

    /// Hash the current position. Returns `(h2, h3, main)`; the side hashes
    /// are only meaningful for 4-byte kinds.
    #[inline]
    fn hashes(&self) -> (usize, usize, usize) {
        let b = &self.buffer[self.cur..];
        let crc = crc32_table();
        match self.kind.num_hash_bytes() {
            2 => (0, 0, b[0] as usize | ((b[1] as usize) << 8)),
            3 => {
                let hv = ((b[2] as u32 | ((b[0] as u32) << 8)) ^ crc[b[1] as usize]) & 0xFFFF;
                (0, 0, hv as usize)
            }
            _ => {
                let temp = crc[b[0] as usize] ^ b[1] as u32;
                let h2 = temp as usize & (HASH2_SIZE - 1);
                let temp = temp ^ ((b[2] as u32) << 8);
                let h3 = temp as usize & (HASH3_SIZE - 1);
                let hv = (temp ^ (crc[b[3] as usize] << 5)) & self.hash_mask;
                (h2, h3, FIX4_HASH_OFFSET + hv as usize)
            }
        }
    }

    /// Index in `son` (chain) or of the pair (tree) for a position `delta`
    /// bytes back.
    #[inline]
    fn cyclic_index(&self, delta: u32) -> usize {
        let back = if delta > self.cyclic_buffer_pos {
            self.cyclic_buffer_pos + self.cyclic_buffer_size - delta
        } else {
            self.cyclic_buffer_pos - delta
        };
        back as usize
    }

    /// Find matches at the current position and advance by one.
    ///
    /// `out` is cleared and filled with matches of strictly increasing
    /// length. Returns the number of matches. Does nothing once the buffered
    /// data is used up.
    pub fn get_matches(&mut self, out: &mut Vec<Match>) -> usize {
        out.clear();
        if self.available_bytes() == 0 {
            return 0;
        }
        let Some(len_limit) = self.len_limit() else {
            self.move_pos();
            return 0;
        };
        let (h2, h3, hv) = self.hashes();
        let cur_match = self.hash[hv];
        let mut max_len = self.kind.num_hash_bytes() - 1;

        if self.kind.num_hash_bytes() == 4 {
            let mut d2 = self.pos.wrapping_sub(self.hash[h2]);
            let d3 = self.pos.wrapping_sub(self.hash[FIX3_HASH_OFFSET + h3]);
            self.hash[h2] = self.pos;
            self.hash[FIX3_HASH_OFFSET + h3] = self.pos;
            self.hash[hv] = self.pos;

            let first = self.buffer[self.cur];
            max_len = 1;
            if d2 < self.cyclic_buffer_size && self.buffer[self.cur - d2 as usize] == first {
                max_len = 2;
                out.push(Match { len: 2, dist: d2 });
            }
            if d2 != d3
                && d3 < self.cyclic_buffer_size
                && self.buffer[self.cur - d3 as usize] == first
            {
                max_len = 3;
                out.push(Match { len: 3, dist: d3 });
                d2 = d3;
            }
            if let Some(last) = out.last_mut() {
                let cur = self.cur;
                let back = cur - d2 as usize;
                while max_len != len_limit
                    && self.buffer[back + max_len as usize] == self.buffer[cur + max_len as usize]
                {
                    max_len += 1;
                }
                last.len = max_len;
                if max_len == len_limit {
                    if self.kind.is_binary_tree() {
                        self.skip_tree(len_limit, cur_match);
                    } else {
                        self.son[self.cyclic_buffer_pos as usize] = cur_match;
                    }
                    self.move_pos();
                    return out.len();
                }
            }
            max_len = max_len.max(3);
        } else {
            self.hash[hv] = self.pos;
        }

        if self.kind.is_binary_tree() {
            self.tree_matches(len_limit, cur_match, max_len, out);
        } else {
            self.chain_matches(len_limit, cur_match, max_len, out);
        }
        self.move_pos();
        out.len()
    }

    /// Insert `count` positions without reporting matches, stopping early at
    /// the end of the buffered data.
    pub fn skip(&mut self, count: usize) {
        for _ in 0..count.min(self.available_bytes()) {
            let Some(len_limit) = self.len_limit() else {
                self.move_pos();
                continue;
            };
            let (h2, h3, hv) = self.hashes();
            if self.kind.num_hash_bytes() == 4 {
                self.hash[h2] = self.pos;
                self.hash[FIX3_HASH_OFFSET + h3] = self.pos;
            }
            let cur_match = self.hash[hv];
            self.hash[hv] = self.pos;
            if self.kind.is_binary_tree() {
                self.skip_tree(len_limit, cur_match);
            } else {
                self.son[self.cyclic_buffer_pos as usize] = cur_match;
            }
            self.move_pos();
        }
    }

    fn chain_matches(
        &mut self,
        len_limit: u32,
        mut cur_match: u32,
        mut max_len: u32,
        out: &mut Vec<Match>,
    ) {
        let cur = self.cur;
        self.son[self.cyclic_buffer_pos as usize] = cur_match;
        let mut cut = self.cut_value;
        loop {
            let delta = self.pos.wrapping_sub(cur_match);
            if cut == 0 || delta >= self.cyclic_buffer_size {
                return;
            }
            cut -= 1;
            let back = cur - delta as usize;
            cur_match = self.son[self.cyclic_index(delta)];
            let buf = &self.buffer;
            if buf[back + max_len as usize] == buf[cur + max_len as usize] && buf[back] == buf[cur] {
                let mut len = 1;
                while len != len_limit && buf[back + len as usize] == buf[cur + len as usize] {
                    len += 1;
                }
                if max_len < len {
                    max_len = len;
                    out.push(Match { len, dist: delta });
                    if len == len_limit {
                        return;
                    }
                }
            }
        }
    }

    fn tree_matches(
        &mut self,
        len_limit: u32,
        mut cur_match: u32,
        mut max_len: u32,
        out: &mut Vec<Match>,
    ) {
        let cur = self.cur;
        let mut ptr0 = ((self.cyclic_buffer_pos as usize) << 1) + 1;
        let mut ptr1 = (self.cyclic_buffer_pos as usize) << 1;
        let mut len0 = 0u32;
        let mut len1 = 0u32;
        let mut cut = self.cut_value;
        loop {
            let delta = self.pos.wrapping_sub(cur_match);
            if cut == 0 || delta >= self.cyclic_buffer_size {
                self.son[ptr0] = EMPTY;
                self.son[ptr1] = EMPTY;
                return;
            }
            cut -= 1;
            let pair = self.cyclic_index(delta) << 1;
            let back = cur - delta as usize;
            let buf = &self.buffer;
            let mut len = len0.min(len1);
            if buf[back + len as usize] == buf[cur + len as usize] {
                len += 1;
                while len != len_limit && buf[back + len as usize] == buf[cur + len as usize] {
                    len += 1;
                }
                if max_len < len {
                    max_len = len;
                    out.push(Match { len, dist: delta });
                    if len == len_limit {
                        self.son[ptr1] = self.son[pair];
                        self.son[ptr0] = self.son[pair + 1];
                        return;
                    }
                }
            }
            if buf[back + len as usize] < buf[cur + len as usize] {
                self.son[ptr1] = cur_match;
                ptr1 = pair + 1;
                cur_match = self.son[ptr1];
                len1 = len;
            } else {
                self.son[ptr0] = cur_match;
                ptr0 = pair;
                cur_match = self.son[ptr0];
                len0 = len;
            }
        }
    }

    fn skip_tree(&mut self, len_limit: u32, mut cur_match: u32) {
        let cur = self.cur;
        let mut ptr0 = ((self.cyclic_buffer_pos as usize) << 1) + 1;
        let mut ptr1 = (self.cyclic_buffer_pos as usize) << 1;
        let mut len0 = 0u32;
        let mut len1 = 0u32;
        let mut cut = self.cut_value;
        loop {
            let delta = self.pos.wrapping_sub(cur_match);
            if cut == 0 || delta >= self.cyclic_buffer_size {
                self.son[ptr0] = EMPTY;
                self.son[ptr1] = EMPTY;
                return;
            }
            cut -= 1;
            let pair = self.cyclic_index(delta) << 1;
            let back = cur - delta as usize;
            let buf = &self.buffer;
            let mut len = len0.min(len1);
            if buf[back + len as usize] == buf[cur + len as usize] {
                len += 1;
                while len != len_limit && buf[back + len as usize] == buf[cur + len as usize] {
                    len += 1;
                }
                if len == len_limit {
                    self.son[ptr1] = self.son[pair];
                    self.son[ptr0] = self.son[pair + 1];
                    return;
                }
            }
            if buf[back + len as usize] < buf[cur + len as usize] {
                self.son[ptr1] = cur_match;
                ptr1 = pair + 1;
                cur_match = self.son[ptr1];
                len1 = len;
            } else {
                self.son[ptr0] = cur_match;
                ptr0 = pair;
                cur_match = self.son[ptr0];
                len0 = len;
            }
        }
    }
}
