//! Code tables for DEFLATE (RFC 1951) and Deflate64.
//!
//! Deflate64 reuses the DEFLATE format with three changes: a 64 KiB window,
//! two extra distance codes (30 and 31, 14 extra bits each), and length
//! slot 285 re-purposed as "base 3 plus 16 extra bits".

/// Stream flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeflateVariant {
    /// Standard DEFLATE, 32 KiB window.
    #[default]
    Deflate,
    /// Deflate64 (enhanced deflate), 64 KiB window.
    Deflate64,
}

impl DeflateVariant {
    /// Sliding window size in bytes.
    pub const fn window_size(self) -> usize {
        match self {
            Self::Deflate => 1 << 15,
            Self::Deflate64 => 1 << 16,
        }
    }

    /// Number of distance codes the format allows.
    pub const fn num_dist_codes(self) -> usize {
        match self {
            Self::Deflate => 30,
            Self::Deflate64 => 32,
        }
    }

    /// Longest match the encoder emits.
    pub const fn max_match_len(self) -> usize {
        match self {
            Self::Deflate => 258,
            Self::Deflate64 => 257,
        }
    }

    /// Base length and extra bit count of length slot `slot` (0-28).
    #[inline]
    pub fn length_slot(self, slot: usize) -> (u32, u8) {
        if slot == NUM_LEN_SLOTS - 1 && self == Self::Deflate64 {
            (3, 16)
        } else {
            (LENGTH_BASE[slot] as u32, LENGTH_EXTRA_BITS[slot])
        }
    }
}

/// Literal/length alphabet size used by fixed tables.
pub const NUM_LITLEN_SYMBOLS: usize = 288;
/// Highest literal/length count a dynamic header may declare.
pub const MAX_LITLEN_USED: usize = 286;
/// Distance alphabet size (Deflate64 uses all 32).
pub const NUM_DIST_SYMBOLS: usize = 32;
/// Code-length alphabet size.
pub const NUM_LEVEL_SYMBOLS: usize = 19;
/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;
/// First length symbol.
pub const LEN_START: u16 = 257;
/// Number of length slots (257-285).
pub const NUM_LEN_SLOTS: usize = 29;
/// Shortest match.
pub const MIN_MATCH: usize = 3;
/// Longest Huffman code.
pub const MAX_CODE_LENGTH: u8 = 15;
/// Longest code-length code.
pub const MAX_LEVEL_CODE_LENGTH: u8 = 7;

/// Length base values for slots 257-285.
pub const LENGTH_BASE: [u16; NUM_LEN_SLOTS] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for slots 257-285 (DEFLATE meaning of 285).
pub const LENGTH_EXTRA_BITS: [u8; NUM_LEN_SLOTS] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance base values for codes 0-31.
pub const DISTANCE_BASE: [u32; NUM_DIST_SYMBOLS] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537, 2049,
    3073, 4097, 6145, 8193, 12289, 16385, 24577, 32769, 49153,
];

/// Extra bits for distance codes 0-31.
pub const DISTANCE_EXTRA_BITS: [u8; NUM_DIST_SYMBOLS] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
    14, 14,
];

/// Transmission order of the code-length code lengths.
pub const CODE_LENGTH_ORDER: [usize; NUM_LEVEL_SYMBOLS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Length slot for each `length - 3` in 0..=255.
const LENGTH_SLOT: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut slot = 0;
    while slot < NUM_LEN_SLOTS - 1 {
        let base = LENGTH_BASE[slot] as usize - MIN_MATCH;
        let count = 1usize << LENGTH_EXTRA_BITS[slot];
        let mut i = 0;
        while i < count && base + i < 256 {
            table[base + i] = slot as u8;
            i += 1;
        }
        slot += 1;
    }
    table
};

/// Fixed literal/length code lengths (RFC 1951 section 3.2.6).
pub fn fixed_litlen_lengths() -> [u8; NUM_LITLEN_SYMBOLS] {
    let mut lengths = [8u8; NUM_LITLEN_SYMBOLS];
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths
}

/// Fixed distance code lengths: all 32 codes use 5 bits.
pub fn fixed_distance_lengths() -> [u8; NUM_DIST_SYMBOLS] {
    [5u8; NUM_DIST_SYMBOLS]
}

/// Map a match length to `(slot, extra_bits, extra_value)`.
///
/// Slot is 0-based (symbol = `LEN_START + slot`). Length 258 uses slot 28
/// in DEFLATE and slot 27 with 31 extra in Deflate64.
#[inline]
pub fn length_to_slot(length: usize, variant: DeflateVariant) -> (usize, u8, u32) {
    debug_assert!((MIN_MATCH..=258).contains(&length), "Length out of range: {length}");
    if length == 258 && variant == DeflateVariant::Deflate {
        return (NUM_LEN_SLOTS - 1, 0, 0);
    }
    let slot = LENGTH_SLOT[(length - MIN_MATCH).min(255)] as usize;
    let extra = (length - LENGTH_BASE[slot] as usize) as u32;
    (slot, LENGTH_EXTRA_BITS[slot], extra)
}

/// Map a distance (1-65536) to `(code, extra_bits, extra_value)`.
#[inline]
pub fn distance_to_code(distance: usize) -> (usize, u8, u32) {
    debug_assert!((1..=65536).contains(&distance), "Distance out of range: {distance}");
    let code = if distance <= 4 {
        distance - 1
    } else {
        let d = (distance - 1) as u32;
        let msb = 31 - d.leading_zeros();
        (2 * msb + ((d >> (msb - 1)) & 1)) as usize
    };
    (
        code,
        DISTANCE_EXTRA_BITS[code],
        (distance as u32) - DISTANCE_BASE[code],
    )
}
