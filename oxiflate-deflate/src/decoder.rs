//! DEFLATE block decoder state machine.
//!
//! [`BlockDecoder`] walks the block structure of a DEFLATE or Deflate64
//! stream and hands every decoded literal and back-reference to a
//! [`SymbolSink`]. It never stores output itself, so the same state machine
//! drives both the single-threaded inflater (sink = ring buffer + writer)
//! and the producer side of the pipelined one (sink = instruction batch).
//!
//! Decoding is budgeted: [`BlockDecoder::decode_chunk`] stops once the
//! requested number of output bytes has been produced. A back-reference that
//! crosses the budget is emitted in two parts; the remainder is kept and
//! emitted first on the next call, so the parts always add up to the
//! original match length.

use crate::huffman::HuffmanDecoder;
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, DeflateVariant, END_OF_BLOCK,
    LEN_START, MAX_LITLEN_USED, NUM_DIST_SYMBOLS, NUM_LEN_SLOTS, NUM_LEVEL_SYMBOLS,
    NUM_LITLEN_SYMBOLS, fixed_distance_lengths, fixed_litlen_lengths,
};
use oxiflate_core::BitReader;
use oxiflate_core::error::{OxiFlateError, Result};
use std::io::Read;

/// Largest raw span copied out of a stored block per step.
const STORED_STEP: usize = 1 << 12;

/// Receives the output of a [`BlockDecoder`].
pub trait SymbolSink {
    /// One literal byte.
    fn literal(&mut self, byte: u8) -> Result<()>;

    /// A run of literal bytes (stored block data).
    fn literals(&mut self, bytes: &[u8]) -> Result<()> {
        bytes.iter().try_for_each(|&b| self.literal(b))
    }

    /// Copy `length` bytes starting `distance` bytes back (1-based).
    fn copy(&mut self, distance: usize, length: usize) -> Result<()>;
}

/// Where the decoder is within the block structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedHeader,
    Stored { remaining: usize },
    Huffman,
    Finished,
}

/// Resumable DEFLATE / Deflate64 block decoder.
#[derive(Debug)]
pub struct BlockDecoder {
    variant: DeflateVariant,
    nsis_mode: bool,
    state: State,
    final_block: bool,
    /// Remainder of a back-reference split by the output budget.
    pending: Option<(usize, usize)>,
    /// Bytes produced since the start of the stream.
    total_out: u64,
    litlen: HuffmanDecoder,
    distance: HuffmanDecoder,
    levels: HuffmanDecoder,
    /// Whether `litlen`/`distance` currently hold the fixed tables.
    fixed_loaded: bool,
    stored_buf: Vec<u8>,
}

impl BlockDecoder {
    /// Create a decoder for `variant`.
    ///
    /// With `nsis_mode`, a stored block whose LEN/NLEN fields disagree is
    /// accepted (LEN wins) instead of rejected.
    pub fn new(variant: DeflateVariant, nsis_mode: bool) -> Self {
        Self {
            variant,
            nsis_mode,
            state: State::NeedHeader,
            final_block: false,
            pending: None,
            total_out: 0,
            litlen: HuffmanDecoder::new(NUM_LITLEN_SYMBOLS),
            distance: HuffmanDecoder::new(NUM_DIST_SYMBOLS),
            levels: HuffmanDecoder::new(NUM_LEVEL_SYMBOLS),
            fixed_loaded: false,
            stored_buf: vec![0; STORED_STEP],
        }
    }

    /// The stream flavour being decoded.
    pub fn variant(&self) -> DeflateVariant {
        self.variant
    }

    /// Whether the final block's end has been reached and nothing is pending.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished && self.pending.is_none()
    }

    /// Bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Start over for a new stream.
    pub fn reset(&mut self) {
        self.state = State::NeedHeader;
        self.final_block = false;
        self.pending = None;
        self.total_out = 0;
    }

    /// Decode until `budget` bytes have been produced or the stream ends.
    ///
    /// Returns the number of bytes handed to `sink`. No further input is
    /// read once the budget is met, so a caller that knows the exact output
    /// size can stop without touching whatever follows the data.
    pub fn decode_chunk<R: Read, S: SymbolSink + ?Sized>(
        &mut self,
        reader: &mut BitReader<R>,
        sink: &mut S,
        budget: usize,
    ) -> Result<usize> {
        let mut produced = 0usize;

        if let Some((distance, length)) = self.pending.take() {
            produced += self.emit_copy(sink, distance, length, budget)?;
        }

        while produced < budget {
            match self.state {
                State::Finished => break,
                State::NeedHeader => {
                    if self.final_block {
                        self.state = State::Finished;
                    } else {
                        self.read_block_header(reader)?;
                    }
                }
                State::Stored { remaining } => {
                    if remaining == 0 {
                        self.end_block();
                        continue;
                    }
                    let n = remaining.min(budget - produced).min(STORED_STEP);
                    reader.read_bytes(&mut self.stored_buf[..n])?;
                    sink.literals(&self.stored_buf[..n])?;
                    self.total_out += n as u64;
                    produced += n;
                    self.state = State::Stored {
                        remaining: remaining - n,
                    };
                    if remaining == n {
                        self.end_block();
                    }
                }
                State::Huffman => {
                    let symbol = self.litlen.decode_symbol(reader)?;
                    if symbol < END_OF_BLOCK {
                        sink.literal(symbol as u8)?;
                        self.total_out += 1;
                        produced += 1;
                    } else if symbol == END_OF_BLOCK {
                        self.end_block();
                    } else {
                        let length = self.read_length(reader, symbol)?;
                        let distance = self.read_distance(reader)?;
                        produced += self.emit_copy(sink, distance, length, budget - produced)?;
                    }
                }
            }
        }
        Ok(produced)
    }

    fn end_block(&mut self) {
        self.state = if self.final_block {
            State::Finished
        } else {
            State::NeedHeader
        };
    }

    /// Emit as much of a back-reference as the budget allows and keep the
    /// rest pending. Returns the bytes emitted.
    fn emit_copy<S: SymbolSink + ?Sized>(
        &mut self,
        sink: &mut S,
        distance: usize,
        length: usize,
        room: usize,
    ) -> Result<usize> {
        let now = length.min(room);
        if now > 0 {
            sink.copy(distance, now)?;
            self.total_out += now as u64;
        }
        if now < length {
            self.pending = Some((distance, length - now));
        }
        Ok(now)
    }

    fn read_block_header<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<()> {
        self.final_block = reader.read_bit()?;
        let block_type = reader.read_bits(2)?;
        match block_type {
            0 => {
                let remaining = self.read_stored_header(reader)?;
                log::debug!(
                    "stored block: {remaining} bytes, final={}",
                    self.final_block
                );
                self.state = State::Stored { remaining };
            }
            1 => {
                if !self.fixed_loaded {
                    self.litlen.set_code_lengths(&fixed_litlen_lengths())?;
                    self.distance.set_code_lengths(&fixed_distance_lengths())?;
                    self.fixed_loaded = true;
                }
                log::debug!("fixed Huffman block, final={}", self.final_block);
                self.state = State::Huffman;
            }
            2 => {
                self.fixed_loaded = false;
                self.read_dynamic_tables(reader)?;
                self.state = State::Huffman;
            }
            _ => {
                return Err(OxiFlateError::corrupted(
                    reader.bytes_consumed(),
                    "reserved block type 3",
                ));
            }
        }
        Ok(())
    }

    fn read_stored_header<R: Read>(&self, reader: &mut BitReader<R>) -> Result<usize> {
        reader.align_to_byte();
        let len = reader.read_bits(16)? as u16;
        let nlen = reader.read_bits(16)? as u16;
        if len != !nlen {
            if !self.nsis_mode {
                return Err(OxiFlateError::corrupted(
                    reader.bytes_consumed(),
                    format!("stored block LEN {len:#06x} does not match NLEN {nlen:#06x}"),
                ));
            }
            log::warn!("ignoring stored block LEN/NLEN mismatch ({len:#06x} / {nlen:#06x})");
        }
        Ok(len as usize)
    }

    fn read_dynamic_tables<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<()> {
        let num_litlen = reader.read_bits(5)? as usize + 257;
        let num_dist = reader.read_bits(5)? as usize + 1;
        let num_levels = reader.read_bits(4)? as usize + 4;

        if num_litlen > MAX_LITLEN_USED {
            return Err(OxiFlateError::corrupted(
                reader.bytes_consumed(),
                format!("{num_litlen} literal/length codes"),
            ));
        }
        if num_dist > self.variant.num_dist_codes() {
            return Err(OxiFlateError::corrupted(
                reader.bytes_consumed(),
                format!("{num_dist} distance codes"),
            ));
        }

        let mut level_lengths = [0u8; NUM_LEVEL_SYMBOLS];
        for &symbol in &CODE_LENGTH_ORDER[..num_levels] {
            level_lengths[symbol] = reader.read_bits(3)? as u8;
        }
        self.levels.set_code_lengths(&level_lengths)?;

        let total = num_litlen + num_dist;
        let mut lengths = [0u8; MAX_LITLEN_USED + NUM_DIST_SYMBOLS];
        let mut i = 0;
        while i < total {
            let symbol = self.levels.decode_symbol(reader)?;
            let (value, repeat) = match symbol {
                0..=15 => (symbol as u8, 1),
                16 => {
                    if i == 0 {
                        return Err(OxiFlateError::corrupted(
                            reader.bytes_consumed(),
                            "repeat code with no previous length",
                        ));
                    }
                    (lengths[i - 1], reader.read_bits(2)? as usize + 3)
                }
                17 => (0, reader.read_bits(3)? as usize + 3),
                _ => (0, reader.read_bits(7)? as usize + 11),
            };
            if i + repeat > total {
                return Err(OxiFlateError::corrupted(
                    reader.bytes_consumed(),
                    "code length repeat overruns the table",
                ));
            }
            lengths[i..i + repeat].fill(value);
            i += repeat;
        }

        let (litlen_lengths, dist_lengths) = lengths[..total].split_at(num_litlen);
        if litlen_lengths[END_OF_BLOCK as usize] == 0 {
            return Err(OxiFlateError::corrupted(
                reader.bytes_consumed(),
                "dynamic block has no end-of-block code",
            ));
        }
        self.litlen.set_code_lengths(litlen_lengths)?;
        self.distance.set_code_lengths(dist_lengths)?;

        log::debug!(
            "dynamic Huffman block: {num_litlen} literal/length, {num_dist} distance, \
             {num_levels} level codes, final={}",
            self.final_block
        );
        Ok(())
    }

    fn read_length<R: Read>(&self, reader: &mut BitReader<R>, symbol: u16) -> Result<usize> {
        let slot = (symbol - LEN_START) as usize;
        if slot >= NUM_LEN_SLOTS {
            return Err(OxiFlateError::corrupted(
                reader.bytes_consumed(),
                format!("invalid length symbol {symbol}"),
            ));
        }
        let (base, extra_bits) = self.variant.length_slot(slot);
        Ok((base + reader.read_bits(extra_bits)?) as usize)
    }

    fn read_distance<R: Read>(&self, reader: &mut BitReader<R>) -> Result<usize> {
        let code = self.distance.decode_symbol(reader)? as usize;
        if code >= self.variant.num_dist_codes() {
            return Err(OxiFlateError::corrupted(
                reader.bytes_consumed(),
                format!("invalid distance code {code}"),
            ));
        }
        let distance =
            (DISTANCE_BASE[code] + reader.read_bits(DISTANCE_EXTRA_BITS[code])?) as usize;
        if distance as u64 > self.total_out || distance > self.variant.window_size() {
            return Err(OxiFlateError::invalid_distance(
                distance,
                self.total_out.min(self.variant.window_size() as u64) as usize,
            ));
        }
        Ok(distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiflate_core::BitWriter;
    use std::io::Cursor;

    /// Collects output into a flat buffer.
    #[derive(Default)]
    struct VecSink(Vec<u8>);

    impl SymbolSink for VecSink {
        fn literal(&mut self, byte: u8) -> Result<()> {
            self.0.push(byte);
            Ok(())
        }

        fn copy(&mut self, distance: usize, length: usize) -> Result<()> {
            for _ in 0..length {
                let byte = self.0[self.0.len() - distance];
                self.0.push(byte);
            }
            Ok(())
        }
    }

    fn decode_all(data: &[u8], variant: DeflateVariant) -> Result<Vec<u8>> {
        let mut reader = BitReader::new(Cursor::new(data));
        let mut decoder = BlockDecoder::new(variant, false);
        let mut sink = VecSink::default();
        while !decoder.is_finished() {
            decoder.decode_chunk(&mut reader, &mut sink, 7)?;
        }
        Ok(sink.0)
    }

    /// Fixed-Huffman stream writer for hand-built test vectors.
    fn fixed_stream(build: impl FnOnce(&mut BitWriter<&mut Vec<u8>>)) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = BitWriter::new(&mut out);
        writer.write_bits(1, 1).unwrap();
        writer.write_bits(1, 2).unwrap();
        build(&mut writer);
        writer.finish().unwrap();
        out
    }

    /// Fixed literal code, written MSB-first as the format requires.
    fn put_fixed_literal(writer: &mut BitWriter<&mut Vec<u8>>, byte: u8) {
        let (code, len) = if byte < 144 {
            (0x30 + byte as u32, 8)
        } else {
            (0x190 + (byte as u32 - 144), 9)
        };
        writer
            .write_bits(crate::huffman::reverse_bits(code as u16, len) as u32, len)
            .unwrap();
    }

    fn put_fixed_symbol_7(writer: &mut BitWriter<&mut Vec<u8>>, symbol: u16) {
        let code = symbol - 256;
        writer
            .write_bits(crate::huffman::reverse_bits(code, 7) as u32, 7)
            .unwrap();
    }

    #[test]
    fn test_stored_block() {
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(decode_all(&data, DeflateVariant::Deflate).unwrap(), b"Hello");
    }

    #[test]
    fn test_stored_length_mismatch() {
        let data = [0x01, 0x05, 0x00, 0xFB, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        let err = decode_all(&data, DeflateVariant::Deflate).unwrap_err();
        assert!(err.is_data_error());

        let mut reader = BitReader::new(Cursor::new(&data[..]));
        let mut decoder = BlockDecoder::new(DeflateVariant::Deflate, true);
        let mut sink = VecSink::default();
        decoder.decode_chunk(&mut reader, &mut sink, 100).unwrap();
        assert_eq!(sink.0, b"Hello");
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_fixed_block_with_match() {
        // "abc" then length 6 at distance 3, then end of block.
        let data = fixed_stream(|w| {
            for &b in b"abc" {
                put_fixed_literal(w, b);
            }
            put_fixed_symbol_7(w, 260); // length 6
            w.write_bits(crate::huffman::reverse_bits(2, 5) as u32, 5)
                .unwrap(); // distance 3
            put_fixed_symbol_7(w, END_OF_BLOCK);
        });
        assert_eq!(
            decode_all(&data, DeflateVariant::Deflate).unwrap(),
            b"abcabcabc"
        );
    }

    #[test]
    fn test_match_split_by_budget() {
        let data = fixed_stream(|w| {
            put_fixed_literal(w, b'z');
            put_fixed_symbol_7(w, 265); // length 11 + 1 extra bit
            w.write_bits(1, 1).unwrap(); // length 12
            w.write_bits(0, 5).unwrap(); // distance 1
            put_fixed_symbol_7(w, END_OF_BLOCK);
        });
        let mut reader = BitReader::new(Cursor::new(&data[..]));
        let mut decoder = BlockDecoder::new(DeflateVariant::Deflate, false);
        let mut sink = VecSink::default();
        let mut sizes = Vec::new();
        while !decoder.is_finished() {
            sizes.push(decoder.decode_chunk(&mut reader, &mut sink, 5).unwrap());
        }
        assert_eq!(sink.0, vec![b'z'; 13]);
        assert_eq!(sizes.iter().sum::<usize>(), 13);
        assert_eq!(&sizes[..3], &[5, 5, 3]);
    }

    #[test]
    fn test_distance_beyond_output() {
        let data = fixed_stream(|w| {
            put_fixed_literal(w, b'a');
            put_fixed_symbol_7(w, 257);
            w.write_bits(crate::huffman::reverse_bits(1, 5) as u32, 5)
                .unwrap(); // distance 2
            put_fixed_symbol_7(w, END_OF_BLOCK);
        });
        let err = decode_all(&data, DeflateVariant::Deflate).unwrap_err();
        assert!(matches!(err, OxiFlateError::InvalidDistance { distance: 2, .. }));
    }

    #[test]
    fn test_deflate64_distance_code_rejected_in_deflate() {
        let data = fixed_stream(|w| {
            put_fixed_literal(w, b'a');
            put_fixed_symbol_7(w, 257);
            w.write_bits(crate::huffman::reverse_bits(30, 5) as u32, 5)
                .unwrap();
            w.write_bits(0, 14).unwrap();
            put_fixed_symbol_7(w, END_OF_BLOCK);
        });
        let err = decode_all(&data, DeflateVariant::Deflate).unwrap_err();
        assert!(matches!(err, OxiFlateError::CorruptedData { .. }));
        // Deflate64 accepts the code; the distance itself is then too far back.
        let err = decode_all(&data, DeflateVariant::Deflate64).unwrap_err();
        assert!(matches!(err, OxiFlateError::InvalidDistance { .. }));
    }

    #[test]
    fn test_deflate64_long_length() {
        // Symbol 285 in Deflate64: base 3 plus 16 extra bits.
        let data = fixed_stream(|w| {
            put_fixed_literal(w, b'q');
            // 285 uses an 8-bit fixed code (280-287 -> 0xC0 + n).
            w.write_bits(crate::huffman::reverse_bits(0xC0 + 5, 8) as u32, 8)
                .unwrap();
            w.write_bits(997, 16).unwrap(); // length 1000
            w.write_bits(0, 5).unwrap(); // distance 1
            put_fixed_symbol_7(w, END_OF_BLOCK);
        });
        let out = decode_all(&data, DeflateVariant::Deflate64).unwrap();
        assert_eq!(out, vec![b'q'; 1001]);
        // Plain DEFLATE reads 285 as length 258 with no extra bits, and then
        // trips over the leftover bits.
        assert!(decode_all(&data, DeflateVariant::Deflate).is_err());
    }

    #[test]
    fn test_reserved_block_type() {
        let data = [0x07, 0x00];
        let err = decode_all(&data, DeflateVariant::Deflate).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_truncated_stream() {
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e'];
        let err = decode_all(&data, DeflateVariant::Deflate).unwrap_err();
        assert!(matches!(err, OxiFlateError::Truncated { .. }));
    }

    #[test]
    fn test_budget_stops_before_next_header() {
        // Non-final stored block of 3 bytes with nothing after it.
        let data = [0x00, 0x03, 0x00, 0xFC, 0xFF, b'x', b'y', b'z'];
        let mut reader = BitReader::new(Cursor::new(&data[..]));
        let mut decoder = BlockDecoder::new(DeflateVariant::Deflate, false);
        let mut sink = VecSink::default();
        assert_eq!(decoder.decode_chunk(&mut reader, &mut sink, 3).unwrap(), 3);
        assert_eq!(sink.0, b"xyz");
        assert!(!decoder.is_finished());
        // Asking for more reads a header that is not there.
        assert!(decoder.decode_chunk(&mut reader, &mut sink, 3).is_err());
    }
}
