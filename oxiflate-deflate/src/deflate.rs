//! DEFLATE / Deflate64 compression.
//!
//! The input is cut into spans of at most
//! [`MAX_SPAN`](crate::optimal::MAX_SPAN) bytes. For each span
//! the match finder runs once, the recorded candidates are parsed (greedily
//! in fast mode, otherwise by repeated shortest-path passes), and the tokens
//! are split into blocks. Every block is written in whichever of stored,
//! fixed or dynamic encoding is smallest.

use crate::block::{
    MAX_STORED_BLOCK, Token, choose_block, huffman_bits, write_block, write_stored,
};
use crate::match_finder::{MatchFinder, MatchFinderConfig};
use crate::optimal::{Prices, SpanMatches, greedy_parse, optimal_parse};
use crate::props::{DeflateProperties, PropValue};
use crate::tables::{DeflateVariant, MIN_MATCH};
use oxiflate_core::error::Result;
use oxiflate_core::progress::{Interrupt, NoProgress, Progress};
use oxiflate_core::traits::{StreamEncoder, StreamStats};
use oxiflate_core::{BitWriter, CrcReader};
use std::io::{self, Cursor, Read, Write};
use std::ops::Range;

/// Smallest block the splitter will produce.
const MIN_SPLIT_BYTES: usize = 1 << 10;

/// One block of a span: a token range and the bytes it covers.
#[derive(Debug, Clone)]
struct Part {
    tokens: Range<usize>,
    bytes: Range<usize>,
}

/// Streaming DEFLATE / Deflate64 compressor.
#[derive(Debug, Clone, Default)]
pub struct Deflater {
    props: DeflateProperties,
    interrupt: Interrupt,
}

impl Deflater {
    /// Create a compressor with the given settings.
    pub fn new(props: DeflateProperties) -> Self {
        Self {
            props,
            interrupt: Interrupt::new(),
        }
    }

    /// Create a DEFLATE compressor with the presets for `level` (0-9).
    pub fn with_level(level: u8) -> Self {
        Self::new(DeflateProperties::from_level(level))
    }

    /// Use `interrupt` as the cancellation flag.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// A handle that cancels this compressor from elsewhere.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Request cancellation at the next span boundary.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// The settings in use.
    pub fn properties(&self) -> &DeflateProperties {
        &self.props
    }

    /// Apply named properties; see [`DeflateProperties::set_properties`].
    pub fn set_properties(&mut self, props: &[(&str, PropValue<'_>)]) -> Result<()> {
        self.props.set_properties(props)
    }

    /// Compress all of `input` into `output`.
    pub fn encode_stream<R: Read, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<StreamStats> {
        self.encode_with_progress(input, output, &mut NoProgress)
    }

    /// Compress all of `input` into `output`, reporting progress per span.
    pub fn encode_with_progress<R: Read, W: Write, P: Progress + ?Sized>(
        &mut self,
        input: &mut R,
        output: &mut W,
        progress: &mut P,
    ) -> Result<StreamStats> {
        self.props.validate()?;
        let mut input = CrcReader::new(input);
        let mut writer = BitWriter::new(&mut *output);

        if self.props.store_only() {
            self.encode_stored(&mut input, &mut writer, progress)?;
        } else {
            self.encode_blocks(&mut input, &mut writer, progress)?;
        }
        writer.flush()?;

        Ok(StreamStats {
            bytes_in: input.count(),
            bytes_out: writer.bits_written() / 8,
            crc32: input.crc(),
        })
    }

    fn encode_stored<R: Read, W: Write, P: Progress + ?Sized>(
        &self,
        input: &mut CrcReader<R>,
        writer: &mut BitWriter<W>,
        progress: &mut P,
    ) -> Result<()> {
        let mut current = vec![0u8; MAX_STORED_BLOCK];
        let mut next = vec![0u8; MAX_STORED_BLOCK];
        let mut len = read_full(input, &mut current)?;
        loop {
            self.interrupt.check()?;
            // A short read means end of input, so only a full buffer can be
            // followed by more data.
            let next_len = if len == MAX_STORED_BLOCK {
                read_full(input, &mut next)?
            } else {
                0
            };
            let is_final = next_len == 0;
            write_stored(writer, &current[..len], is_final)?;
            progress.on_progress(input.count(), writer.bits_written() / 8)?;
            if is_final {
                return Ok(());
            }
            std::mem::swap(&mut current, &mut next);
            len = next_len;
        }
    }

    fn encode_blocks<R: Read, W: Write, P: Progress + ?Sized>(
        &self,
        input: &mut CrcReader<R>,
        writer: &mut BitWriter<W>,
        progress: &mut P,
    ) -> Result<()> {
        let props = &self.props;
        let variant = props.variant();
        let mut mf = MatchFinder::new(MatchFinderConfig {
            kind: props.match_finder_kind(),
            history_size: variant.window_size() as u32,
            keep_add_before: 0,
            match_max_len: variant.max_match_len() as u32,
            keep_add_after: 0,
            cut_value: props.match_finder_cycles,
        })?;
        let fast_bytes = if props.fast_mode {
            MIN_MATCH
        } else {
            props.fast_bytes as usize
        };

        let mut span = SpanMatches::new();
        let mut tokens = Vec::new();
        let mut scratch = Vec::new();
        let mut prices = Prices::fixed(variant);
        loop {
            self.interrupt.check()?;
            span.record(&mut mf, input, fast_bytes)?;
            mf.fill(input)?;
            let is_last = mf.available_bytes() == 0;

            if props.fast_mode {
                greedy_parse(&span, &mut tokens);
            } else {
                self.parse_passes(&span, &mut prices, &mut tokens, &mut scratch);
            }
            self.write_span(writer, &span, &tokens, is_last)?;

            log::trace!(
                "deflate span: {} bytes, {} tokens, {} in / {} out",
                span.len(),
                tokens.len(),
                input.count(),
                writer.bits_written() / 8
            );
            progress.on_progress(input.count(), writer.bits_written() / 8)?;
            if is_last {
                return Ok(());
            }
        }
    }

    /// Parse `span` up to `num_passes` times, pricing each pass with the
    /// code lengths the previous one produced. Keeps the cheapest parse in
    /// `tokens` and leaves its prices in `prices` for the next span.
    fn parse_passes(
        &self,
        span: &SpanMatches,
        prices: &mut Prices,
        tokens: &mut Vec<Token>,
        scratch: &mut Vec<Token>,
    ) {
        let variant = self.props.variant();
        optimal_parse(span, prices, tokens);
        let mut best = huffman_bits(tokens, variant);
        for pass in 1..self.props.num_passes {
            *prices = Prices::for_tokens(tokens, variant);
            optimal_parse(span, prices, scratch);
            let bits = huffman_bits(scratch, variant);
            if bits >= best {
                log::trace!("optimal parse converged after {pass} passes");
                break;
            }
            best = bits;
            std::mem::swap(tokens, scratch);
        }
        *prices = Prices::for_tokens(tokens, variant);
    }

    fn write_span<W: Write>(
        &self,
        writer: &mut BitWriter<W>,
        span: &SpanMatches,
        tokens: &[Token],
        is_last: bool,
    ) -> Result<()> {
        let variant = self.props.variant();
        let mut parts = Vec::new();
        split_blocks(
            tokens,
            0,
            0,
            span.len(),
            self.props.num_div_passes,
            variant,
            &mut parts,
        );

        let count = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            let part_tokens = &tokens[part.tokens];
            let raw = &span.bytes()[part.bytes];
            let choice = choose_block(part_tokens, raw.len(), variant, writer.bits_written());
            log::debug!(
                "block {:?}: {} bytes, {} tokens, {} bits",
                choice.kind,
                raw.len(),
                part_tokens.len(),
                choice.bits
            );
            write_block(
                writer,
                part_tokens,
                raw,
                &choice,
                is_last && i + 1 == count,
                variant,
            )?;
        }
        Ok(())
    }
}

impl StreamEncoder for Deflater {
    fn encode<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<StreamStats> {
        self.encode_stream(input, output)
    }
}

/// Halve `tokens` (covering `byte_len` bytes from `byte_base`) up to `depth`
/// times, keeping a split only when both halves together cost less than
/// the whole. Pushes the chosen parts to `out` and returns their cost.
fn split_blocks(
    tokens: &[Token],
    token_base: usize,
    byte_base: usize,
    byte_len: usize,
    depth: u32,
    variant: DeflateVariant,
    out: &mut Vec<Part>,
) -> u64 {
    let whole = choose_block(tokens, byte_len, variant, 0).bits;
    let single = Part {
        tokens: token_base..token_base + tokens.len(),
        bytes: byte_base..byte_base + byte_len,
    };
    if depth == 0 || byte_len < 2 * MIN_SPLIT_BYTES {
        out.push(single);
        return whole;
    }

    let half = byte_len / 2;
    let mut mid = 0;
    let mut covered = 0;
    while mid < tokens.len() && covered < half {
        covered += tokens[mid].covered();
        mid += 1;
    }
    if mid == 0 || mid == tokens.len() {
        out.push(single);
        return whole;
    }

    let mark = out.len();
    let left = split_blocks(
        &tokens[..mid],
        token_base,
        byte_base,
        covered,
        depth - 1,
        variant,
        out,
    );
    let right = split_blocks(
        &tokens[mid..],
        token_base + mid,
        byte_base + covered,
        byte_len - covered,
        depth - 1,
        variant,
        out,
    );
    if left + right < whole {
        log::debug!(
            "split {byte_len} bytes at {covered}: {} bits instead of {whole}",
            left + right
        );
        left + right
    } else {
        out.truncate(mark);
        out.push(single);
        whole
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn deflate_with(data: &[u8], props: DeflateProperties) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    Deflater::new(props).encode_stream(&mut Cursor::new(data), &mut output)?;
    Ok(output)
}

/// Compress `data` as a raw DEFLATE stream at `level` (0-9).
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    deflate_with(data, DeflateProperties::from_level(level))
}

/// Compress `data` as a raw Deflate64 stream at `level` (0-9).
pub fn deflate64(data: &[u8], level: u8) -> Result<Vec<u8>> {
    deflate_with(data, DeflateProperties::deflate64(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::{inflate, inflate64};
    use crate::optimal::MAX_SPAN;
    use crate::props::Method;
    use oxiflate_core::error::OxiFlateError;

    fn lcg_bytes(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn test_deflate_stored() {
        let data = b"0123456789";
        let compressed = deflate(data, 0).unwrap();
        // Header byte, LEN, NLEN, then the payload.
        assert_eq!(compressed.len(), 15);
        assert_eq!(&compressed[..5], &[0x01, 0x0A, 0x00, 0xF5, 0xFF]);
        assert_eq!(inflate(&compressed).unwrap(), data);

        assert_eq!(deflate(b"", 0).unwrap(), vec![0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_deflate_stored_multiple_blocks() {
        let data = lcg_bytes(MAX_STORED_BLOCK * 2, 3);
        let compressed = deflate(&data, 0).unwrap();
        assert_eq!(compressed.len(), data.len() + 10);
        assert_eq!(inflate(&compressed).unwrap(), data);
    }

    #[test]
    fn test_deflate_roundtrip() {
        let inputs: Vec<Vec<u8>> = vec![
            b"Hello".to_vec(),
            b"The quick brown fox jumps over the lazy dog".to_vec(),
            vec![0u8; 1000],
            (0..=255u8).collect(),
            b"abcabcabcabcabcabcabcabcabcabc".repeat(50),
        ];
        for level in [0u8, 1, 4, 5, 6, 9] {
            for input in &inputs {
                let compressed = deflate(input, level).unwrap();
                let decompressed = inflate(&compressed).unwrap();
                assert_eq!(&decompressed, input, "level {level}");
            }
        }
    }

    #[test]
    fn test_deflate_empty() {
        for level in [1u8, 6, 9] {
            let compressed = deflate(b"", level).unwrap();
            assert_eq!(compressed, vec![0x03, 0x00]);
        }
    }

    #[test]
    fn test_deflate_compresses_repetition() {
        let data = b"ABCD".repeat(2000);
        for level in [1u8, 6, 9] {
            let compressed = deflate(&data, level).unwrap();
            assert!(compressed.len() < 100, "level {level}: {}", compressed.len());
            assert_eq!(inflate(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_deflate_noise_stays_small() {
        let data = lcg_bytes(10_000, 7);
        let compressed = deflate(&data, 9).unwrap();
        // Never worse than stored blocks.
        assert!(compressed.len() <= data.len() + 5 * (data.len() / MAX_SPAN + 1));
        assert_eq!(inflate(&compressed).unwrap(), data);
    }

    #[test]
    fn test_deflate_spans_many_blocks() {
        let mut data = Vec::new();
        for i in 0..40_000u32 {
            data.extend_from_slice(format!("line {} of {}\n", i % 977, i % 13).as_bytes());
        }
        for level in [1u8, 9] {
            let mut deflater = Deflater::with_level(level);
            let mut compressed = Vec::new();
            let stats = deflater
                .encode_stream(&mut Cursor::new(&data), &mut compressed)
                .unwrap();
            assert_eq!(stats.bytes_in, data.len() as u64);
            assert_eq!(stats.bytes_out, compressed.len() as u64);
            assert_eq!(stats.crc32, oxiflate_core::Crc32::compute(&data));
            assert_eq!(inflate(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_deflate64_long_distance() {
        let chunk = lcg_bytes(2000, 11);
        let mut data = chunk.clone();
        data.extend(lcg_bytes(45_000, 12));
        data.extend_from_slice(&chunk);

        let compressed = deflate64(&data, 6).unwrap();
        assert_eq!(inflate64(&compressed).unwrap(), data);
        // The repeat at distance 47000 is out of reach for plain DEFLATE.
        let plain = deflate(&data, 6).unwrap();
        assert!(compressed.len() < plain.len());
    }

    #[test]
    fn test_progress_and_interrupt() {
        let data = b"progress ".repeat(30_000);
        let mut deflater = Deflater::with_level(1);
        let handle = deflater.interrupt_handle();
        let mut calls = 0;
        let err = deflater
            .encode_with_progress(
                &mut Cursor::new(&data),
                &mut Vec::<u8>::new(),
                &mut |_: u64, _: u64| {
                    calls += 1;
                    handle.trigger();
                },
            )
            .unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalid_properties_rejected() {
        let props = DeflateProperties {
            method: Method::BZip2,
            ..DeflateProperties::default()
        };
        let err = Deflater::new(props).encode_all(b"data").unwrap_err();
        assert!(matches!(err, OxiFlateError::UnsupportedMethod { .. }));

        let mut deflater = Deflater::default();
        deflater
            .set_properties(&[("NumPasses", PropValue::U32(2))])
            .unwrap();
        assert_eq!(deflater.properties().num_passes, 2);
    }

    #[test]
    fn test_split_keeps_cheaper_parts() {
        // Text followed by noise: the two halves want different encodings.
        let mut data = b"to be or not to be ".repeat(200);
        data.extend(lcg_bytes(4000, 5));
        let compressed = deflate(&data, 9).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), data);

        let mut parts = Vec::new();
        let tokens: Vec<Token> = data.iter().map(|&b| Token::Literal(b)).collect();
        let cost = split_blocks(
            &tokens,
            0,
            0,
            data.len(),
            3,
            DeflateVariant::Deflate,
            &mut parts,
        );
        let covered: usize = parts.iter().map(|p| p.bytes.len()).sum();
        assert_eq!(covered, data.len());
        assert!(cost <= choose_block(&tokens, data.len(), DeflateVariant::Deflate, 0).bits);
    }
}
