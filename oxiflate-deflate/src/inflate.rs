//! Streaming DEFLATE / Deflate64 decompression (single thread).
//!
//! [`Inflater`] drives a [`BlockDecoder`] in chunks of
//! [`InflateOptions::chunk_size`] output bytes. Between chunks it reports
//! progress and checks its [`Interrupt`]. When the expected output size is
//! known, the last chunk is clipped so decoding stops exactly there, without
//! reading another block header.

use crate::decoder::{BlockDecoder, SymbolSink};
use crate::tables::DeflateVariant;
use oxiflate_core::error::{OxiFlateError, Result};
use oxiflate_core::progress::{Interrupt, NoProgress, Progress};
use oxiflate_core::traits::{StreamDecoder, StreamStats};
use oxiflate_core::{BitReader, CrcWriter, RingBuffer};
use std::io::{Cursor, Read, Write};

/// Default output bytes decoded between progress reports.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 18;

/// Decoder options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflateOptions {
    /// Stream flavour.
    pub variant: DeflateVariant,
    /// Accept stored blocks whose LEN/NLEN fields disagree.
    pub nsis_mode: bool,
    /// Stop after exactly this many output bytes.
    pub expected_size: Option<u64>,
    /// Output bytes decoded between progress reports and interrupt checks.
    pub chunk_size: usize,
}

impl Default for InflateOptions {
    fn default() -> Self {
        Self {
            variant: DeflateVariant::Deflate,
            nsis_mode: false,
            expected_size: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl InflateOptions {
    /// Options for a Deflate64 stream.
    pub fn deflate64() -> Self {
        Self {
            variant: DeflateVariant::Deflate64,
            ..Self::default()
        }
    }

    /// Set the expected output size.
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Set the chunk size (at least one byte).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Budget for the next chunk, or `None` once the expected size is met.
    pub(crate) fn next_budget(&self, produced: u64) -> Option<usize> {
        let chunk = self.chunk_size.max(1);
        match self.expected_size {
            Some(expected) if produced >= expected => None,
            Some(expected) => Some(chunk.min((expected - produced).min(usize::MAX as u64) as usize)),
            None => Some(chunk),
        }
    }

    /// Error for a stream whose final block ended before the expected size.
    pub(crate) fn check_complete(&self, produced: u64, offset: u64) -> Result<()> {
        match self.expected_size {
            Some(expected) if produced < expected => Err(OxiFlateError::corrupted(
                offset,
                format!("stream ended after {produced} of {expected} expected bytes"),
            )),
            _ => Ok(()),
        }
    }
}

/// Writes decoded symbols into the history window, which passes finished
/// bytes on to the output.
struct WindowSink<'a, W: Write> {
    window: &'a mut RingBuffer,
    output: &'a mut W,
}

impl<W: Write> SymbolSink for WindowSink<'_, W> {
    #[inline]
    fn literal(&mut self, byte: u8) -> Result<()> {
        self.window.put_byte(byte, &mut *self.output)
    }

    fn literals(&mut self, bytes: &[u8]) -> Result<()> {
        self.window.put_bytes(bytes, &mut *self.output)
    }

    #[inline]
    fn copy(&mut self, distance: usize, length: usize) -> Result<()> {
        self.window.repeat_bytes(distance, length, &mut *self.output)
    }
}

/// Single-threaded streaming decoder.
#[derive(Debug, Clone, Default)]
pub struct Inflater {
    options: InflateOptions,
    interrupt: Interrupt,
}

impl Inflater {
    /// Create a decoder with the given options.
    pub fn new(options: InflateOptions) -> Self {
        Self {
            options,
            interrupt: Interrupt::new(),
        }
    }

    /// Use `interrupt` as the cancellation flag.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// A handle that cancels this decoder from elsewhere.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Request cancellation; a running [`stream`](Self::stream) returns
    /// [`OxiFlateError::Interrupted`] at the next chunk boundary.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// The options in use.
    pub fn options(&self) -> &InflateOptions {
        &self.options
    }

    /// Decode all of `input` into `output`.
    pub fn stream<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<StreamStats> {
        self.stream_with_progress(input, output, &mut NoProgress)
    }

    /// Decode all of `input` into `output`, reporting progress per chunk.
    ///
    /// Bytes already written when an error occurs stay written.
    pub fn stream_with_progress<R: Read, W: Write, P: Progress + ?Sized>(
        &mut self,
        input: &mut R,
        output: &mut W,
        progress: &mut P,
    ) -> Result<StreamStats> {
        let options = self.options;
        let mut reader = BitReader::new(input);
        let mut decoder = BlockDecoder::new(options.variant, options.nsis_mode);
        let mut window = RingBuffer::new(options.variant.window_size());
        let mut output = CrcWriter::new(output);

        while !decoder.is_finished() {
            let Some(budget) = options.next_budget(decoder.total_out()) else {
                break;
            };
            self.interrupt.check()?;
            let mut sink = WindowSink {
                window: &mut window,
                output: &mut output,
            };
            let produced = decoder.decode_chunk(&mut reader, &mut sink, budget)?;
            window.flush(&mut output)?;
            log::trace!(
                "inflate chunk: {produced} bytes, {} in / {} out",
                reader.bytes_consumed(),
                decoder.total_out()
            );
            progress.on_progress(reader.bytes_consumed(), decoder.total_out())?;
        }
        if decoder.is_finished() {
            options.check_complete(decoder.total_out(), reader.bytes_consumed())?;
        }

        window.flush(&mut output)?;
        output.flush()?;
        Ok(StreamStats {
            bytes_in: reader.bytes_consumed(),
            bytes_out: output.count(),
            crc32: output.crc(),
        })
    }
}

impl StreamDecoder for Inflater {
    fn decode<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<StreamStats> {
        self.stream(input, output)
    }
}

fn inflate_with(data: &[u8], options: InflateOptions) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(options.expected_size.unwrap_or(0).min(1 << 30) as usize);
    Inflater::new(options).stream(&mut Cursor::new(data), &mut output)?;
    Ok(output)
}

/// Decompress a raw DEFLATE stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    inflate_with(data, InflateOptions::default())
}

/// Decompress a raw Deflate64 stream.
pub fn inflate64(data: &[u8]) -> Result<Vec<u8>> {
    inflate_with(data, InflateOptions::deflate64())
}

/// Decompress a raw DEFLATE stream whose output size is known.
///
/// Decoding stops after `expected_size` bytes even if the stream has no
/// final block there.
pub fn inflate_with_size(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    inflate_with(
        data,
        InflateOptions::default().with_expected_size(expected_size),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A non-final stored block holding `payload`.
    fn open_stored_block(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u16;
        let mut out = vec![0x00];
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_inflate_stored() {
        let compressed = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(inflate(&compressed).unwrap(), b"Hello");
    }

    #[test]
    fn test_inflate_empty() {
        let compressed = [0x01, 0x00, 0x00, 0xFF, 0xFF];
        assert!(inflate(&compressed).unwrap().is_empty());
        // Final fixed block holding only end-of-block.
        assert!(inflate(&[0x03, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn test_size_hint_stops_without_final_block() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let stream = open_stored_block(&payload);

        let out = inflate_with_size(&stream, 1000).unwrap();
        assert_eq!(out, payload);

        let err = inflate(&stream).unwrap_err();
        assert!(matches!(err, OxiFlateError::Truncated { .. }));
    }

    #[test]
    fn test_size_hint_shorter_than_stream() {
        let compressed = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(inflate_with_size(&compressed, 3).unwrap(), b"Hel");
        assert!(inflate_with_size(&compressed, 6).unwrap_err().is_data_error());
    }

    #[test]
    fn test_stats_and_progress() {
        let mut stream = open_stored_block(&[7u8; 300]);
        stream.extend_from_slice(&[0x01, 0x02, 0x00, 0xFD, 0xFF, 1, 2]);

        let mut calls = Vec::new();
        let mut output = Vec::new();
        let mut inflater = Inflater::new(InflateOptions::default().with_chunk_size(100));
        let stats = inflater
            .stream_with_progress(
                &mut Cursor::new(&stream),
                &mut output,
                &mut |bytes_in: u64, bytes_out: u64| calls.push((bytes_in, bytes_out)),
            )
            .unwrap();

        assert_eq!(output.len(), 302);
        assert_eq!(stats.bytes_out, 302);
        assert_eq!(stats.bytes_in, stream.len() as u64);
        assert_eq!(stats.crc32, oxiflate_core::Crc32::compute(&output));
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.last().map(|c| c.1), Some(302));
    }

    #[test]
    fn test_interrupt_before_start() {
        let compressed = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        let mut inflater = Inflater::default();
        inflater.interrupt();
        let err = inflater
            .stream(&mut Cursor::new(&compressed), &mut Vec::<u8>::new())
            .unwrap_err();
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_interrupt_between_chunks() {
        let stream = {
            let mut s = open_stored_block(&[1u8; 4000]);
            s.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
            s
        };
        let mut inflater = Inflater::new(InflateOptions::default().with_chunk_size(1000));
        let handle = inflater.interrupt_handle();
        let mut output = Vec::new();
        let err = inflater
            .stream_with_progress(
                &mut Cursor::new(&stream),
                &mut output,
                &mut |_: u64, _: u64| handle.trigger(),
            )
            .unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(output.len(), 1000);
    }
}
