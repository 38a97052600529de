//! Pipelined DEFLATE decompression on two threads.
//!
//! The calling thread parses the bit stream and records each chunk's
//! literals and back-references in a [`Batch`]. A writer thread owns the
//! history window and the output sink and replays batches in order.
//!
//! Batches are reusable slots cycled through two bounded channels:
//!
//! ```text
//!            free (capacity N)
//!   ┌───────────────────────────────┐
//!   ▼                               │
//! decoder ──► filled (capacity N) ──► writer
//! ```
//!
//! The decoder blocks when every slot is in flight and the writer blocks
//! when none is ready, so at most `N` batches of decoded instructions exist
//! at any time. The decoder ends the pipeline with [`Message::Stop`], also
//! after an error or interrupt, so the writer never waits forever; if the
//! writer fails it drops its channel ends, which unblocks the decoder.

use crate::decoder::{BlockDecoder, SymbolSink};
use crate::inflate::InflateOptions;
use crossbeam_channel::{Receiver, Sender, bounded};
use oxiflate_core::error::{OxiFlateError, Result};
use oxiflate_core::progress::{Interrupt, NoProgress, Progress};
use oxiflate_core::traits::StreamStats;
use oxiflate_core::{BitReader, CrcWriter, RingBuffer};
use std::io::{self, Cursor, Read, Write};
use std::thread;

/// Default number of batch slots.
pub const DEFAULT_BATCHES: usize = 4;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    /// The next `n` bytes of the batch's literal buffer.
    Literals(u32),
    /// A back-reference.
    Copy { distance: u32, length: u32 },
}

/// A reusable slot holding one chunk of decoded instructions.
#[derive(Debug, Default)]
struct Batch {
    literals: Vec<u8>,
    ops: Vec<Op>,
}

impl Batch {
    fn clear(&mut self) {
        self.literals.clear();
        self.ops.clear();
    }

    fn push_literals(&mut self, bytes: &[u8]) {
        self.literals.extend_from_slice(bytes);
        match self.ops.last_mut() {
            Some(Op::Literals(n)) => *n += bytes.len() as u32,
            _ => self.ops.push(Op::Literals(bytes.len() as u32)),
        }
    }

    /// Write the batch into the window.
    fn replay<W: Write + ?Sized>(&self, window: &mut RingBuffer, output: &mut W) -> Result<()> {
        let mut offset = 0usize;
        for op in &self.ops {
            match *op {
                Op::Literals(n) => {
                    let end = offset + n as usize;
                    window.put_bytes(&self.literals[offset..end], output)?;
                    offset = end;
                }
                Op::Copy { distance, length } => {
                    window.repeat_bytes(distance as usize, length as usize, output)?;
                }
            }
        }
        Ok(())
    }
}

impl SymbolSink for Batch {
    #[inline]
    fn literal(&mut self, byte: u8) -> Result<()> {
        self.push_literals(&[byte]);
        Ok(())
    }

    fn literals(&mut self, bytes: &[u8]) -> Result<()> {
        self.push_literals(bytes);
        Ok(())
    }

    #[inline]
    fn copy(&mut self, distance: usize, length: usize) -> Result<()> {
        self.ops.push(Op::Copy {
            distance: distance as u32,
            length: length as u32,
        });
        Ok(())
    }
}

/// Messages on the filled queue.
#[derive(Debug)]
enum Message {
    Batch(Batch),
    Stop,
}

/// Two-thread streaming decoder.
///
/// Produces byte-for-byte the same output as [`Inflater`](crate::Inflater).
#[derive(Debug, Clone)]
pub struct MtInflater {
    options: InflateOptions,
    interrupt: Interrupt,
    batches: usize,
}

impl Default for MtInflater {
    fn default() -> Self {
        Self::new(InflateOptions::default())
    }
}

impl MtInflater {
    /// Create a decoder with the given options.
    pub fn new(options: InflateOptions) -> Self {
        Self {
            options,
            interrupt: Interrupt::new(),
            batches: DEFAULT_BATCHES,
        }
    }

    /// Number of batch slots in flight (at least one).
    pub fn with_batches(mut self, batches: usize) -> Self {
        self.batches = batches.max(1);
        self
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

    /// Request cancellation at the next chunk boundary.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// Decode all of `input` into `output`.
    pub fn stream<R: Read, W: Write + Send>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<StreamStats> {
        self.stream_with_progress(input, output, &mut NoProgress)
    }

    /// Decode all of `input` into `output`, reporting progress per batch.
    ///
    /// Progress counts bytes decoded, which may run ahead of bytes written
    /// by up to the number of batch slots.
    pub fn stream_with_progress<R: Read, W: Write + Send, P: Progress + ?Sized>(
        &mut self,
        input: &mut R,
        output: &mut W,
        progress: &mut P,
    ) -> Result<StreamStats> {
        let (free_tx, free_rx) = bounded::<Batch>(self.batches);
        let (filled_tx, filled_rx) = bounded::<Message>(self.batches);
        for _ in 0..self.batches {
            free_tx
                .send(Batch::default())
                .map_err(|_| writer_gone())?;
        }

        let options = self.options;
        let window = RingBuffer::new(options.variant.window_size());

        thread::scope(|scope| {
            let writer = scope.spawn(move || write_batches(filled_rx, free_tx, window, output));

            let decoded = self.decode_batches(input, &filled_tx, &free_rx, progress);
            // Ignored: fails only when the writer has already stopped.
            let _ = filled_tx.send(Message::Stop);
            drop(filled_tx);

            let written = writer
                .join()
                .map_err(|_| OxiFlateError::Io(io::Error::other("writer thread panicked")))?;

            match (decoded, written) {
                (Err(e), Ok(_)) => Err(e),
                (Err(e), Err(w)) if !matches!(e, OxiFlateError::Io(_)) => {
                    log::debug!("writer also failed: {w}");
                    Err(e)
                }
                (Err(_), Err(w)) | (Ok(_), Err(w)) => Err(w),
                (Ok(bytes_in), Ok((bytes_out, crc32))) => Ok(StreamStats {
                    bytes_in,
                    bytes_out,
                    crc32,
                }),
            }
        })
    }

    /// Decoder side: fill free batches and queue them.
    fn decode_batches<R: Read, P: Progress + ?Sized>(
        &self,
        input: &mut R,
        filled: &Sender<Message>,
        free: &Receiver<Batch>,
        progress: &mut P,
    ) -> Result<u64> {
        let options = self.options;
        let mut reader = BitReader::new(input);
        let mut decoder = BlockDecoder::new(options.variant, options.nsis_mode);

        while !decoder.is_finished() {
            let Some(budget) = options.next_budget(decoder.total_out()) else {
                break;
            };
            self.interrupt.check()?;
            let mut batch = free.recv().map_err(|_| writer_gone())?;
            batch.clear();
            decoder.decode_chunk(&mut reader, &mut batch, budget)?;
            log::trace!(
                "queued batch: {} ops, {} literal bytes",
                batch.ops.len(),
                batch.literals.len()
            );
            filled
                .send(Message::Batch(batch))
                .map_err(|_| writer_gone())?;
            progress.on_progress(reader.bytes_consumed(), decoder.total_out())?;
        }
        if decoder.is_finished() {
            options.check_complete(decoder.total_out(), reader.bytes_consumed())?;
        }
        Ok(reader.bytes_consumed())
    }
}

fn writer_gone() -> OxiFlateError {
    OxiFlateError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "writer thread stopped",
    ))
}

/// Writer side: replay batches until `Stop` or the decoder hangs up.
fn write_batches<W: Write>(
    filled: Receiver<Message>,
    free: Sender<Batch>,
    mut window: RingBuffer,
    output: &mut W,
) -> Result<(u64, u32)> {
    let mut output = CrcWriter::new(output);
    while let Ok(Message::Batch(batch)) = filled.recv() {
        batch.replay(&mut window, &mut output)?;
        window.flush(&mut output)?;
        // The decoder may already be done and no longer want slots.
        let _ = free.send(batch);
    }
    window.flush(&mut output)?;
    output.flush()?;
    Ok((output.count(), output.crc()))
}

/// Decompress a raw DEFLATE stream on two threads.
pub fn inflate_mt(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    MtInflater::default().stream(&mut Cursor::new(data), &mut output)?;
    Ok(output)
}
