//! Progress reporting and cooperative cancellation.
//!
//! Codecs report `(bytes_in, bytes_out)` after each processed chunk and
//! check an [`Interrupt`] flag between chunks. Neither hook is consulted
//! inside a chunk, so cancellation latency is bounded by the chunk size.

use crate::error::{OxiFlateError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives progress updates from a running encode or decode.
///
/// Returning an error aborts the operation with that error.
pub trait Progress {
    /// Called after each chunk with cumulative byte counts.
    fn on_progress(&mut self, bytes_in: u64, bytes_out: u64) -> Result<()>;
}

impl<F: FnMut(u64, u64)> Progress for F {
    fn on_progress(&mut self, bytes_in: u64, bytes_out: u64) -> Result<()> {
        self(bytes_in, bytes_out);
        Ok(())
    }
}

/// A progress sink that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_progress(&mut self, _bytes_in: u64, _bytes_out: u64) -> Result<()> {
        Ok(())
    }
}

/// A shareable cancellation flag.
///
/// Clones observe the same flag, so one handle can be given to a codec and
/// another kept by the caller (or moved to another thread).
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Create an untriggered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// `Err(Interrupted)` if cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(OxiFlateError::Interrupted)
        } else {
            Ok(())
        }
    }
}
