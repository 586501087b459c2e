//! Progress reporting hooks.
//!
//! The core never draws anything itself. A caller that wants a progress bar
//! implements [`ProgressObserver`] and attaches it to the fetcher.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::error::FetchPhase;
use super::planner::Chunk;

/// Receives progress notifications from a fetch run.
///
/// Methods are called from worker tasks concurrently and must not block.
/// All methods have empty defaults.
pub trait ProgressObserver: Send + Sync {
    /// The run entered `phase`.
    fn on_phase(&self, _phase: FetchPhase) {}

    /// Size is known and the chunk plan is fixed.
    fn on_plan(&self, _total_size: u64, _chunks: usize) {}

    /// A chunk attempt failed and will be retried.
    fn on_retry(&self, _chunk: &Chunk, _attempt: u32) {}

    /// A chunk was written to disk.
    fn on_chunk_complete(&self, _chunk: &Chunk) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Counters updated by chunk workers during a run.
///
/// Atomic so every worker can record into the same instance without a lock.
#[derive(Debug, Default)]
pub struct FetchStats {
    chunks_completed: AtomicUsize,
    retries: AtomicUsize,
    bytes_written: AtomicU64,
}

impl FetchStats {
    /// Creates a tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks written to disk.
    #[must_use]
    pub fn chunks_completed(&self) -> usize {
        self.chunks_completed.load(Ordering::SeqCst)
    }

    /// Failed attempts that were followed by another attempt.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Bytes written to the destination.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Copies the current counts into a new, unshared tracker.
    pub(crate) fn detach(&self) -> Self {
        Self {
            chunks_completed: AtomicUsize::new(self.chunks_completed()),
            retries: AtomicUsize::new(self.retries()),
            bytes_written: AtomicU64::new(self.bytes_written()),
        }
    }

    pub(crate) fn record_chunk(&self, bytes: u64) {
        self.chunks_completed.fetch_add(1, Ordering::SeqCst);
        self.bytes_written.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }
}
