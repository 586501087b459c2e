//! Chunk planning: splitting a file of known size into byte ranges.

use std::fmt;

use super::FetchError;

/// A contiguous byte range of the destination file fetched by one worker.
///
/// Chunks from [`plan`] partition `[0, total_size)` with no gaps or overlaps,
/// which is what lets workers write to the shared file without a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Ordinal of the chunk (0-based).
    pub index: usize,
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes, always greater than zero.
    pub length: u64,
}

impl Chunk {
    /// Offset of the last byte (inclusive).
    #[must_use]
    pub fn end_inclusive(&self) -> u64 {
        self.offset + self.length - 1
    }

    /// Value for the HTTP `Range` request header, e.g. `bytes=0-1023`.
    #[must_use]
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end_inclusive())
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} [{}..={}]",
            self.index,
            self.offset,
            self.end_inclusive()
        )
    }
}

/// Splits `total_size` bytes into chunks of `chunk_size` bytes.
///
/// Every chunk is exactly `chunk_size` long except the last, which holds the
/// remainder when `total_size` is not a multiple. A zero-byte file yields no
/// chunks.
///
/// # Errors
///
/// Returns [`FetchError::InvalidJob`] if `chunk_size` is zero.
pub fn plan(total_size: u64, chunk_size: u64) -> Result<Vec<Chunk>, FetchError> {
    if chunk_size == 0 {
        return Err(FetchError::invalid_job("chunk size must be greater than zero"));
    }

    let count = total_size.div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    let mut offset = 0u64;
    let mut index = 0usize;

    while offset < total_size {
        let length = chunk_size.min(total_size - offset);
        chunks.push(Chunk {
            index,
            offset,
            length,
        });
        offset += length;
        index += 1;
    }

    Ok(chunks)
}
