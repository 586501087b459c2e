//! Chunk worker: fetches one byte range with retry and writes it in place.
//!
//! A worker buffers the whole span in memory and only writes once the body
//! has exactly the requested length, so a failed attempt never leaves bytes
//! on disk. Cancellation is checked before each attempt and raced against
//! every network wait and backoff sleep; a cancelled worker reports
//! [`ChunkOutcome::Aborted`] instead of an error.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::FetchError;
use super::client::HttpClient;
use super::error::ChunkAttemptError;
use super::planner::Chunk;
use super::progress::{FetchStats, ProgressObserver};
use super::retry::{RetryDecision, RetryPolicy, sleep_or_cancel};
use super::sink::FileSink;

/// Upper bound on the up-front body buffer; larger spans grow as bytes arrive.
const MAX_INITIAL_BUFFER: u64 = 1 << 20;

/// How a worker finished without a permanent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The span is on disk.
    Written {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// The run was cancelled before the span was written.
    Aborted,
}

/// Shared state handed to every chunk worker of one run.
#[derive(Clone)]
pub struct ChunkContext {
    pub(crate) client: HttpClient,
    pub(crate) url: Url,
    pub(crate) sink: Arc<FileSink>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) cancel: CancellationToken,
    pub(crate) stats: Arc<FetchStats>,
    pub(crate) observer: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for ChunkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkContext")
            .field("url", &self.url.as_str())
            .field("path", &self.sink.path())
            .field("retry_policy", &self.retry_policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Downloads `chunk` and writes it at its offset, retrying failed attempts.
///
/// # Errors
///
/// Returns [`FetchError::ChunkFailed`] with the last attempt's error once
/// the retry budget is spent.
#[instrument(skip(ctx, chunk), fields(chunk = chunk.index, offset = chunk.offset, len = chunk.length))]
pub async fn fetch_chunk(ctx: &ChunkContext, chunk: Chunk) -> Result<ChunkOutcome, FetchError> {
    let mut attempt = 0u32;

    loop {
        if ctx.cancel.is_cancelled() {
            debug!(attempt, "cancelled before attempt");
            return Ok(ChunkOutcome::Aborted);
        }
        attempt += 1;
        debug!(attempt, range = %chunk.range_header(), "requesting range");

        let body = tokio::select! {
            () = ctx.cancel.cancelled() => {
                debug!(attempt, "cancelled during transfer");
                return Ok(ChunkOutcome::Aborted);
            }
            body = download_span(&ctx.client, &ctx.url, &chunk) => body,
        };

        let result = match body {
            Ok(data) => ctx
                .sink
                .write_at(chunk.offset, data)
                .await
                .map_err(ChunkAttemptError::Write),
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => {
                ctx.stats.record_chunk(chunk.length);
                ctx.observer.on_chunk_complete(&chunk);
                debug!(attempt, "chunk written");
                return Ok(ChunkOutcome::Written { attempts: attempt });
            }
            Err(e) => e,
        };

        match ctx.retry_policy.should_retry(attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    attempt = next_attempt,
                    max_attempts = ctx.retry_policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying chunk"
                );
                ctx.stats.record_retry();
                ctx.observer.on_retry(&chunk, next_attempt);
                if !sleep_or_cancel(delay, &ctx.cancel).await {
                    debug!("cancelled during backoff");
                    return Ok(ChunkOutcome::Aborted);
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(attempts = attempt, error = %error, %reason, "chunk failed permanently");
                return Err(FetchError::chunk_failed(chunk.index, attempt, error));
            }
        }
    }
}

/// One GET for the chunk's range, returning exactly the chunk's bytes.
///
/// A 200 means the server ignored `Range` and sent the whole resource; the
/// chunk's slice is cut out of it.
async fn download_span(
    client: &HttpClient,
    url: &Url,
    chunk: &Chunk,
) -> Result<Vec<u8>, ChunkAttemptError> {
    let response = client
        .get_range(url, &chunk.range_header())
        .await
        .map_err(ChunkAttemptError::from_reqwest)?;

    let full_body = match response.status() {
        StatusCode::PARTIAL_CONTENT => false,
        StatusCode::OK => {
            debug!("server ignored Range, extracting slice from full body");
            true
        }
        status => return Err(ChunkAttemptError::UnexpectedStatus(status.as_u16())),
    };

    let skip = if full_body { chunk.offset } else { 0 };
    read_span(response.bytes_stream(), skip, chunk.length, full_body).await
}

/// Collects `length` bytes starting `skip` bytes into a body stream.
///
/// With `truncate` set, anything after the span is ignored and the stream
/// is dropped early. Otherwise the body must end exactly at the span's end.
async fn read_span<S, B>(
    stream: S,
    skip: u64,
    length: u64,
    truncate: bool,
) -> Result<Vec<u8>, ChunkAttemptError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let end = skip.saturating_add(length);
    let mut data = Vec::with_capacity(slice_index(length.min(MAX_INITIAL_BUFFER)));
    let mut position = 0u64;

    while let Some(piece) = stream.next().await {
        let piece = piece.map_err(ChunkAttemptError::from_reqwest)?;
        let piece = piece.as_ref();
        let piece_start = position;
        position += piece.len() as u64;

        if position > skip && piece_start < end {
            let from = slice_index(skip.saturating_sub(piece_start));
            let to = slice_index(end.min(position) - piece_start);
            data.extend_from_slice(&piece[from..to]);
        }

        if position >= end && truncate {
            break;
        }
        if position > end {
            return Err(ChunkAttemptError::IncompleteBody {
                expected: length,
                actual: position - skip,
            });
        }
    }

    let received = data.len() as u64;
    if received != length {
        return Err(ChunkAttemptError::IncompleteBody {
            expected: length,
            actual: received,
        });
    }
    Ok(data)
}

// Offsets within a single body piece always fit in usize.
fn slice_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
