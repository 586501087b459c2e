//! Error types for the fetch module.
//!
//! [`FetchError`] is the single terminal error a run can produce. Each variant
//! belongs to exactly one [`FetchPhase`], so callers can tell a transport
//! failure apart from data corruption without string matching.
//! [`ChunkAttemptError`] describes one failed attempt of a chunk worker; it is
//! recovered locally by retry and only surfaces wrapped in
//! [`FetchError::ChunkFailed`] once the retry budget is spent.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Phases of a fetch run, in the order the coordinator walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPhase {
    /// HEAD request for size and integrity tag.
    Resolving,
    /// Creating and sizing the destination file.
    Preparing,
    /// Ranged GETs in flight.
    Downloading,
    /// Hashing the finished file.
    Verifying,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Failed,
}

impl FetchPhase {
    /// Returns the stable lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Preparing => "preparing",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the metadata request could not produce a size.
#[derive(Debug, Error)]
pub enum ResolveFailure {
    /// Connection, DNS or TLS failure.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Non-success status code.
    #[error("HTTP {0}")]
    Status(u16),

    /// No `Content-Length` header on the response.
    #[error("Content-Length header not found")]
    MissingContentLength,

    /// `Content-Length` present but not a non-negative integer.
    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),
}

/// One failed attempt of a chunk worker.
#[derive(Debug, Error)]
pub enum ChunkAttemptError {
    /// Connection or body transfer failure.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Status other than 206 Partial Content or 200 OK.
    #[error("unexpected status HTTP {0}")]
    UnexpectedStatus(u16),

    /// Body length does not match the requested span.
    #[error("incomplete body: expected {expected} bytes, got {actual}")]
    IncompleteBody {
        /// Bytes requested.
        expected: u64,
        /// Bytes received.
        actual: u64,
    },

    /// Positional write to the destination file failed.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

impl ChunkAttemptError {
    /// Wraps a reqwest error, separating timeouts from other transport failures.
    #[must_use]
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error)
        }
    }
}

/// Terminal error of a fetch run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The job descriptor failed validation; no run was started.
    #[error("invalid job: {reason}")]
    InvalidJob {
        /// What was wrong with the input.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Size/tag could not be determined.
    #[error("failed to resolve metadata for {url}: {reason}")]
    Resolution {
        /// The URL being resolved.
        url: String,
        /// The underlying cause.
        #[source]
        reason: ResolveFailure,
    },

    /// The destination file could not be created or sized.
    #[error("failed to prepare {path}: {source}")]
    Preparation {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A chunk exhausted its retry budget.
    #[error("chunk {index} failed after {attempts} attempts: {last_error}")]
    ChunkFailed {
        /// Ordinal of the chunk.
        index: usize,
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last_error: ChunkAttemptError,
    },

    /// Written data could not be flushed to disk.
    #[error("failed to flush {path} to disk: {source}")]
    Persist {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A chunk worker task panicked.
    #[error("chunk worker panicked: {reason}")]
    WorkerPanicked {
        /// Panic message as reported by the runtime.
        reason: String,
    },

    /// Computed digest differs from the remote integrity tag.
    #[error("integrity check failed for {path}: expected MD5 {expected}, computed {actual}")]
    IntegrityMismatch {
        /// The file that was hashed.
        path: PathBuf,
        /// Tag reported by the server.
        expected: String,
        /// Digest computed locally.
        actual: String,
    },

    /// The finished file could not be read back for hashing.
    #[error("failed to read {path} for verification: {source}")]
    Verification {
        /// The file that was being hashed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled by its caller.
    #[error("fetch cancelled while {phase}")]
    Cancelled {
        /// Phase active when cancellation was observed.
        phase: FetchPhase,
    },

    /// The whole-run deadline elapsed.
    #[error("fetch exceeded its {after:?} deadline while {phase}")]
    DeadlineExceeded {
        /// Phase active when the deadline fired.
        phase: FetchPhase,
        /// Configured deadline.
        after: Duration,
    },
}

impl FetchError {
    /// Creates an invalid-job error.
    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }

    /// Creates a resolution error.
    pub fn resolution(url: impl Into<String>, reason: ResolveFailure) -> Self {
        Self::Resolution {
            url: url.into(),
            reason,
        }
    }

    /// Creates a preparation error.
    pub fn preparation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Preparation {
            path: path.into(),
            source,
        }
    }

    /// Creates a permanent chunk failure.
    pub fn chunk_failed(index: usize, attempts: u32, last_error: ChunkAttemptError) -> Self {
        Self::ChunkFailed {
            index,
            attempts,
            last_error,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a verification IO error.
    pub fn verification(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Verification {
            path: path.into(),
            source,
        }
    }

    /// Returns the phase this error belongs to, or `None` for errors raised
    /// before a run starts.
    #[must_use]
    pub fn phase(&self) -> Option<FetchPhase> {
        match self {
            Self::InvalidJob { .. } | Self::ClientBuild(_) => None,
            Self::Resolution { .. } => Some(FetchPhase::Resolving),
            Self::Preparation { .. } => Some(FetchPhase::Preparing),
            Self::ChunkFailed { .. } | Self::Persist { .. } | Self::WorkerPanicked { .. } => {
                Some(FetchPhase::Downloading)
            }
            Self::IntegrityMismatch { .. } | Self::Verification { .. } => {
                Some(FetchPhase::Verifying)
            }
            Self::Cancelled { phase } | Self::DeadlineExceeded { phase, .. } => Some(*phase),
        }
    }

    /// True when the file arrived but its content is wrong.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::IntegrityMismatch { .. })
    }

    /// True for failures caused by network transfer (resolution or chunk).
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::Resolution { reason, .. } => {
                matches!(
                    reason,
                    ResolveFailure::Network(_) | ResolveFailure::Timeout | ResolveFailure::Status(_)
                )
            }
            Self::ChunkFailed { last_error, .. } => !matches!(last_error, ChunkAttemptError::Write(_)),
            _ => false,
        }
    }

    /// True when the run stopped because of caller cancellation or deadline.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_display_includes_url_and_reason() {
        let error = FetchError::resolution(
            "https://example.com/data.bin",
            ResolveFailure::MissingContentLength,
        );
        let msg = error.to_string();
        assert!(msg.contains("https://example.com/data.bin"), "Expected URL in: {msg}");
        assert!(msg.contains("Content-Length"), "Expected reason in: {msg}");
        assert_eq!(error.phase(), Some(FetchPhase::Resolving));
    }

    #[test]
    fn test_integrity_mismatch_reports_both_digests() {
        let error = FetchError::integrity_mismatch(
            "/tmp/out.bin",
            "d41d8cd98f00b204e9800998ecf8427e",
            "9e107d9d372bb6826bd81d3542a419d6",
        );
        let msg = error.to_string();
        assert!(msg.contains("d41d8cd98f00b204e9800998ecf8427e"), "Expected tag in: {msg}");
        assert!(msg.contains("9e107d9d372bb6826bd81d3542a419d6"), "Expected digest in: {msg}");
        assert!(error.is_integrity_failure());
        assert!(!error.is_transport_failure());
        assert_eq!(error.phase(), Some(FetchPhase::Verifying));
    }

    #[test]
    fn test_chunk_failure_is_transport_failure() {
        let error = FetchError::chunk_failed(3, 4, ChunkAttemptError::UnexpectedStatus(503));
        let msg = error.to_string();
        assert!(msg.contains("chunk 3"), "Expected chunk index in: {msg}");
        assert!(msg.contains("4 attempts"), "Expected attempt count in: {msg}");
        assert!(error.is_transport_failure());
        assert!(!error.is_integrity_failure());
        assert_eq!(error.phase(), Some(FetchPhase::Downloading));
    }

    #[test]
    fn test_chunk_write_failure_is_not_transport_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full");
        let error = FetchError::chunk_failed(0, 1, ChunkAttemptError::Write(io));
        assert!(!error.is_transport_failure());
    }

    #[test]
    fn test_cancelled_carries_phase() {
        let error = FetchError::Cancelled {
            phase: FetchPhase::Downloading,
        };
        assert!(error.is_cancellation());
        assert_eq!(error.phase(), Some(FetchPhase::Downloading));
        assert!(error.to_string().contains("downloading"));
    }

    #[test]
    fn test_invalid_job_has_no_phase() {
        let error = FetchError::invalid_job("chunk size must be positive");
        assert_eq!(error.phase(), None);
        assert!(error.to_string().contains("chunk size"));
    }

    #[test]
    fn test_incomplete_body_display() {
        let error = ChunkAttemptError::IncompleteBody {
            expected: 100,
            actual: 42,
        };
        let msg = error.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("42"));
    }
}
