//! Constants for the fetch module (defaults, limits, buffer sizes).

use std::time::Duration;

/// Default number of chunk workers allowed in flight at once.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on the worker budget.
pub const MAX_WORKERS: usize = 64;

/// Default chunk size (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default retries per chunk (so `DEFAULT_RETRIES + 1` attempts in total).
pub const DEFAULT_RETRIES: u32 = 3;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default base delay for linear retry backoff (`base * attempt`).
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on random jitter added to each backoff.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(250);

/// Read buffer used while hashing the finished file.
pub const VERIFY_BUFFER_SIZE: usize = 64 * 1024;
