//! The job descriptor: validated, immutable input to a fetch run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use super::FetchError;
use super::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRIES,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_JITTER, DEFAULT_WORKERS, MAX_WORKERS,
};
use super::retry::RetryPolicy;

/// Everything a run needs to know, checked once up front.
///
/// Build one with [`FetchJob::builder`]; every field is read-only afterwards.
#[derive(Debug, Clone)]
pub struct FetchJob {
    url: Url,
    destination: PathBuf,
    workers: usize,
    chunk_size: u64,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    connect_timeout: Duration,
    deadline: Option<Duration>,
}

impl FetchJob {
    /// Starts a builder with default tuning.
    #[must_use]
    pub fn builder(url: impl Into<String>, destination: impl Into<PathBuf>) -> FetchJobBuilder {
        FetchJobBuilder {
            url: url.into(),
            destination: destination.into(),
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retries: DEFAULT_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_jitter: DEFAULT_RETRY_JITTER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            deadline: None,
        }
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Destination file path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Maximum chunk workers in flight at once.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Bytes per chunk (the last chunk may be shorter).
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Retry policy applied to every chunk.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Timeout for each HTTP request, body included.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Timeout for establishing a connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Optional bound on the whole run.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

/// Builder for [`FetchJob`].
#[derive(Debug, Clone)]
#[must_use]
pub struct FetchJobBuilder {
    url: String,
    destination: PathBuf,
    workers: usize,
    chunk_size: u64,
    retries: u32,
    retry_base_delay: Duration,
    retry_jitter: Duration,
    request_timeout: Duration,
    connect_timeout: Duration,
    deadline: Option<Duration>,
}

impl FetchJobBuilder {
    /// Sets the worker budget (1..=64).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the chunk size in bytes.
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the retries per chunk after the first attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff unit; attempt `n` waits `n * delay`.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sets the maximum random jitter added to each backoff.
    pub fn retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds the whole run; `None` disables the bound.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validates the inputs and produces the job.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidJob`] when the URL is not an absolute
    /// `http`/`https` URL, the destination is empty, the worker budget is out
    /// of range, or the chunk size or a timeout is zero.
    pub fn build(self) -> Result<FetchJob, FetchError> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| FetchError::invalid_job(format!("invalid URL {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::invalid_job(format!(
                "unsupported URL scheme {:?}: expected http or https",
                url.scheme()
            )));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(FetchError::invalid_job("destination path is empty"));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(FetchError::invalid_job(format!(
                "invalid worker count {}: must be between 1 and {MAX_WORKERS}",
                self.workers
            )));
        }
        if self.chunk_size == 0 {
            return Err(FetchError::invalid_job("chunk size must be greater than zero"));
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(FetchError::invalid_job("timeouts must be greater than zero"));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(FetchError::invalid_job("deadline must be greater than zero"));
        }

        debug!(
            url = %url,
            destination = %self.destination.display(),
            workers = self.workers,
            chunk_size = self.chunk_size,
            retries = self.retries,
            "fetch job validated"
        );

        Ok(FetchJob {
            url,
            destination: self.destination,
            workers: self.workers,
            chunk_size: self.chunk_size,
            retry_policy: RetryPolicy::new(self.retries, self.retry_base_delay, self.retry_jitter),
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            deadline: self.deadline,
        })
    }
}
