//! Run coordinator: drives one fetch from HEAD to verified file.
//!
//! A run walks `Resolving → Preparing → Downloading → Verifying → Done`;
//! any failure moves it to `Failed`, and once the destination exists a
//! failed run deletes it. During `Downloading` a semaphore holds at most
//! `workers` chunk tasks in flight. The first permanent chunk failure is
//! reported through a one-slot channel and cancels the run's token so every
//! other worker stops at its next suspension point; later failures are
//! dropped.
//!
//! # Example
//!
//! ```no_run
//! use chunkfetch_core::fetch::{FetchJob, Fetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = FetchJob::builder("https://example.com/big.iso", "big.iso")
//!     .workers(8)
//!     .build()?;
//! let report = Fetcher::new(job)?.run().await?;
//! println!("{} bytes in {:?}", report.total_size, report.elapsed);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::FetchError;
use super::client::HttpClient;
use super::error::FetchPhase;
use super::job::FetchJob;
use super::metadata::{self, RemoteMetadata};
use super::planner::{self, Chunk};
use super::progress::{FetchStats, NoopObserver, ProgressObserver};
use super::sink::{self, FileSink};
use super::verify::{IntegrityTag, verify_file};
use super::worker::{self, ChunkContext, ChunkOutcome};

/// Result of a successful run.
#[derive(Debug)]
pub struct FetchReport {
    /// Where the file was written.
    pub path: PathBuf,
    /// Size reported by the server and written to disk.
    pub total_size: u64,
    /// Number of chunks the file was split into.
    pub chunks: usize,
    /// Outcome of the integrity check.
    pub verification: Verification,
    /// Worker counters.
    pub stats: FetchStats,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

/// Outcome of the integrity check of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The file's digest matched the server's tag.
    Verified {
        /// Lowercase hex digest.
        digest: String,
    },
    /// No check was possible.
    Skipped {
        /// Why the check was skipped.
        reason: String,
    },
}

impl Verification {
    /// True when the digest was checked and matched.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Runs a [`FetchJob`].
pub struct Fetcher {
    job: FetchJob,
    client: HttpClient,
    cancel: CancellationToken,
    observer: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("job", &self.job)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the client cannot be built.
    pub fn new(job: FetchJob) -> Result<Self, FetchError> {
        let client = HttpClient::new(job.request_timeout(), job.connect_timeout())?;
        Ok(Self {
            job,
            client,
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        })
    }

    /// Attaches a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that cancels the run when triggered.
    ///
    /// Cancelling it makes [`Fetcher::run`] return
    /// [`FetchError::Cancelled`] once every in-flight worker has stopped.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the job to completion.
    ///
    /// On success the destination holds the complete file. On failure the
    /// destination has been removed (if it was created) and the first error
    /// observed is returned.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`] except [`FetchError::InvalidJob`] and
    /// [`FetchError::ClientBuild`], which are raised before a run starts.
    #[instrument(skip(self), fields(url = %self.job.url(), path = %self.job.destination().display()))]
    pub async fn run(self) -> Result<FetchReport, FetchError> {
        let started = Instant::now();
        let run_cancel = self.cancel.child_token();
        let expired = CancellationToken::new();
        let deadline_task = self.job.deadline().map(|after| {
            let run_cancel = run_cancel.clone();
            let expired = expired.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                warn!(deadline_secs = after.as_secs_f64(), "deadline reached, cancelling run");
                expired.cancel();
                run_cancel.cancel();
            })
        });

        let stats = Arc::new(FetchStats::new());
        let result = self.execute(&run_cancel, &stats).await;

        if let Some(task) = deadline_task {
            task.abort();
        }

        let result = match (result, self.job.deadline()) {
            (Err(FetchError::Cancelled { phase }), Some(after)) if expired.is_cancelled() => {
                Err(FetchError::DeadlineExceeded { phase, after })
            }
            (result, _) => result,
        };

        match result {
            Ok((metadata, chunks, verification)) => {
                self.observer.on_phase(FetchPhase::Done);
                let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.detach());
                let elapsed = started.elapsed();
                info!(
                    total_size = metadata.total_size,
                    chunks,
                    retries = stats.retries(),
                    verified = verification.is_verified(),
                    elapsed_ms = elapsed.as_millis(),
                    "fetch complete"
                );
                Ok(FetchReport {
                    path: self.job.destination().to_path_buf(),
                    total_size: metadata.total_size,
                    chunks,
                    verification,
                    stats,
                    elapsed,
                })
            }
            Err(e) => {
                self.observer.on_phase(FetchPhase::Failed);
                if e.is_cancellation() {
                    warn!(error = %e, "fetch stopped");
                } else {
                    error!(error = %e, "fetch failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        stats: &Arc<FetchStats>,
    ) -> Result<(RemoteMetadata, usize, Verification), FetchError> {
        self.enter(FetchPhase::Resolving);
        let metadata = metadata::resolve(&self.client, self.job.url(), cancel).await?;
        let chunks = planner::plan(metadata.total_size, self.job.chunk_size())?;
        let chunk_count = chunks.len();
        self.observer.on_plan(metadata.total_size, chunk_count);
        info!(
            total_size = metadata.total_size,
            chunks = chunk_count,
            workers = self.job.workers(),
            "download planned"
        );

        self.enter(FetchPhase::Preparing);
        let path = self.job.destination();
        let file = match FileSink::prepare(path, metadata.total_size).await {
            Ok(file) => Arc::new(file),
            Err(e) => {
                sink::remove_partial(path).await;
                return Err(e);
            }
        };

        match self
            .download_and_verify(file, chunks, &metadata, cancel, stats)
            .await
        {
            Ok(verification) => Ok((metadata, chunk_count, verification)),
            Err(e) => {
                sink::remove_partial(path).await;
                Err(e)
            }
        }
    }

    /// Takes ownership of the sink so every handle is closed before the
    /// caller deletes the file on failure.
    async fn download_and_verify(
        &self,
        file: Arc<FileSink>,
        chunks: Vec<Chunk>,
        metadata: &RemoteMetadata,
        cancel: &CancellationToken,
        stats: &Arc<FetchStats>,
    ) -> Result<Verification, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                phase: FetchPhase::Preparing,
            });
        }

        self.enter(FetchPhase::Downloading);
        let ctx = ChunkContext {
            client: self.client.clone(),
            url: self.job.url().clone(),
            sink: Arc::clone(&file),
            retry_policy: self.job.retry_policy().clone(),
            cancel: cancel.clone(),
            stats: Arc::clone(stats),
            observer: Arc::clone(&self.observer),
        };
        self.dispatch(ctx, chunks).await?;

        let path = self.job.destination();
        file.sync()
            .await
            .map_err(|e| FetchError::Persist {
                path: path.to_path_buf(),
                source: e,
            })?;
        drop(file);

        let Some(raw_tag) = metadata.integrity_tag.as_deref() else {
            info!("server sent no ETag, skipping verification");
            return Ok(Verification::Skipped {
                reason: "server sent no ETag".to_string(),
            });
        };
        let Some(tag) = IntegrityTag::parse(raw_tag) else {
            warn!(etag = %raw_tag, "ETag is not a recognised digest, skipping verification");
            return Ok(Verification::Skipped {
                reason: format!("unrecognised ETag format {raw_tag:?}"),
            });
        };

        self.enter(FetchPhase::Verifying);
        let digest = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(FetchError::Cancelled { phase: FetchPhase::Verifying });
            }
            digest = verify_file(path, &tag) => digest?,
        };
        info!(digest = %digest, algorithm = tag.algorithm(), "integrity verified");
        Ok(Verification::Verified { digest })
    }

    /// Spawns one task per chunk under the worker budget and joins them all.
    async fn dispatch(&self, ctx: ChunkContext, chunks: Vec<Chunk>) -> Result<(), FetchError> {
        let semaphore = Arc::new(Semaphore::new(self.job.workers()));
        let (failure_tx, mut failure_rx) = mpsc::channel::<FetchError>(1);
        let mut tasks = JoinSet::new();
        let cancel = ctx.cancel.clone();

        for chunk in chunks {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(next_chunk = chunk.index, "run cancelled, dispatch stopped");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let ctx = ctx.clone();
            let failure_tx = failure_tx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match worker::fetch_chunk(&ctx, chunk).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        report_failure(&failure_tx, e);
                        ctx.cancel.cancel();
                        ChunkOutcome::Aborted
                    }
                }
            });
        }
        drop(ctx);

        debug!(task_count = tasks.len(), "waiting for chunk workers");
        let mut aborted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ChunkOutcome::Written { .. }) => {}
                Ok(ChunkOutcome::Aborted) => aborted += 1,
                Err(e) => {
                    error!(error = %e, "chunk worker panicked");
                    report_failure(
                        &failure_tx,
                        FetchError::WorkerPanicked {
                            reason: e.to_string(),
                        },
                    );
                    cancel.cancel();
                }
            }
        }
        drop(failure_tx);

        if let Ok(e) = failure_rx.try_recv() {
            return Err(e);
        }
        if cancel.is_cancelled() {
            debug!(aborted, "all workers stopped after cancellation");
            return Err(FetchError::Cancelled {
                phase: FetchPhase::Downloading,
            });
        }
        Ok(())
    }

    fn enter(&self, phase: FetchPhase) {
        debug!(phase = %phase, "entering phase");
        self.observer.on_phase(phase);
    }
}

/// Records a permanent failure unless one is already waiting.
fn report_failure(failure_tx: &mpsc::Sender<FetchError>, error: FetchError) {
    if let Err(mpsc::error::TrySendError::Full(dropped)) = failure_tx.try_send(error) {
        debug!(error = %dropped, "failure already reported, dropping");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_is_verified() {
        let verified = Verification::Verified {
            digest: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        let skipped = Verification::Skipped {
            reason: "server sent no ETag".to_string(),
        };
        assert!(verified.is_verified());
        assert!(!skipped.is_verified());
    }

    #[tokio::test]
    async fn test_report_failure_keeps_first() {
        let (tx, mut rx) = mpsc::channel(1);
        report_failure(&tx, FetchError::invalid_job("first"));
        report_failure(&tx, FetchError::invalid_job("second"));
        drop(tx);

        let kept = rx.recv().await.unwrap();
        assert!(kept.to_string().contains("first"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_token_is_shared() {
        let job = FetchJob::builder("http://127.0.0.1:9/file", "out.bin")
            .build()
            .unwrap();
        let fetcher = Fetcher::new(job).unwrap();
        let token = fetcher.cancellation_token();
        token.cancel();
        assert!(fetcher.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_run_fails_in_resolving() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");
        let job = FetchJob::builder("http://127.0.0.1:9/file", &dest)
            .build()
            .unwrap();
        let fetcher = Fetcher::new(job).unwrap();
        fetcher.cancellation_token().cancel();

        let err = fetcher.run().await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Cancelled {
                phase: FetchPhase::Resolving
            }
        ));
        assert!(!dest.exists());
    }
}
