//! Parallel, chunked, integrity-checked HTTP file fetching.
//!
//! A run resolves the remote size and ETag with one HEAD request,
//! preallocates the destination, splits it into fixed-size byte ranges and
//! downloads those ranges concurrently with ranged GETs. Each range is
//! retried independently. When the ETag is an MD5 digest the finished file
//! is hashed and compared before the run reports success.
//!
//! # Features
//!
//! - Bounded parallelism (a fixed number of chunk workers in flight)
//! - Per-chunk retry with linear backoff and jitter
//! - Cooperative cancellation, including an optional whole-run deadline
//! - Partial files are removed on any failure
//!
//! # Example
//!
//! ```no_run
//! use chunkfetch_core::fetch::{FetchJob, Fetcher, Verification};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = FetchJob::builder("https://example.com/dataset.tar", "dataset.tar")
//!     .workers(8)
//!     .chunk_size(8 * 1024 * 1024)
//!     .build()?;
//! let report = Fetcher::new(job)?.run().await?;
//! if let Verification::Verified { digest } = &report.verification {
//!     println!("md5 {digest}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod coordinator;
mod error;
mod job;
pub mod metadata;
pub mod planner;
mod progress;
mod retry;
pub mod sink;
pub mod verify;
mod worker;

pub use client::HttpClient;
pub use coordinator::{FetchReport, Fetcher, Verification};
pub use error::{ChunkAttemptError, FetchError, FetchPhase, ResolveFailure};
pub use job::{FetchJob, FetchJobBuilder};
pub use metadata::{RemoteMetadata, resolve};
pub use planner::{Chunk, plan};
pub use progress::{FetchStats, NoopObserver, ProgressObserver};
pub use retry::{RetryDecision, RetryPolicy, sleep_or_cancel};
pub use sink::FileSink;
pub use verify::{IntegrityTag, verify_file};
pub use worker::ChunkOutcome;
