//! Chunkfetch Core Library
//!
//! This library provides the fetch engine behind the `chunkfetch` tool: it
//! downloads one file over HTTP as a set of concurrent range requests and
//! checks the result against the server's ETag.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - job descriptor, metadata resolution, chunk workers, the run
//!   coordinator and integrity verification
//!
//! The library never parses arguments or prints. It reports through
//! `tracing` events and the [`fetch::ProgressObserver`] trait.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
mod user_agent;

// Re-export commonly used types
pub use fetch::{
    FetchError, FetchJob, FetchJobBuilder, FetchPhase, FetchReport, Fetcher, ProgressObserver,
    RetryPolicy, Verification,
};
