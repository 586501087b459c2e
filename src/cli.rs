//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use chunkfetch_core::fetch::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_RETRIES, DEFAULT_WORKERS, MAX_WORKERS,
};

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Download one file over HTTP with parallel range requests.
///
/// The file is split into fixed-size chunks, fetched concurrently, and
/// verified against the server's ETag when it is an MD5 digest.
#[derive(Parser, Debug)]
#[command(name = "chunkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the file to download
    pub url: String,

    /// Output file path (derived from the URL when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum chunk downloads in flight (1-64)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Chunk size in bytes; accepts K, M and G suffixes (e.g. 512K, 5M)
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_size)]
    pub chunk_size: u64,

    /// Retries per chunk after the first attempt (0-10)
    #[arg(short, long, default_value_t = DEFAULT_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: u32,

    /// Per-request timeout in seconds (1-3600)
    #[arg(short, long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: u64,

    /// Abort the whole download after this many seconds
    #[arg(long = "deadline", value_parser = clap::value_parser!(u64).range(1..))]
    pub deadline_secs: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_workers(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if (1..=MAX_WORKERS).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 1..={MAX_WORKERS}"))
    }
}

/// Parses a byte count with an optional binary `K`, `M` or `G` suffix.
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let token = raw.trim();
    let (digits, multiplier) = match token.char_indices().last() {
        Some((index, 'k' | 'K')) => (&token[..index], 1024),
        Some((index, 'm' | 'M')) => (&token[..index], 1024 * 1024),
        Some((index, 'g' | 'G')) => (&token[..index], 1024 * 1024 * 1024),
        _ => (token, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a size (expected e.g. 1048576, 512K, 5M, 1G)"))?;
    let size = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("`{raw}` is too large"))?;
    if size == 0 {
        return Err("chunk size must be greater than zero".to_string());
    }
    Ok(size)
}
