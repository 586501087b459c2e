//! CLI entry point for chunkfetch.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chunkfetch_core::fetch::{
    FetchError, FetchJob, FetchReport, Fetcher, ProgressObserver, Verification,
};
use clap::{CommandFactory, FromArgMatches};
use tracing::{debug, info, warn};
use url::Url;

mod app_config;
mod cli;
mod filename;
mod progress_ui;

use app_config::CliValueSources;
use cli::Args;
use progress_ui::BarObserver;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Failure,
    IntegrityMismatch,
    Cancelled,
}

impl ProcessExit {
    fn from_error(error: &FetchError) -> Self {
        if error.is_integrity_failure() {
            Self::IntegrityMismatch
        } else if error.is_cancellation() && !matches!(error, FetchError::DeadlineExceeded { .. }) {
            Self::Cancelled
        } else {
            Self::Failure
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::IntegrityMismatch => 3,
            Self::Cancelled => 130,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}

async fn run() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = CliValueSources::from_matches(&matches);

    let loaded = app_config::load_default_file_config()?;
    let args = app_config::apply_config_defaults(
        args,
        &sources,
        loaded.as_ref().map(|(_, config)| config),
    );

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    if let Some((path, _)) = &loaded {
        debug!(path = %path.display(), "loaded config file");
    }
    debug!(?args, "CLI arguments parsed");

    let output = match &args.output {
        Some(path) => path.clone(),
        None => {
            let url = Url::parse(args.url.trim())
                .with_context(|| format!("Invalid URL '{}'", args.url))?;
            let derived = PathBuf::from(filename::filename_from_url(&url));
            info!(output = %derived.display(), "output filename not specified, derived from URL");
            derived
        }
    };

    let job = FetchJob::builder(args.url.as_str(), &output)
        .workers(args.workers)
        .chunk_size(args.chunk_size)
        .retries(args.retries)
        .request_timeout(Duration::from_secs(args.timeout_secs))
        .deadline(args.deadline_secs.map(Duration::from_secs))
        .build()?;

    let observer = Arc::new(BarObserver::new(progress_ui::should_draw(
        io::stderr().is_terminal(),
        args.quiet,
        progress_ui::is_dumb_terminal(),
    )));
    let shared: Arc<dyn ProgressObserver> = observer.clone();
    let fetcher = Fetcher::new(job)?.with_observer(shared);

    let cancel = fetcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling download");
            cancel.cancel();
        }
    });

    info!(url = %args.url, output = %output.display(), "starting download");
    let result = fetcher.run().await;
    observer.finish();

    match result {
        Ok(report) => {
            if !args.quiet {
                println!("{}", completion_summary(&report));
            }
            Ok(ProcessExit::Success)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ProcessExit::from_error(&e))
        }
    }
}

fn completion_summary(report: &FetchReport) -> String {
    let check = match &report.verification {
        Verification::Verified { digest } => format!("md5 {digest} verified"),
        Verification::Skipped { reason } => format!("not verified: {reason}"),
    };
    format!(
        "Saved {} ({} bytes, {} chunks, {} retries, {:.1}s, {check})",
        report.path.display(),
        report.total_size,
        report.chunks,
        report.stats.retries(),
        report.elapsed.as_secs_f64()
    )
}
