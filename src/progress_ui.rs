//! Progress bar for a fetch run.

use std::time::Duration;

use chunkfetch_core::fetch::{Chunk, FetchPhase, ProgressObserver};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner} {msg:12} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Returns true when a live bar should be drawn on stderr.
pub(crate) fn should_draw(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

/// Byte-level progress bar fed by the fetch core.
#[derive(Debug)]
pub(crate) struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    pub(crate) fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Clears the bar from the terminal.
    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressObserver for BarObserver {
    fn on_phase(&self, phase: FetchPhase) {
        self.bar.set_message(phase.as_str());
    }

    fn on_plan(&self, total_size: u64, _chunks: usize) {
        self.bar.set_length(total_size);
    }

    fn on_retry(&self, chunk: &Chunk, attempt: u32) {
        self.bar.set_message(format!("chunk {} try {attempt}", chunk.index));
    }

    fn on_chunk_complete(&self, chunk: &Chunk) {
        self.bar.inc(chunk.length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_draw_only_on_interactive_terminal() {
        assert!(should_draw(true, false, false));
        assert!(!should_draw(false, false, false));
        assert!(!should_draw(true, true, false));
        assert!(!should_draw(true, false, true));
    }

    #[test]
    fn test_bar_observer_counts_completed_bytes() {
        let observer = BarObserver::new(false);
        observer.on_plan(30, 3);
        observer.on_chunk_complete(&Chunk {
            index: 0,
            offset: 0,
            length: 10,
        });
        observer.on_chunk_complete(&Chunk {
            index: 2,
            offset: 20,
            length: 10,
        });
        assert_eq!(observer.position(), 20);
        observer.finish();
    }
}
