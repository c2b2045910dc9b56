//! Progress UI (spinner) for `run` batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use oa_downloader_core::pipeline::{DownloadResult, ProgressCallback};

/// Spinner reporting completed records.
#[derive(Debug, Clone)]
pub(crate) struct BatchProgress {
    spinner: ProgressBar,
    done: Arc<AtomicUsize>,
}

impl BatchProgress {
    /// Starts the spinner when `enabled`; otherwise returns `None`.
    pub(crate) fn start(enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Resolving records...");
        Some(Self {
            spinner,
            done: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Callback advancing the spinner as each record completes.
    pub(crate) fn callback(&self) -> ProgressCallback {
        let spinner = self.spinner.clone();
        let done = Arc::clone(&self.done);
        Arc::new(move |result: &DownloadResult| {
            let count = done.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = if result.success { "fetched" } else { "not fetched" };
            spinner.set_message(format!("[{count}] {} {outcome}", result.id));
        })
    }

    pub(crate) fn finish(self) {
        self.spinner.finish_and_clear();
    }
}
