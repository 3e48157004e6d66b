//! Progress reporting for batch downloads and unpack operations.
//!
//! Everything in this crate reports progress through the [`ProgressReporter`]
//! trait; the terminal rendering lives behind [`ProgressFactory`] so that the
//! real multi-bar UI and the test stubs are interchangeable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// A single progress bar as consumed by downloads and extraction.
///
/// `current_value` is monotonically non-decreasing under `increment_by`;
/// `complete` forces the total to match the current value so a bar never
/// finishes below (or above) 100%.
pub trait ProgressReporter: Send + Sync {
    /// Advance the bar by `n` units.
    fn increment_by(&self, n: u64);

    /// Adjust the total while the operation is in flight. `immediate`
    /// requests an immediate redraw where the renderer supports it.
    fn set_total(&self, total: u64, immediate: bool);

    fn current_value(&self) -> u64;

    fn set_current_value(&self, n: u64);

    /// Mark the operation finished, forcing total == current.
    fn complete(&self);
}

/// Mints progress bars for a batch operation: one count bar for the batch
/// plus a byte bar per fetch. `total: None` means the byte count is unknown
/// up front; the bar then renders bytes without a percentage until a total
/// is learned.
pub trait ProgressFactory: Send + Sync {
    fn count_bar(&self, name: &str, total: u64) -> Arc<dyn ProgressReporter>;

    fn byte_bar(&self, name: &str, total: Option<u64>) -> Arc<dyn ProgressReporter>;
}

/// Manages terminal progress bars for downloads and operations.
pub struct ProgressManager {
    multi: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            enabled,
        }
    }

    /// Check if progress rendering is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProgressFactory for ProgressManager {
    fn count_bar(&self, name: &str, total: u64) -> Arc<dyn ProgressReporter> {
        if !self.enabled {
            return Arc::new(BarReporter::new(ProgressBar::hidden(), false));
        }

        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Arc::new(BarReporter::new(pb, false))
    }

    fn byte_bar(&self, name: &str, total: Option<u64>) -> Arc<dyn ProgressReporter> {
        if !self.enabled {
            return Arc::new(BarReporter::new(ProgressBar::hidden(), true));
        }

        let pb = match total {
            Some(total) => {
                let pb = self.multi.add(ProgressBar::new(total));
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                        .unwrap()
                        .progress_chars("#>-"),
                );
                pb
            }
            None => {
                // Total unknown: render bytes only, no percentage.
                let pb = self.multi.add(ProgressBar::no_length());
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] {bytes} {msg}")
                        .unwrap(),
                );
                pb
            }
        };
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        // Byte bars are transient; the batch count bar stays.
        Arc::new(BarReporter::new(pb, true))
    }
}

/// Helper to format bytes for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

struct BarReporter {
    bar: ProgressBar,
    clear_on_complete: bool,
}

impl BarReporter {
    fn new(bar: ProgressBar, clear_on_complete: bool) -> Self {
        Self {
            bar,
            clear_on_complete,
        }
    }
}

impl ProgressReporter for BarReporter {
    fn increment_by(&self, n: u64) {
        self.bar.inc(n);
    }

    fn set_total(&self, total: u64, _immediate: bool) {
        self.bar.set_length(total);
    }

    fn current_value(&self) -> u64 {
        self.bar.position()
    }

    fn set_current_value(&self, n: u64) {
        self.bar.set_position(n);
    }

    fn complete(&self) {
        let current = self.bar.position();
        self.bar.set_length(current);
        if self.clear_on_complete {
            self.bar.finish_and_clear();
        } else {
            self.bar.finish();
        }
    }
}

/// Discards all progress. Used when no UI is attached.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn increment_by(&self, _n: u64) {}

    fn set_total(&self, _total: u64, _immediate: bool) {}

    fn current_value(&self) -> u64 {
        0
    }

    fn set_current_value(&self, _n: u64) {}

    fn complete(&self) {}
}

/// Factory counterpart of [`NoopReporter`].
pub struct NoopProgress;

impl ProgressFactory for NoopProgress {
    fn count_bar(&self, _name: &str, _total: u64) -> Arc<dyn ProgressReporter> {
        Arc::new(NoopReporter)
    }

    fn byte_bar(&self, _name: &str, _total: Option<u64>) -> Arc<dyn ProgressReporter> {
        Arc::new(NoopReporter)
    }
}

/// Records progress updates instead of rendering them. Intended for tests
/// that assert on reported byte counts and totals.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    current: AtomicU64,
    total: AtomicU64,
    completed: AtomicBool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for RecordingReporter {
    fn increment_by(&self, n: u64) {
        self.current.fetch_add(n, Ordering::SeqCst);
    }

    fn set_total(&self, total: u64, _immediate: bool) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn current_value(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    fn set_current_value(&self, n: u64) {
        self.current.store(n, Ordering::SeqCst);
    }

    fn complete(&self) {
        let current = self.current.load(Ordering::SeqCst);
        self.total.store(current, Ordering::SeqCst);
        self.completed.store(true, Ordering::SeqCst);
    }
}
