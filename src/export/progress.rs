//! Progress tracking for export operations
//!
//! Emits an `info!` line every [`LOG_INTERVAL`] records and optionally
//! drives a terminal spinner with throughput.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Records between progress log lines
pub const LOG_INTERVAL: u64 = 50_000;

/// Progress tracker for export operations
pub struct ProgressTracker {
    /// Number of records processed so far
    processed: AtomicU64,
    /// Start time of the operation
    start_time: Instant,
    /// Records between log lines
    log_interval: u64,
    /// Spinner (optional, disabled for non-interactive runs)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a spinner
    pub fn new(enable_bar: bool) -> Self {
        Self::with_interval(enable_bar, LOG_INTERVAL)
    }

    /// Create a tracker logging every `log_interval` records
    pub fn with_interval(enable_bar: bool, log_interval: u64) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} records {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        Self {
            processed: AtomicU64::new(0),
            start_time: Instant::now(),
            log_interval: log_interval.max(1),
            bar,
        }
    }

    /// Update progress with the total number of records processed so far
    ///
    /// # Returns
    /// * `bool` - Whether a progress line was logged for this count
    pub fn update(&self, count: u64) -> bool {
        self.processed.store(count, Ordering::Relaxed);

        if let Some(ref bar) = self.bar {
            bar.set_position(count);
            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                bar.set_message(format!("({:.0} records/sec)", count as f64 / elapsed));
            }
        }

        if count > 0 && count % self.log_interval == 0 {
            info!("Processed {} records", count);
            true
        } else {
            false
        }
    }

    /// Records processed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_at_fixed_cadence() {
        let tracker = ProgressTracker::new(false);
        assert!(!tracker.update(1));
        assert!(!tracker.update(49_999));
        assert!(tracker.update(50_000));
        assert!(!tracker.update(50_001));
        assert!(tracker.update(100_000));
        assert_eq!(tracker.processed(), 100_000);
    }

    #[test]
    fn test_custom_interval() {
        let tracker = ProgressTracker::with_interval(false, 2);
        assert!(!tracker.update(1));
        assert!(tracker.update(2));
        assert!(!tracker.update(0));
    }

    #[test]
    fn test_tracker_with_bar() {
        let tracker = ProgressTracker::new(true);
        tracker.update(10);
        tracker.finish();
    }
}
