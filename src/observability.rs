//! Pipeline counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the scheduler and its units
#[derive(Debug, Default)]
pub struct Metrics {
    fetch_attempts: AtomicU64,
    units_succeeded: AtomicU64,
    units_failed: AtomicU64,
    units_skipped: AtomicU64,
    retries_scheduled: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_attempted(&self) {
        self.fetch_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "fetch_attempts", "Metric incremented");
    }

    pub fn unit_succeeded(&self) {
        self.units_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "units_succeeded", "Metric incremented");
    }

    pub fn unit_failed(&self) {
        self.units_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "units_failed", "Metric incremented");
    }

    pub fn unit_skipped(&self) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "units_skipped", "Metric incremented");
    }

    pub fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "retries_scheduled", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            units_succeeded: self.units_succeeded.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fetch_attempts: u64,
    /// Unit attempts that ended in success, skips included
    pub units_succeeded: u64,
    /// Unit attempts that ended in failure, retried or not
    pub units_failed: u64,
    pub units_skipped: u64,
    pub retries_scheduled: u64,
}

impl MetricsSnapshot {
    /// Counters accumulated after `earlier` was taken
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_attempts: self.fetch_attempts.saturating_sub(earlier.fetch_attempts),
            units_succeeded: self.units_succeeded.saturating_sub(earlier.units_succeeded),
            units_failed: self.units_failed.saturating_sub(earlier.units_failed),
            units_skipped: self.units_skipped.saturating_sub(earlier.units_skipped),
            retries_scheduled: self
                .retries_scheduled
                .saturating_sub(earlier.retries_scheduled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.fetch_attempted();
        metrics.fetch_attempted();
        metrics.unit_failed();
        metrics.retry_scheduled();
        metrics.unit_succeeded();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_attempts, 2);
        assert_eq!(snapshot.units_failed, 1);
        assert_eq!(snapshot.retries_scheduled, 1);
        assert_eq!(snapshot.units_succeeded, 1);
        assert_eq!(snapshot.units_skipped, 0);
    }

    #[test]
    fn test_since_reports_only_new_counts() {
        let metrics = Metrics::new();
        metrics.fetch_attempted();
        metrics.unit_succeeded();
        let before = metrics.snapshot();

        metrics.fetch_attempted();
        metrics.unit_failed();

        let delta = metrics.snapshot().since(&before);
        assert_eq!(delta.fetch_attempts, 1);
        assert_eq!(delta.units_failed, 1);
        assert_eq!(delta.units_succeeded, 0);
    }
}
