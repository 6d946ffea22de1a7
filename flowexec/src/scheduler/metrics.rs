//! Counters describing a scheduler's load.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Submission and completion counters of one scheduler.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    last_rejection: RwLock<Option<Instant>>,
}

impl SchedulerMetrics {
    /// Records an accepted task.
    pub fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refused task.
    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        *self.last_rejection.write() = Some(Instant::now());
    }

    /// Records a finished (or discarded) task.
    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task that panicked.
    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of accepted tasks.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Returns the number of refused submissions.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Returns the number of finished tasks, panics included.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Returns the number of tasks that panicked.
    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Returns accepted tasks that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.submitted().saturating_sub(self.completed())
    }

    /// Returns the time since the last rejection.
    #[must_use]
    pub fn since_last_rejection(&self) -> Option<std::time::Duration> {
        self.last_rejection.read().map(|at| at.elapsed())
    }

    /// Returns the rejection rate as a percentage of all submission attempts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        let submitted = self.submitted();
        let rejected = self.rejected();
        let total = submitted + rejected;
        if total == 0 {
            0.0
        } else {
            (rejected as f64 / total as f64) * 100.0
        }
    }

    /// Converts the counters to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "submitted": self.submitted(),
            "rejected": self.rejected(),
            "completed": self.completed(),
            "panicked": self.panicked(),
            "in_flight": self.in_flight(),
            "rejection_rate_percent": (self.rejection_rate() * 100.0).round() / 100.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = SchedulerMetrics::default();
        metrics.record_submit();
        metrics.record_submit();
        metrics.record_submit();
        metrics.record_rejection();
        metrics.record_completion();

        assert_eq!(metrics.submitted(), 3);
        assert_eq!(metrics.rejected(), 1);
        assert_eq!(metrics.in_flight(), 2);
        assert!((metrics.rejection_rate() - 25.0).abs() < f64::EPSILON);
        assert!(metrics.since_last_rejection().is_some());
    }

    #[test]
    fn test_to_json() {
        let metrics = SchedulerMetrics::default();
        metrics.record_submit();
        metrics.record_completion();
        metrics.record_panic();

        let json = metrics.to_json();
        assert_eq!(json["submitted"], 1);
        assert_eq!(json["completed"], 1);
        assert_eq!(json["panicked"], 1);
        assert_eq!(json["in_flight"], 0);
        assert_eq!(json["rejection_rate_percent"], 0.0);
    }
}
