//! Sliding outcome window for circuit breaker metrics
//!
//! The window keeps the last N call outcomes in a fixed-capacity ring with
//! FIFO eviction and computes failure/slow-call rates on demand. It is
//! exclusively owned by one breaker; `record` and `metrics` are serialized
//! behind that breaker's mutation lock.

use crate::{Outcome, OutcomeKind};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Rate used when the window holds fewer than the minimum number of calls
pub const RATE_UNDEFINED: f64 = -1.0;

/// Metrics derived from one pass over the window contents
///
/// Rates are percentages in 0-100, or [`RATE_UNDEFINED`] while the window
/// holds fewer than the minimum number of calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowMetrics {
    pub total_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    pub failure_rate: f64,
    pub slow_call_rate: f64,
}

/// Bounded FIFO history of the most recent call outcomes
#[derive(Debug)]
pub struct OutcomeWindow {
    /// Ring of at most `capacity` outcomes, oldest first
    outcomes: Mutex<VecDeque<Outcome>>,
    /// Maximum outcomes retained (the configured sliding window size)
    capacity: usize,
    /// Monotonic time anchor (prevents clock skew issues from NTP)
    start_time: Instant,
}

impl OutcomeWindow {
    /// Create a window retaining the last `capacity` outcomes
    pub fn new(capacity: usize) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            start_time: Instant::now(),
        }
    }

    /// Append an outcome, evicting the oldest if at capacity
    pub fn record(&self, kind: OutcomeKind, duration: f64) {
        let mut outcomes = self.outcomes.lock().unwrap();

        if outcomes.len() == self.capacity {
            outcomes.pop_front();
        }

        outcomes.push_back(Outcome {
            kind,
            duration,
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });
    }

    /// Compute counts and rates over the current contents
    ///
    /// Rates are reported as [`RATE_UNDEFINED`] until `min_calls` outcomes
    /// have been recorded, so a thin sample never trips a threshold.
    pub fn metrics(&self, min_calls: usize) -> WindowMetrics {
        let outcomes = self.outcomes.lock().unwrap();

        let total = outcomes.len();
        let failed = outcomes.iter().filter(|o| o.kind.is_failure()).count();
        let slow = outcomes.iter().filter(|o| o.kind.is_slow()).count();

        let (failure_rate, slow_call_rate) = if total >= min_calls && total > 0 {
            (
                100.0 * failed as f64 / total as f64,
                100.0 * slow as f64 / total as f64,
            )
        } else {
            (RATE_UNDEFINED, RATE_UNDEFINED)
        };

        WindowMetrics {
            total_calls: total,
            failed_calls: failed,
            slow_calls: slow,
            failure_rate,
            slow_call_rate,
        }
    }

    /// Number of outcomes currently held
    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    /// Whether the window holds no outcomes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all outcomes (a fresh trial batch must not see old history)
    pub fn clear(&self) {
        self.outcomes.lock().unwrap().clear();
    }

    /// Get monotonic time in seconds (relative to window creation)
    pub fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let window = OutcomeWindow::new(10);

        window.record(OutcomeKind::Success, 0.1);
        window.record(OutcomeKind::Success, 0.2);
        window.record(OutcomeKind::Failure, 0.5);

        let metrics = window.metrics(1);
        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.slow_calls, 0);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let window = OutcomeWindow::new(3);

        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Success, 0.1);
        window.record(OutcomeKind::Success, 0.1);
        assert_eq!(window.len(), 3);

        // Fourth record evicts the oldest (the failure)
        window.record(OutcomeKind::Success, 0.1);
        assert_eq!(window.len(), 3);

        let metrics = window.metrics(1);
        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.failed_calls, 0);
    }

    #[test]
    fn test_rates_undefined_below_minimum() {
        let window = OutcomeWindow::new(10);

        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Failure, 0.1);

        let metrics = window.metrics(5);
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.failed_calls, 2);
        assert_eq!(metrics.failure_rate, RATE_UNDEFINED);
        assert_eq!(metrics.slow_call_rate, RATE_UNDEFINED);
    }

    #[test]
    fn test_failure_rate_at_minimum() {
        let window = OutcomeWindow::new(10);

        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Success, 0.1);
        window.record(OutcomeKind::Success, 0.1);

        let metrics = window.metrics(5);
        assert_eq!(metrics.failure_rate, 60.0);
        assert_eq!(metrics.slow_call_rate, 0.0);
    }

    #[test]
    fn test_slow_failure_counts_in_both_rates() {
        let window = OutcomeWindow::new(10);

        window.record(OutcomeKind::SlowFailure, 3.0);
        window.record(OutcomeKind::Success, 0.1);

        let metrics = window.metrics(2);
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.slow_calls, 1);
        assert_eq!(metrics.failure_rate, 50.0);
        assert_eq!(metrics.slow_call_rate, 50.0);
    }

    #[test]
    fn test_clear_empties_window() {
        let window = OutcomeWindow::new(10);

        window.record(OutcomeKind::Success, 0.1);
        window.record(OutcomeKind::Failure, 0.1);
        assert_eq!(window.len(), 2);

        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.metrics(1).total_calls, 0);
    }

    #[test]
    fn test_capacity_one_window() {
        let window = OutcomeWindow::new(1);

        window.record(OutcomeKind::Failure, 0.1);
        window.record(OutcomeKind::Success, 0.1);

        let metrics = window.metrics(1);
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.failure_rate, 0.0);
    }

    #[test]
    fn test_monotonic_time_advances() {
        let window = OutcomeWindow::new(10);

        let time1 = window.monotonic_time();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let time2 = window.monotonic_time();

        assert!(time2 > time1);
    }
}
