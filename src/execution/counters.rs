//! Workload Counters
//!
//! Aggregates per-iteration outcomes from every lane. All updates go
//! through one mutex so concurrent lanes can never lose an increment,
//! and a snapshot always reflects a whole number of recorded outcomes.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::workload::WorkloadOutcome;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// Iterations that finished successfully
    pub iterations_completed: u64,
    /// Iterations that returned an error or panicked
    pub iterations_failed: u64,
    /// Sum of every metric reported by successful iterations
    pub cumulative_metric_sum: f64,
    /// Number of successful iterations that reported a metric
    pub metrics_recorded: u64,
    /// Metric of the most recent successful iteration that reported one
    pub last_metric: Option<f64>,
}

impl CountersSnapshot {
    /// Total iterations attempted.
    pub fn total_iterations(&self) -> u64 {
        self.iterations_completed + self.iterations_failed
    }

    /// Mean of the recorded metrics, if any were reported.
    pub fn mean_metric(&self) -> Option<f64> {
        if self.metrics_recorded == 0 {
            return None;
        }
        Some(self.cumulative_metric_sum / self.metrics_recorded as f64)
    }
}

/// Thread-safe outcome aggregate shared by all lanes.
#[derive(Debug, Default)]
pub struct Counters {
    state: Mutex<CountersSnapshot>,
}

impl Counters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one iteration outcome and returns the counters right after it.
    pub fn record(&self, outcome: &WorkloadOutcome) -> CountersSnapshot {
        let mut state = self.lock();

        if outcome.ok {
            state.iterations_completed += 1;
            if let Some(metric) = outcome.metric {
                state.cumulative_metric_sum += metric;
                state.metrics_recorded += 1;
                state.last_metric = Some(metric);
            }
        } else {
            state.iterations_failed += 1;
        }

        *state
    }

    /// Returns a consistent copy of the counters.
    pub fn snapshot(&self) -> CountersSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, CountersSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
