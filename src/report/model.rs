//! Final Run Report
//!
//! Immutable summary of one run, built at shutdown from the sample
//! buffer and the final workload counters.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duration_secs;
use crate::execution::counters::CountersSnapshot;
use crate::execution::token::CancelReason;
use crate::monitoring::buffer::{Sample, SampleBuffer, SeriesSummary};

/// The settings a run was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Workload name
    pub workload: String,
    /// Probe name
    pub probe: String,
    /// Number of concurrent lanes
    pub lanes: usize,
    /// Interval between resource samples
    #[serde(with = "duration_secs")]
    pub sample_interval: Duration,
    /// Wall-clock budget requested for the run
    #[serde(with = "duration_secs")]
    pub requested_duration: Duration,
}

/// Summary of a finished (or interrupted) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Wall-clock time from start until every thread stopped
    #[serde(with = "duration_secs")]
    pub duration_elapsed: Duration,
    /// Per-series statistics
    pub series: BTreeMap<String, SeriesSummary>,
    /// Raw time series, used for charts
    pub timeline: BTreeMap<String, Vec<Sample>>,
    /// Final workload counters
    pub counters: CountersSnapshot,
    /// When the report was built
    pub generated_at: DateTime<Utc>,
    /// What ended the run
    pub stop_reason: Option<CancelReason>,
    /// How the run was configured
    pub settings: RunSettings,
}

impl Report {
    /// Builds a report from the run's shared state.
    pub fn build(
        duration_elapsed: Duration,
        buffer: &SampleBuffer,
        counters: CountersSnapshot,
        settings: RunSettings,
        stop_reason: Option<CancelReason>,
    ) -> Self {
        Self {
            duration_elapsed,
            series: buffer.summaries(),
            timeline: buffer.snapshot(),
            counters,
            generated_at: Utc::now(),
            stop_reason,
            settings,
        }
    }

    /// Successful iterations per second of elapsed time.
    pub fn iterations_per_second(&self) -> f64 {
        let secs = self.duration_elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.counters.iterations_completed as f64 / secs
    }

    /// Mean of the workload metrics, if any step reported one.
    pub fn mean_metric(&self) -> Option<f64> {
        self.counters.mean_metric()
    }

    /// Summary of one series; zeroed if it was never sampled.
    pub fn summary(&self, series_name: &str) -> SeriesSummary {
        self.series.get(series_name).copied().unwrap_or_default()
    }

    /// True if the run stopped before its deadline.
    pub fn is_partial(&self) -> bool {
        self.stop_reason != Some(CancelReason::Deadline)
    }
}
