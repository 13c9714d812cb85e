//! Sample Store
//!
//! Append-only, multi-series time store. Each series is an ordered list
//! of `(timestamp, value)` points where timestamps are measured from the
//! buffer's creation and never decrease within a series.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

/// One recorded point of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time since the buffer was created
    #[serde(with = "crate::report::duration_secs")]
    pub timestamp: Duration,
    /// Recorded value
    pub value: f64,
}

/// Summary statistics of one series.
///
/// All fields are zero for an empty or unknown series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl SeriesSummary {
    fn from_samples(samples: &[Sample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for sample in samples {
            min = min.min(sample.value);
            max = max.max(sample.value);
            sum += sample.value;
        }

        // Rounding in the sum can push the mean a hair outside [min, max]
        let mean = (sum / samples.len() as f64).clamp(min, max);

        Self {
            min,
            max,
            mean,
            count: samples.len(),
        }
    }
}

/// Thread-safe multi-series sample store.
///
/// Writers (the sampler) take a short write lock per append; readers
/// (live status, report building) take a read lock and see a consistent
/// view of each series.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use burnin::monitoring::SampleBuffer;
///
/// let buffer = SampleBuffer::new();
/// buffer.append("cpu.load", Duration::from_secs(0), 0.25);
/// buffer.append("cpu.load", Duration::from_secs(5), 0.75);
///
/// let summary = buffer.summary("cpu.load");
/// assert_eq!(summary.count, 2);
/// assert_eq!(summary.mean, 0.5);
/// assert_eq!(buffer.latest("cpu.load"), Some(0.75));
/// assert_eq!(buffer.latest("gpu.load"), None);
/// ```
#[derive(Debug)]
pub struct SampleBuffer {
    origin: Instant,
    series: RwLock<HashMap<String, Vec<Sample>>>,
}

impl SampleBuffer {
    /// Creates an empty buffer whose clock starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Time elapsed since the buffer was created.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Appends a value to a series, creating the series on first use.
    ///
    /// A timestamp earlier than the series' last one is clamped to it.
    /// Non-finite values are dropped.
    pub fn append(&self, series_name: &str, timestamp: Duration, value: f64) {
        if !value.is_finite() {
            debug!("Dropping non-finite value for series '{}'", series_name);
            return;
        }

        let mut series = self.write();
        let points = series.entry(series_name.to_string()).or_default();

        let timestamp = match points.last() {
            Some(last) if last.timestamp > timestamp => last.timestamp,
            _ => timestamp,
        };
        points.push(Sample { timestamp, value });
    }

    /// Summary of a series computed over its current contents.
    pub fn summary(&self, series_name: &str) -> SeriesSummary {
        self.read()
            .get(series_name)
            .map(|points| SeriesSummary::from_samples(points))
            .unwrap_or_default()
    }

    /// Most recently appended value of a series.
    pub fn latest(&self, series_name: &str) -> Option<f64> {
        self.read()
            .get(series_name)
            .and_then(|points| points.last())
            .map(|sample| sample.value)
    }

    /// Number of samples in a series.
    pub fn len(&self, series_name: &str) -> usize {
        self.read().get(series_name).map_or(0, Vec::len)
    }

    /// Returns true if no series has any samples.
    pub fn is_empty(&self) -> bool {
        self.read().values().all(Vec::is_empty)
    }

    /// Names of all series, sorted.
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of one series' points.
    pub fn series(&self, series_name: &str) -> Vec<Sample> {
        self.read().get(series_name).cloned().unwrap_or_default()
    }

    /// Summaries of every series, keyed by name.
    pub fn summaries(&self) -> BTreeMap<String, SeriesSummary> {
        self.read()
            .iter()
            .map(|(name, points)| (name.clone(), SeriesSummary::from_samples(points)))
            .collect()
    }

    /// Copy of every series, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Sample>> {
        self.read()
            .iter()
            .map(|(name, points)| (name.clone(), points.clone()))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Sample>>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Sample>>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
