//! Run Configuration
//!
//! Settings are layered: built-in defaults, then an optional YAML file,
//! then command-line overrides applied through [`RunConfig::set`].
//!
//! ```yaml
//! duration: 30m
//! lanes: 8
//! sample_interval: 2s
//! probe: all
//! workload: training
//! output_dir: results
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::harness::HarnessOptions;
use crate::execution::workload::WorkloadKind;
use crate::monitoring::probe::ProbeKind;
use crate::monitoring::sampler::DEFAULT_SAMPLE_INTERVAL;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid duration '{0}' (use e.g. 500ms, 30s, 10m, 2h or plain seconds)")]
    InvalidDuration(String),

    #[error("unknown probe '{0}' (expected 'system', 'accelerator' or 'all')")]
    UnknownProbe(String),

    #[error("unknown workload '{0}' (expected 'matmul' or 'training')")]
    UnknownWorkload(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Wall-clock budget for the run
    #[serde(with = "duration_text")]
    pub duration: Duration,
    /// Concurrent workload lanes
    pub lanes: usize,
    /// Resource sampling cadence
    #[serde(with = "duration_text")]
    pub sample_interval: Duration,
    /// Status line every N successful iterations (0 disables)
    pub status_every: u64,
    pub probe: ProbeKind,
    pub workload: WorkloadKind,
    /// Edge length of the square matrices for the matmul workload
    pub matrix_size: usize,
    /// GPU index queried by the accelerator probe
    pub accelerator_device: u32,
    /// Where report files are written
    pub output_dir: PathBuf,
    /// Also write the ASCII resource chart
    pub chart: bool,
    pub yield_between_steps: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        let harness = HarnessOptions::default();
        Self {
            duration: harness.duration,
            lanes: harness.lanes,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            status_every: harness.status_every,
            probe: ProbeKind::All,
            workload: WorkloadKind::MatMul,
            matrix_size: 2048,
            accelerator_device: 0,
            output_dir: PathBuf::from("burnin-output"),
            chart: true,
            yield_between_steps: harness.yield_between_steps,
        }
    }
}

impl RunConfig {
    /// Overrides one setting from its textual form.
    ///
    /// Keys use the CLI spelling (`sample-interval`); underscores are
    /// accepted too.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key.replace('_', "-").as_str() {
            "duration" => self.duration = parse_duration(value)?,
            "lanes" => self.lanes = parse_number(key, value)?,
            "sample-interval" => self.sample_interval = parse_duration(value)?,
            "status-every" => self.status_every = parse_number(key, value)?,
            "probe" => {
                self.probe = value
                    .parse()
                    .map_err(|_| ConfigError::UnknownProbe(value.to_string()))?
            }
            "workload" => {
                self.workload = value
                    .parse()
                    .map_err(|_| ConfigError::UnknownWorkload(value.to_string()))?
            }
            "matrix-size" => self.matrix_size = parse_number(key, value)?,
            "accelerator-device" | "device" => self.accelerator_device = parse_number(key, value)?,
            "output-dir" => self.output_dir = PathBuf::from(value),
            other => {
                return Err(ConfigError::Invalid(format!("unknown setting '{}'", other)));
            }
        }
        Ok(())
    }

    /// Checks the values a run cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::Invalid("lanes must be at least 1".to_string()));
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sample_interval must be greater than zero".to_string(),
            ));
        }
        if self.matrix_size == 0 {
            return Err(ConfigError::Invalid(
                "matrix_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Harness knobs derived from this configuration.
    pub fn to_harness_options(&self) -> HarnessOptions {
        HarnessOptions {
            duration: self.duration,
            lanes: self.lanes,
            sample_interval: self.sample_interval,
            status_every: self.status_every,
            yield_between_steps: self.yield_between_steps,
        }
    }
}

/// Loads a configuration file on top of the defaults.
///
/// Missing keys keep their default; unknown keys are rejected.
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Config content loaded ({} bytes)", content.len());

    if content.trim().is_empty() {
        return Ok(RunConfig::default());
    }

    let config: RunConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Parses `500ms`, `30s`, `10m`, `2h` or a bare number of seconds.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(text.to_string());
    let trimmed = text.trim();

    let (number, unit_ms) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = trimmed.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (trimmed, 1_000)
    };
    let number = number.trim();

    // Whole numbers stay exact; fractions go through f64
    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(unit_ms)
            .map(Duration::from_millis)
            .ok_or_else(invalid);
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    Duration::try_from_secs_f64(value * unit_ms as f64 / 1000.0).map_err(|_| invalid())
}

/// Formats a duration in the shortest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if duration.subsec_nanos() != 0 {
        format!("{}ms", duration.as_millis())
    } else if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} expects a non-negative integer, got '{}'", key, value)))
}

/// Durations in YAML: either text (`30s`) or a number of seconds.
mod duration_text {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => super::parse_duration(&text).map_err(D::Error::custom),
            Raw::Seconds(secs) => {
                Duration::try_from_secs_f64(secs).map_err(|e| D::Error::custom(format!("{}: {}", e, secs)))
            }
        }
    }
}
