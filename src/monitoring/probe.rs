//! Resource Probes
//!
//! A probe reads the current value of one or more resource series. Each
//! series can fail on its own (a host without temperature sensors, a
//! missing GPU) without affecting the others.
//!
//! # Series names
//!
//! | Series                          | Unit            | Probe        |
//! |---------------------------------|-----------------|--------------|
//! | `cpu.load`                      | fraction 0..1   | system       |
//! | `cpu.temperature_c`             | °C              | system       |
//! | `memory.used_fraction`          | fraction 0..1   | system       |
//! | `memory.used_bytes`             | bytes           | system       |
//! | `process.cpu_percent`           | % of one core   | system       |
//! | `process.memory_bytes`          | bytes           | system       |
//! | `accelerator.utilization`       | fraction 0..1   | accelerator  |
//! | `accelerator.memory_used_bytes` | bytes           | accelerator  |
//! | `accelerator.memory_fraction`   | fraction 0..1   | accelerator  |
//! | `accelerator.temperature_c`     | °C              | accelerator  |

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sysinfo::{get_current_pid, Components, Pid, ProcessRefreshKind, System};
use thiserror::Error;

/// Well-known series names.
pub mod series {
    pub const CPU_LOAD: &str = "cpu.load";
    pub const CPU_TEMPERATURE: &str = "cpu.temperature_c";
    pub const MEMORY_FRACTION: &str = "memory.used_fraction";
    pub const MEMORY_BYTES: &str = "memory.used_bytes";
    pub const PROCESS_CPU: &str = "process.cpu_percent";
    pub const PROCESS_MEMORY: &str = "process.memory_bytes";
    pub const ACCEL_UTILIZATION: &str = "accelerator.utilization";
    pub const ACCEL_MEMORY_BYTES: &str = "accelerator.memory_used_bytes";
    pub const ACCEL_MEMORY_FRACTION: &str = "accelerator.memory_fraction";
    pub const ACCEL_TEMPERATURE: &str = "accelerator.temperature_c";

    /// Every series the accelerator probe reports.
    pub const ACCELERATOR: &[&str] = &[
        ACCEL_UTILIZATION,
        ACCEL_MEMORY_BYTES,
        ACCEL_MEMORY_FRACTION,
        ACCEL_TEMPERATURE,
    ];
}

/// Errors raised by probes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    /// One series could not be read this tick
    #[error("series '{series}' unavailable: {reason}")]
    Unavailable { series: String, reason: String },

    /// The requested probe cannot be bound on this host (setup time)
    #[error("no {probe} probe available: {reason}")]
    NoBackend { probe: String, reason: String },
}

impl ProbeError {
    /// Shorthand for [`ProbeError::Unavailable`].
    pub fn unavailable(series: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            series: series.to_string(),
            reason: reason.into(),
        }
    }
}

/// Readings of one probe call, keyed by series name.
pub type ProbeReadings = BTreeMap<String, Result<f64, ProbeError>>;

/// A resource usage reading source.
pub trait ResourceProbe: Send {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Reads every series this probe knows about.
    fn sample(&mut self) -> ProbeReadings;
}

/// CPU, memory and temperature readings through `sysinfo`.
pub struct SystemProbe {
    system: System,
    components: Components,
    pid: Option<Pid>,
}

impl SystemProbe {
    /// Creates a probe and performs the CPU warm-up refresh.
    ///
    /// CPU usage is computed between two refreshes, so the first real
    /// sample is only meaningful if a refresh already happened.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let pid = match get_current_pid() {
            Ok(pid) => {
                system.refresh_process_specifics(pid, process_refresh_kind());
                Some(pid)
            }
            Err(e) => {
                warn!("Process metrics disabled: {}", e);
                None
            }
        };

        Self {
            system,
            components: Components::new_with_refreshed_list(),
            pid,
        }
    }

    fn read_cpu(&mut self, readings: &mut ProbeReadings) {
        self.system.refresh_cpu();
        let usage = self.system.global_cpu_info().cpu_usage() as f64;
        readings.insert(series::CPU_LOAD.to_string(), Ok((usage / 100.0).clamp(0.0, 1.0)));
    }

    fn read_memory(&mut self, readings: &mut ProbeReadings) {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();

        readings.insert(series::MEMORY_BYTES.to_string(), Ok(used as f64));
        let fraction = if total == 0 {
            Err(ProbeError::unavailable(series::MEMORY_FRACTION, "total memory reported as 0"))
        } else {
            Ok(used as f64 / total as f64)
        };
        readings.insert(series::MEMORY_FRACTION.to_string(), fraction);
    }

    fn read_process(&mut self, readings: &mut ProbeReadings) {
        let process = match self.pid {
            Some(pid) => {
                self.system.refresh_process_specifics(pid, process_refresh_kind());
                self.system.process(pid)
            }
            None => None,
        };

        match process {
            Some(process) => {
                readings.insert(series::PROCESS_CPU.to_string(), Ok(process.cpu_usage() as f64));
                readings.insert(series::PROCESS_MEMORY.to_string(), Ok(process.memory() as f64));
            }
            None => {
                for name in [series::PROCESS_CPU, series::PROCESS_MEMORY] {
                    readings.insert(
                        name.to_string(),
                        Err(ProbeError::unavailable(name, "current process not found")),
                    );
                }
            }
        }
    }

    fn read_temperature(&mut self, readings: &mut ProbeReadings) {
        self.components.refresh();
        let hottest = self
            .components
            .iter()
            .map(|c| c.temperature() as f64)
            .filter(|t| t.is_finite() && *t > 0.0)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

        let reading = hottest.ok_or_else(|| {
            ProbeError::unavailable(series::CPU_TEMPERATURE, "no temperature sensors exposed")
        });
        readings.insert(series::CPU_TEMPERATURE.to_string(), reading);
    }
}

impl ResourceProbe for SystemProbe {
    fn name(&self) -> &str {
        "system"
    }

    fn sample(&mut self) -> ProbeReadings {
        let mut readings = ProbeReadings::new();
        self.read_cpu(&mut readings);
        self.read_memory(&mut readings);
        self.read_process(&mut readings);
        self.read_temperature(&mut readings);
        readings
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn process_refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new().with_cpu().with_memory()
}

/// Lazily resolved path to `nvidia-smi`.
///
/// Resolution order:
/// 1. `BURNIN_NVIDIA_SMI` environment variable
/// 2. System PATH
pub static NVIDIA_SMI_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| {
    if let Ok(path) = std::env::var("BURNIN_NVIDIA_SMI") {
        if !path.trim().is_empty() {
            info!("Using nvidia-smi from BURNIN_NVIDIA_SMI: {}", path);
            return Some(PathBuf::from(path));
        }
    }

    if let Ok(output) = Command::new("which").arg("nvidia-smi").output() {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                info!("Using system nvidia-smi: {}", path_str);
                return Some(PathBuf::from(path_str));
            }
        }
    }

    debug!("nvidia-smi not found on PATH");
    None
});

/// Fields parsed from one `nvidia-smi` CSV row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuReading {
    /// Utilization in percent
    pub utilization_pct: Option<f64>,
    /// Used memory in MiB
    pub memory_used_mib: Option<f64>,
    /// Total memory in MiB
    pub memory_total_mib: Option<f64>,
    /// Temperature in °C
    pub temperature_c: Option<f64>,
}

/// GPU readings through `nvidia-smi`.
///
/// Any failure to run or parse the query makes every accelerator series
/// unavailable for that tick; individual `[N/A]` fields only affect
/// their own series.
pub struct AcceleratorProbe {
    device: u32,
    binary: Option<PathBuf>,
}

impl AcceleratorProbe {
    /// Creates a probe for GPU `device` using the resolved `nvidia-smi`.
    pub fn new(device: u32) -> Self {
        Self {
            device,
            binary: NVIDIA_SMI_PATH.clone(),
        }
    }

    /// Creates a probe with an explicit `nvidia-smi` path.
    pub fn with_binary(device: u32, binary: impl Into<PathBuf>) -> Self {
        Self {
            device,
            binary: Some(binary.into()),
        }
    }

    /// Returns true if an `nvidia-smi` binary was found.
    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn query(&self) -> Result<GpuReading, String> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| "nvidia-smi not found".to_string())?;

        let output = Command::new(binary)
            .arg("--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu")
            .arg("--format=csv,noheader,nounits")
            .arg(format!("--id={}", self.device))
            .output()
            .map_err(|e| format!("failed to run {}: {}", binary.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "nvidia-smi exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| "nvidia-smi returned no rows".to_string())?;
        parse_query_line(line)
    }
}

impl ResourceProbe for AcceleratorProbe {
    fn name(&self) -> &str {
        "accelerator"
    }

    fn sample(&mut self) -> ProbeReadings {
        let mut readings = ProbeReadings::new();

        let gpu = match self.query() {
            Ok(gpu) => gpu,
            Err(reason) => {
                for name in series::ACCELERATOR {
                    readings.insert(name.to_string(), Err(ProbeError::unavailable(name, reason.clone())));
                }
                return readings;
            }
        };

        let field = |name: &str, value: Option<f64>| {
            value.ok_or_else(|| ProbeError::unavailable(name, "not reported by nvidia-smi"))
        };

        let memory_fraction = match (gpu.memory_used_mib, gpu.memory_total_mib) {
            (Some(used), Some(total)) if total > 0.0 => Some(used / total),
            _ => None,
        };

        readings.insert(
            series::ACCEL_UTILIZATION.to_string(),
            field(series::ACCEL_UTILIZATION, gpu.utilization_pct.map(|p| p / 100.0)),
        );
        readings.insert(
            series::ACCEL_MEMORY_BYTES.to_string(),
            field(series::ACCEL_MEMORY_BYTES, gpu.memory_used_mib.map(|m| m * 1024.0 * 1024.0)),
        );
        readings.insert(
            series::ACCEL_MEMORY_FRACTION.to_string(),
            field(series::ACCEL_MEMORY_FRACTION, memory_fraction),
        );
        readings.insert(
            series::ACCEL_TEMPERATURE.to_string(),
            field(series::ACCEL_TEMPERATURE, gpu.temperature_c),
        );

        readings
    }
}

/// Parses `utilization, memory.used, memory.total, temperature`.
///
/// Non-numeric fields such as `[N/A]` become `None`.
pub fn parse_query_line(line: &str) -> Result<GpuReading, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, got {}: '{}'", fields.len(), line.trim()));
    }

    let number = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite());

    Ok(GpuReading {
        utilization_pct: number(fields[0]),
        memory_used_mib: number(fields[1]),
        memory_total_mib: number(fields[2]),
        temperature_c: number(fields[3]),
    })
}

/// Merges the readings of several probes.
pub struct CompositeProbe {
    name: String,
    probes: Vec<Box<dyn ResourceProbe>>,
}

impl CompositeProbe {
    /// Combines `probes`; later probes win on duplicate series names.
    pub fn new(probes: Vec<Box<dyn ResourceProbe>>) -> Self {
        let name = probes
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, probes }
    }

    /// Number of wrapped probes.
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Returns true if no probes are wrapped.
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl ResourceProbe for CompositeProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> ProbeReadings {
        let mut readings = ProbeReadings::new();
        for probe in &mut self.probes {
            readings.extend(probe.sample());
        }
        readings
    }
}

/// Probe selection made at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// CPU, memory and temperature
    System,
    /// GPU only
    #[serde(alias = "gpu")]
    Accelerator,
    /// System plus GPU when one is available
    All,
}

impl ProbeKind {
    /// Binds the selected probe.
    ///
    /// `Accelerator` fails when no `nvidia-smi` is found; `All` falls back
    /// to the system probe alone with a warning.
    pub fn build(&self, device: u32) -> Result<Box<dyn ResourceProbe>, ProbeError> {
        match self {
            Self::System => Ok(Box::new(SystemProbe::new())),
            Self::Accelerator => {
                let probe = AcceleratorProbe::new(device);
                if !probe.is_available() {
                    return Err(ProbeError::NoBackend {
                        probe: "accelerator".to_string(),
                        reason: "nvidia-smi not found (set BURNIN_NVIDIA_SMI to override)"
                            .to_string(),
                    });
                }
                Ok(Box::new(probe))
            }
            Self::All => {
                let accelerator = AcceleratorProbe::new(device);
                let mut probes: Vec<Box<dyn ResourceProbe>> = vec![Box::new(SystemProbe::new())];
                if accelerator.is_available() {
                    probes.push(Box::new(accelerator));
                } else {
                    warn!("No accelerator probe available - sampling system resources only");
                }
                Ok(Box::new(CompositeProbe::new(probes)))
            }
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Accelerator => write!(f, "accelerator"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" | "cpu" => Ok(Self::System),
            "accelerator" | "gpu" => Ok(Self::Accelerator),
            "all" => Ok(Self::All),
            other => Err(ProbeError::NoBackend {
                probe: other.to_string(),
                reason: "expected 'system', 'accelerator' or 'all'".to_string(),
            }),
        }
    }
}
