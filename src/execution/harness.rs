//! Run Orchestration
//!
//! The harness owns one run: it starts the resource sampler and the
//! workload lanes against a shared cancellation token, stops them at the
//! deadline (or on interrupt), builds the [`Report`] and hands it to a
//! [`Renderer`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::counters::CountersSnapshot;
use super::runner::{ProgressFn, RunnerError, WorkloadRunner};
use super::token::{CancelReason, CancellationToken};
use super::workload::{Workload, WorkloadError};
use crate::config::ConfigError;
use crate::monitoring::buffer::SampleBuffer;
use crate::monitoring::probe::{ProbeError, ResourceProbe};
use crate::monitoring::sampler::{ResourceSampler, SamplerError, DEFAULT_SAMPLE_INTERVAL};
use crate::report::model::{Report, RunSettings};
use crate::report::render::Renderer;
use crate::report::status::format_status;

/// Errors that stop a run before it starts.
///
/// Everything that goes wrong once the run is underway (failed steps,
/// unavailable probes, renderer errors) is logged and counted instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("workload setup failed: {0}")]
    Workload(#[from] WorkloadError),

    #[error("probe setup failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("could not start workload lanes: {0}")]
    Runner(#[from] RunnerError),

    #[error("could not start sampler: {0}")]
    Sampler(#[from] SamplerError),
}

/// Knobs for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessOptions {
    /// Wall-clock budget; zero stops immediately
    pub duration: Duration,
    /// Concurrent workload lanes
    pub lanes: usize,
    /// Resource sampling cadence
    pub sample_interval: Duration,
    /// Log a status line every N successful iterations (0 disables)
    pub status_every: u64,
    /// Yield the thread between workload steps
    pub yield_between_steps: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(2 * 60 * 60),
            lanes: 4,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            status_every: 100,
            yield_between_steps: true,
        }
    }
}

/// Benchmark harness for a single run.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use burnin::execution::{Harness, HarnessOptions, MatMulWorkload};
/// use burnin::monitoring::SystemProbe;
/// use burnin::report::ConsoleRenderer;
/// use std::sync::Arc;
///
/// let options = HarnessOptions {
///     duration: Duration::from_secs(30),
///     lanes: 2,
///     ..HarnessOptions::default()
/// };
///
/// let harness = Harness::new(options);
/// let stop = harness.interrupt_handle();
///
/// let report = harness
///     .run(
///         Arc::new(MatMulWorkload::new(256).unwrap()),
///         Box::new(SystemProbe::new()),
///         &ConsoleRenderer,
///     )
///     .unwrap();
/// # let _ = (stop, report);
/// ```
pub struct Harness {
    options: HarnessOptions,
    token: CancellationToken,
}

impl Harness {
    /// Creates a harness with a fresh cancellation token.
    pub fn new(options: HarnessOptions) -> Self {
        Self {
            options,
            token: CancellationToken::new(),
        }
    }

    /// Options this harness runs with.
    pub fn options(&self) -> &HarnessOptions {
        &self.options
    }

    /// Returns a handle that stops the run early.
    ///
    /// Cancel it with [`CancelReason::Interrupt`]; the run still produces
    /// a (partial) report.
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs to completion and returns the report.
    ///
    /// Only setup problems are returned as errors. Renderer failures are
    /// logged and the report is returned anyway.
    pub fn run(
        self,
        workload: Arc<dyn Workload>,
        probe: Box<dyn ResourceProbe>,
        renderer: &dyn Renderer,
    ) -> Result<Report, HarnessError> {
        self.validate()?;

        let options = &self.options;
        let token = &self.token;
        let settings = RunSettings {
            workload: workload.name().to_string(),
            probe: probe.name().to_string(),
            lanes: options.lanes,
            sample_interval: options.sample_interval,
            requested_duration: options.duration,
        };

        info!(
            "Starting burn-in: workload '{}', {} lane(s), probe '{}', duration {:?}",
            settings.workload, settings.lanes, settings.probe, settings.requested_duration
        );

        let start = Instant::now();
        let buffer = Arc::new(SampleBuffer::new());

        if options.duration.is_zero() && token.cancel(CancelReason::Deadline) {
            info!("Duration is zero - stopping immediately");
        }

        // Lanes
        let status_buffer = Arc::clone(&buffer);
        let progress: ProgressFn = Arc::new(move |snapshot: &CountersSnapshot| {
            info!("{}", format_status(start.elapsed(), snapshot, &status_buffer));
        });
        let lanes = WorkloadRunner::new(options.lanes)
            .with_yield(options.yield_between_steps)
            .with_progress(options.status_every, progress)
            .spawn(workload, token)?;

        // Sampler
        let sampler = ResourceSampler::new(probe);
        let sampler_buffer = Arc::clone(&buffer);
        let sampler_token = token.clone();
        let interval = options.sample_interval;
        let sampler_handle = match thread::Builder::new()
            .name("burnin-sampler".to_string())
            .spawn(move || sampler.run(&sampler_buffer, &sampler_token, interval))
        {
            Ok(handle) => handle,
            Err(e) => {
                token.cancel(CancelReason::Aborted);
                lanes.join();
                return Err(HarnessError::SetupFailed(format!(
                    "failed to spawn sampler thread: {}",
                    e
                )));
            }
        };

        // Deadline watcher
        let deadline_token = token.clone();
        let duration = options.duration;
        let watcher_handle = match thread::Builder::new()
            .name("burnin-deadline".to_string())
            .spawn(move || {
                if !deadline_token.wait_timeout(duration)
                    && deadline_token.cancel(CancelReason::Deadline)
                {
                    info!("Deadline of {:?} reached - stopping", duration);
                }
            }) {
            Ok(handle) => handle,
            Err(e) => {
                token.cancel(CancelReason::Aborted);
                lanes.join();
                let _ = sampler_handle.join();
                return Err(HarnessError::SetupFailed(format!(
                    "failed to spawn deadline watcher: {}",
                    e
                )));
            }
        };

        let counters = lanes.join();

        match sampler_handle.join() {
            Ok(Ok(ticks)) => debug!("Sampler finished after {} ticks", ticks),
            Ok(Err(e)) => warn!("Sampler did not run: {}", e),
            Err(_) => warn!("Sampler thread terminated abnormally"),
        }
        if watcher_handle.join().is_err() {
            warn!("Deadline watcher terminated abnormally");
        }

        let elapsed = start.elapsed();
        let reason = token.reason();
        info!(
            "Burn-in finished after {:.2?} ({}): {} iterations, {} failed",
            elapsed,
            reason.map_or_else(|| "stopped".to_string(), |r| r.to_string()),
            counters.iterations_completed,
            counters.iterations_failed
        );

        let report = Report::build(elapsed, &buffer, counters, settings, reason);

        if let Err(e) = renderer.render(&report) {
            error!("Renderer '{}' failed: {}", renderer.name(), e);
        }

        Ok(report)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.options.lanes == 0 {
            return Err(HarnessError::SetupFailed(
                "lanes must be at least 1".to_string(),
            ));
        }
        if self.options.sample_interval.is_zero() {
            return Err(HarnessError::SetupFailed(
                "sample interval must be greater than zero".to_string(),
            ));
        }

        let cpus = num_cpus::get();
        if self.options.lanes > cpus {
            warn!(
                "{} lanes requested but only {} logical CPUs available - lanes will contend",
                self.options.lanes, cpus
            );
        }

        Ok(())
    }
}
