//! Workload Lanes
//!
//! Drives a [`Workload`] on several concurrent threads ("lanes") until
//! the shared [`CancellationToken`] is cancelled. Lanes run as fast as
//! the workload allows; there is no rate limiting. Cancellation is
//! cooperative, so a lane always finishes its in-flight step before it
//! notices the token.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};
use thiserror::Error;

use super::counters::{Counters, CountersSnapshot};
use super::token::CancellationToken;
use super::workload::{Workload, WorkloadOutcome};

/// Callback invoked with fresh counters every `status_every` completions.
pub type ProgressFn = Arc<dyn Fn(&CountersSnapshot) + Send + Sync + 'static>;

/// Errors raised while starting lanes.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// At least one lane is required
    #[error("lane count must be at least 1")]
    NoLanes,

    /// The OS refused to create a lane thread
    #[error("failed to spawn lane {lane}: {source}")]
    Spawn {
        lane: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Runs a workload on `lanes` concurrent threads.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use burnin::execution::{MatMulWorkload, WorkloadRunner};
/// use burnin::CancellationToken;
///
/// let token = CancellationToken::new();
/// let workload = Arc::new(MatMulWorkload::new(256).unwrap());
///
/// let handle = WorkloadRunner::new(4).spawn(workload, &token).unwrap();
/// // ... later, from any thread:
/// token.cancel(burnin::CancelReason::Interrupt);
/// let counters = handle.join();
/// println!("{} iterations", counters.iterations_completed);
/// ```
pub struct WorkloadRunner {
    lanes: usize,
    yield_between_steps: bool,
    progress: Option<(u64, ProgressFn)>,
    counters: Arc<Counters>,
}

impl WorkloadRunner {
    /// Creates a runner with `lanes` concurrent lanes.
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes,
            yield_between_steps: true,
            progress: None,
            counters: Arc::new(Counters::new()),
        }
    }

    /// Enables or disables the cooperative yield after each step.
    pub fn with_yield(mut self, yield_between_steps: bool) -> Self {
        self.yield_between_steps = yield_between_steps;
        self
    }

    /// Registers a progress callback fired every `every` completed
    /// iterations. `every == 0` disables it.
    pub fn with_progress(mut self, every: u64, callback: ProgressFn) -> Self {
        self.progress = (every > 0).then_some((every, callback));
        self
    }

    /// Returns the shared counters the lanes record into.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Runs the lanes to completion on the calling thread's behalf.
    ///
    /// Blocks until the token is cancelled and every lane has exited.
    pub fn run(
        self,
        workload: Arc<dyn Workload>,
        token: &CancellationToken,
    ) -> Result<CountersSnapshot, RunnerError> {
        Ok(self.spawn(workload, token)?.join())
    }

    /// Starts the lanes and returns immediately.
    ///
    /// If any lane fails to spawn, the lanes already started are stopped
    /// and joined before the error is returned; the token is left alone.
    pub fn spawn(
        self,
        workload: Arc<dyn Workload>,
        token: &CancellationToken,
    ) -> Result<RunnerHandle, RunnerError> {
        if self.lanes == 0 {
            return Err(RunnerError::NoLanes);
        }

        let started = Instant::now();
        let abort = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(self.lanes);

        for lane in 0..self.lanes {
            let ctx = LaneContext {
                lane,
                workload: Arc::clone(&workload),
                token: token.clone(),
                abort: Arc::clone(&abort),
                counters: Arc::clone(&self.counters),
                progress: self.progress.clone(),
                yield_between_steps: self.yield_between_steps,
                started,
            };

            let spawned = thread::Builder::new()
                .name(format!("burnin-lane-{}", lane))
                .spawn(move || ctx.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    abort.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(RunnerError::Spawn { lane, source });
                }
            }
        }

        info!(
            "Started {} lane(s) running workload '{}'",
            self.lanes,
            workload.name()
        );

        Ok(RunnerHandle {
            handles,
            counters: self.counters,
        })
    }
}

/// Handle to running lanes.
pub struct RunnerHandle {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl RunnerHandle {
    /// Returns the shared counters.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Number of lanes started.
    pub fn lanes(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every lane to exit and returns the final counters.
    pub fn join(self) -> CountersSnapshot {
        for handle in self.handles {
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                warn!("Lane {:?} terminated abnormally", name);
            }
        }
        self.counters.snapshot()
    }
}

/// Everything one lane thread owns.
struct LaneContext {
    lane: usize,
    workload: Arc<dyn Workload>,
    token: CancellationToken,
    abort: Arc<AtomicBool>,
    counters: Arc<Counters>,
    progress: Option<(u64, ProgressFn)>,
    yield_between_steps: bool,
    started: Instant,
}

impl LaneContext {
    fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.abort.load(Ordering::Acquire)
    }

    fn run(self) {
        debug!("Lane {} started", self.lane);
        let mut failures = 0u64;

        while !self.should_stop() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.workload.step()));

            let outcome = match result {
                Ok(Ok(metric)) => WorkloadOutcome::succeeded(self.started.elapsed(), metric),
                Ok(Err(e)) => {
                    failures += 1;
                    self.log_failure(failures, &e.to_string());
                    WorkloadOutcome::failed(self.started.elapsed())
                }
                Err(payload) => {
                    failures += 1;
                    self.log_failure(failures, &panic_message(payload.as_ref()));
                    WorkloadOutcome::failed(self.started.elapsed())
                }
            };

            let snapshot = self.counters.record(&outcome);

            if let Some((every, callback)) = &self.progress {
                if outcome.ok && snapshot.iterations_completed % every == 0 {
                    callback(&snapshot);
                }
            }

            if self.yield_between_steps {
                thread::yield_now();
            }
        }

        debug!("Lane {} stopped ({} failed steps)", self.lane, failures);
    }

    // First failure per lane is a warning; repeats would flood the log.
    fn log_failure(&self, failures: u64, message: &str) {
        if failures == 1 {
            warn!("Lane {} step failed: {}", self.lane, message);
        } else {
            debug!("Lane {} step failed ({} so far): {}", self.lane, failures, message);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
