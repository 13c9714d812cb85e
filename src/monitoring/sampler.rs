//! Background Resource Sampling
//!
//! Reads a [`ResourceProbe`] at a fixed interval and appends every
//! available reading to a [`SampleBuffer`] until the run's
//! [`CancellationToken`] is cancelled. The interval wait wakes up on
//! cancellation, so stopping costs at most one probe call.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use super::buffer::SampleBuffer;
use super::probe::ResourceProbe;
use crate::execution::token::CancellationToken;

/// Default interval between two samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of a sampler. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Created, not yet started
    Idle,
    /// Inside `run`
    Sampling,
    /// `run` returned; a new sampler is needed to sample again
    Stopped,
}

/// Errors raised when starting a sampler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    /// `run` called on a sampler that already started
    #[error("sampler cannot start from state {0:?}")]
    AlreadyStarted(SamplerState),

    /// Zero interval would spin
    #[error("sample interval must be greater than zero")]
    ZeroInterval,
}

/// Periodic probe reader.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// use burnin::monitoring::{ResourceSampler, SampleBuffer, SystemProbe};
/// use burnin::{CancelReason, CancellationToken};
///
/// let buffer = Arc::new(SampleBuffer::new());
/// let token = CancellationToken::new();
/// let sampler = ResourceSampler::new(Box::new(SystemProbe::new()));
///
/// let (b, t) = (Arc::clone(&buffer), token.clone());
/// let handle = thread::spawn(move || sampler.run(&b, &t, Duration::from_millis(500)));
///
/// thread::sleep(Duration::from_secs(2));
/// token.cancel(CancelReason::Interrupt);
/// let ticks = handle.join().unwrap().unwrap();
/// println!("{} ticks, {:?}", ticks, buffer.summary("cpu.load"));
/// ```
pub struct ResourceSampler {
    probe: Mutex<Box<dyn ResourceProbe>>,
    state: Mutex<SamplerState>,
}

impl ResourceSampler {
    /// Creates an idle sampler around `probe`.
    pub fn new(probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            probe: Mutex::new(probe),
            state: Mutex::new(SamplerState::Idle),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SamplerState {
        *self.lock_state()
    }

    /// Samples until `token` is cancelled.
    ///
    /// Returns the number of ticks performed. Probe failures and panics
    /// are logged and skipped; they never end the loop.
    pub fn run(
        &self,
        buffer: &SampleBuffer,
        token: &CancellationToken,
        interval: Duration,
    ) -> Result<u64, SamplerError> {
        if interval.is_zero() {
            return Err(SamplerError::ZeroInterval);
        }

        {
            let mut state = self.lock_state();
            if *state != SamplerState::Idle {
                return Err(SamplerError::AlreadyStarted(*state));
            }
            *state = SamplerState::Sampling;
        }

        let mut probe = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Sampling '{}' probe every {:.2?}",
            probe.name(),
            interval
        );

        let mut ticks = 0u64;
        let mut warned: HashSet<String> = HashSet::new();

        while !token.is_cancelled() {
            self.tick(&mut **probe, buffer, &mut warned);
            ticks += 1;

            if token.wait_timeout(interval) {
                break;
            }
        }

        *self.lock_state() = SamplerState::Stopped;
        debug!("Sampler stopped after {} ticks", ticks);
        Ok(ticks)
    }

    fn tick(
        &self,
        probe: &mut dyn ResourceProbe,
        buffer: &SampleBuffer,
        warned: &mut HashSet<String>,
    ) {
        let readings = match panic::catch_unwind(AssertUnwindSafe(|| probe.sample())) {
            Ok(readings) => readings,
            Err(_) => {
                warn!("Probe '{}' panicked - skipping this tick", probe.name());
                return;
            }
        };

        let timestamp = buffer.elapsed();
        for (series, reading) in readings {
            match reading {
                Ok(value) => buffer.append(&series, timestamp, value),
                Err(e) => {
                    // Warn once per series, then keep quiet
                    if warned.insert(series.clone()) {
                        warn!("{}", e);
                    } else {
                        debug!("Skipping '{}': {}", series, e);
                    }
                }
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::token::CancelReason;
    use crate::monitoring::probe::{ProbeError, ProbeReadings};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    /// Reports a counter for "cpu.load" and always fails "accelerator".
    struct PartialProbe {
        calls: Arc<AtomicU64>,
    }

    impl ResourceProbe for PartialProbe {
        fn name(&self) -> &str {
            "partial"
        }

        fn sample(&mut self) -> ProbeReadings {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut readings = ProbeReadings::new();
            readings.insert("cpu.load".to_string(), Ok(n as f64));
            readings.insert(
                "accelerator".to_string(),
                Err(ProbeError::unavailable("accelerator", "no device")),
            );
            readings
        }
    }

    struct PanickyProbe {
        calls: u64,
    }

    impl ResourceProbe for PanickyProbe {
        fn name(&self) -> &str {
            "panicky"
        }

        fn sample(&mut self) -> ProbeReadings {
            self.calls += 1;
            if self.calls % 2 == 1 {
                panic!("sensor driver crashed");
            }
            let mut readings = ProbeReadings::new();
            readings.insert("ok".to_string(), Ok(1.0));
            readings
        }
    }

    fn partial() -> (ResourceSampler, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let probe = PartialProbe {
            calls: Arc::clone(&calls),
        };
        (ResourceSampler::new(Box::new(probe)), calls)
    }

    #[test]
    fn test_sampler_starts_idle() {
        let (sampler, _) = partial();
        assert_eq!(sampler.state(), SamplerState::Idle);
    }

    #[test]
    fn test_failing_series_never_recorded() {
        let (sampler, calls) = partial();
        let sampler = Arc::new(sampler);
        let buffer = Arc::new(SampleBuffer::new());
        let token = CancellationToken::new();

        let handle = {
            let (s, b, t) = (Arc::clone(&sampler), Arc::clone(&buffer), token.clone());
            thread::spawn(move || s.run(&b, &t, Duration::from_millis(10)))
        };

        thread::sleep(Duration::from_millis(100));
        assert_eq!(sampler.state(), SamplerState::Sampling);
        token.cancel(CancelReason::Interrupt);

        let ticks = handle.join().unwrap().unwrap();
        assert!(ticks >= 2);
        assert_eq!(ticks, calls.load(Ordering::SeqCst));
        assert_eq!(buffer.len("cpu.load") as u64, ticks);
        assert_eq!(buffer.len("accelerator"), 0);
        assert!(!buffer.series_names().contains(&"accelerator".to_string()));
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    #[test]
    fn test_cancel_interrupts_long_interval() {
        let (sampler, _) = partial();
        let buffer = Arc::new(SampleBuffer::new());
        let token = CancellationToken::new();

        let handle = {
            let (b, t) = (Arc::clone(&buffer), token.clone());
            thread::spawn(move || sampler.run(&b, &t, Duration::from_secs(3600)))
        };

        thread::sleep(Duration::from_millis(50));
        let cancelled_at = Instant::now();
        token.cancel(CancelReason::Interrupt);

        assert_eq!(handle.join().unwrap(), Ok(1));
        assert!(cancelled_at.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_cancelled_token_takes_no_samples() {
        let (sampler, calls) = partial();
        let buffer = SampleBuffer::new();
        let token = CancellationToken::new();
        token.cancel(CancelReason::Deadline);

        assert_eq!(sampler.run(&buffer, &token, Duration::from_millis(10)), Ok(0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(buffer.is_empty());
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    #[test]
    fn test_no_restart_after_stop() {
        let (sampler, _) = partial();
        let buffer = SampleBuffer::new();
        let token = CancellationToken::new();
        token.cancel(CancelReason::Deadline);

        sampler.run(&buffer, &token, Duration::from_millis(10)).unwrap();
        let second = sampler.run(&buffer, &token, Duration::from_millis(10));

        assert_eq!(second, Err(SamplerError::AlreadyStarted(SamplerState::Stopped)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (sampler, _) = partial();
        let buffer = SampleBuffer::new();
        let token = CancellationToken::new();

        assert_eq!(
            sampler.run(&buffer, &token, Duration::ZERO),
            Err(SamplerError::ZeroInterval)
        );
        assert_eq!(sampler.state(), SamplerState::Idle);
    }

    #[test]
    fn test_probe_panic_does_not_stop_sampler() {
        let sampler = ResourceSampler::new(Box::new(PanickyProbe { calls: 0 }));
        let buffer = Arc::new(SampleBuffer::new());
        let token = CancellationToken::new();

        let handle = {
            let (b, t) = (Arc::clone(&buffer), token.clone());
            thread::spawn(move || sampler.run(&b, &t, Duration::from_millis(5)))
        };

        thread::sleep(Duration::from_millis(100));
        token.cancel(CancelReason::Interrupt);

        let ticks = handle.join().unwrap().unwrap();
        assert!(ticks >= 2);
        assert!(buffer.len("ok") >= 1);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let (sampler, _) = partial();
        let buffer = Arc::new(SampleBuffer::new());
        let token = CancellationToken::new();

        let handle = {
            let (b, t) = (Arc::clone(&buffer), token.clone());
            thread::spawn(move || sampler.run(&b, &t, Duration::from_millis(5)))
        };

        thread::sleep(Duration::from_millis(60));
        token.cancel(CancelReason::Interrupt);
        handle.join().unwrap().unwrap();

        let points = buffer.series("cpu.load");
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
