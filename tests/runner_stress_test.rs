//! Many lanes hammering the shared counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use burnin::execution::{Workload, WorkloadError, WorkloadRunner};
use burnin::{CancelReason, CancellationToken};

/// Succeeds until `budget` steps have been handed out, then cancels.
struct Budgeted {
    issued: AtomicU64,
    budget: u64,
    token: CancellationToken,
}

impl Workload for Budgeted {
    fn name(&self) -> &str {
        "budgeted"
    }

    fn step(&self) -> Result<Option<f64>, WorkloadError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.budget {
            self.token.cancel(CancelReason::Deadline);
        }
        Ok(Some(1.0))
    }
}

/// Fails every third step and panics every fifth.
struct Unreliable {
    calls: AtomicU64,
}

impl Workload for Unreliable {
    fn name(&self) -> &str {
        "unreliable"
    }

    fn step(&self) -> Result<Option<f64>, WorkloadError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 5 == 4 {
            panic!("step {} blew up", n);
        }
        if n % 3 == 2 {
            return Err(WorkloadError::StepFailed(format!("step {}", n)));
        }
        Ok(None)
    }
}

#[test]
fn test_no_lost_updates_with_many_lanes() {
    let token = CancellationToken::new();
    let workload = Arc::new(Budgeted {
        issued: AtomicU64::new(0),
        budget: 50_000,
        token: token.clone(),
    });

    let counters = WorkloadRunner::new(32)
        .with_yield(false)
        .run(workload.clone(), &token)
        .unwrap();

    // Every issued step is recorded exactly once, including the ones
    // in flight when the budget ran out
    let issued = workload.issued.load(Ordering::SeqCst);
    assert!(issued >= 50_000);
    assert_eq!(counters.iterations_completed, issued);
    assert_eq!(counters.iterations_failed, 0);
    assert_eq!(counters.metrics_recorded, issued);
    assert_eq!(counters.cumulative_metric_sum, issued as f64);
}

#[test]
fn test_failures_and_panics_are_counted() {
    let token = CancellationToken::new();
    let workload = Arc::new(Unreliable {
        calls: AtomicU64::new(0),
    });

    let handle = WorkloadRunner::new(8)
        .spawn(workload.clone(), &token)
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    token.cancel(CancelReason::Interrupt);
    let counters = handle.join();

    let calls = workload.calls.load(Ordering::SeqCst);
    assert!(calls > 0);
    assert_eq!(counters.total_iterations(), calls);
    assert!(counters.iterations_failed > 0);
    assert!(counters.iterations_completed > 0);
    assert_eq!(counters.last_metric, None);
}
