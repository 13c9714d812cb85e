//! Workload Execution Module
//!
//! Provides everything that burns compute during a run: the shared
//! cancellation token, synthetic workloads, the multi-lane runner and
//! the harness that ties the runner to the resource sampler.
//!
//! # Architecture
//!
//! - [`token`]: One-way cancellation signal shared by every thread of a run
//! - [`counters`]: Linearizable aggregate of workload outcomes
//! - [`tensor`]: Minimal dense matrix used by the synthetic workloads
//! - [`workload`]: The `Workload` capability and its matmul/training variants
//! - [`runner`]: Concurrent lanes driving a workload until cancellation
//! - [`harness`]: Top-level orchestration and report construction

pub mod counters;
pub mod harness;
pub mod runner;
pub mod tensor;
pub mod token;
pub mod workload;

pub use counters::{Counters, CountersSnapshot};
pub use harness::{Harness, HarnessError, HarnessOptions};
pub use runner::{ProgressFn, RunnerError, RunnerHandle, WorkloadRunner};
pub use token::{CancelReason, CancellationToken};
pub use workload::{
    MatMulWorkload, TrainingWorkload, Workload, WorkloadError, WorkloadKind, WorkloadOutcome,
};
