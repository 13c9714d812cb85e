//! Burnin - CPU/GPU Burn-in Harness
//!
//! Runs synthetic compute workloads on several concurrent lanes for a
//! bounded wall-clock duration while sampling system resource usage,
//! then summarizes everything in a single report.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`execution`]: Cancellation token, workloads, lanes and the harness
//! - [`monitoring`]: Resource probes, the background sampler and the sample store
//! - [`report`]: Final report model, live status lines and renderers
//! - [`config`]: Run configuration, YAML loading and duration parsing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use burnin::execution::{Harness, HarnessOptions, MatMulWorkload};
//! use burnin::monitoring::SystemProbe;
//! use burnin::report::ConsoleRenderer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = HarnessOptions {
//!         duration: Duration::from_secs(60),
//!         lanes: 4,
//!         ..HarnessOptions::default()
//!     };
//!
//!     let workload = Arc::new(MatMulWorkload::new(512)?);
//!     let probe = Box::new(SystemProbe::new());
//!
//!     let report = Harness::new(options).run(workload, probe, &ConsoleRenderer)?;
//!     println!("{} iterations", report.counters.iterations_completed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod execution;
pub mod monitoring;
pub mod report;

// Re-export commonly used types
pub use config::{load_config, RunConfig};
pub use execution::harness::{Harness, HarnessOptions};
pub use execution::token::{CancelReason, CancellationToken};
pub use report::Report;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Burnin";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "Burnin");
    }

    #[test]
    fn test_module_exports_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_module_exports_config() {
        let config = RunConfig::default();
        assert!(config.lanes >= 1);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
