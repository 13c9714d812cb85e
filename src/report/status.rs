//! Live Status
//!
//! One-line, read-only snapshot of a running harness: elapsed time,
//! counters and the latest value of the headline resource series.

use std::time::Duration;

use colored::Colorize;

use crate::execution::counters::CountersSnapshot;
use crate::monitoring::buffer::SampleBuffer;
use crate::monitoring::probe::series;

/// Formats a live status line.
///
/// Series that have not been sampled yet are shown as `-`.
pub fn format_status(elapsed: Duration, counters: &CountersSnapshot, buffer: &SampleBuffer) -> String {
    let fraction = |name: &str| {
        buffer
            .latest(name)
            .map_or_else(|| "-".to_string(), |v| format!("{:.0}%", v * 100.0))
    };

    let mut line = format!(
        "[{:>8.1}s] iterations: {} ok / {} failed | cpu {} | mem {}",
        elapsed.as_secs_f64(),
        counters.iterations_completed.to_string().green(),
        failed_label(counters.iterations_failed),
        fraction(series::CPU_LOAD),
        fraction(series::MEMORY_FRACTION),
    );

    if let Some(gpu) = buffer.latest(series::ACCEL_UTILIZATION) {
        line.push_str(&format!(" | gpu {:.0}%", gpu * 100.0));
    }
    if let Some(metric) = counters.last_metric {
        line.push_str(&format!(" | last metric {:.4}", metric));
    }

    line
}

fn failed_label(failed: u64) -> String {
    if failed == 0 {
        failed.to_string()
    } else {
        failed.to_string().red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_without_samples() {
        colored::control::set_override(false);
        let buffer = SampleBuffer::new();
        let counters = CountersSnapshot::default();

        let line = format_status(Duration::from_secs(3), &counters, &buffer);
        assert!(line.contains("iterations: 0 ok / 0 failed"));
        assert!(line.contains("cpu -"));
        assert!(!line.contains("gpu"));
        assert!(!line.contains("last metric"));
    }

    #[test]
    fn test_status_with_samples() {
        colored::control::set_override(false);
        let buffer = SampleBuffer::new();
        buffer.append(series::CPU_LOAD, Duration::ZERO, 0.93);
        buffer.append(series::MEMORY_FRACTION, Duration::ZERO, 0.5);
        buffer.append(series::ACCEL_UTILIZATION, Duration::ZERO, 0.99);

        let counters = CountersSnapshot {
            iterations_completed: 42,
            iterations_failed: 1,
            last_metric: Some(0.25),
            ..CountersSnapshot::default()
        };

        let line = format_status(Duration::from_secs(12), &counters, &buffer);
        assert!(line.contains("42 ok / 1 failed"));
        assert!(line.contains("cpu 93%"));
        assert!(line.contains("mem 50%"));
        assert!(line.contains("gpu 99%"));
        assert!(line.contains("last metric 0.2500"));
    }
}
