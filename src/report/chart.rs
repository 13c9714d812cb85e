//! Resource Chart
//!
//! ASCII time-series chart of every sampled series. Each row is one
//! series scaled to a fixed width, with sample values shaded by their
//! position between the series' min and max.

use std::path::PathBuf;

use log::info;

use super::model::Report;
use super::render::{write_file, RenderError, Renderer};
use crate::monitoring::buffer::Sample;

const CHART_WIDTH: usize = 50;
const LABEL_WIDTH: usize = 24;
const LEVELS: &[u8] = b" .:-=+*#%@";

/// Renders the report's timeline as an ASCII chart.
///
/// Time runs left to right over the elapsed run duration. Columns with
/// no sample stay blank.
pub fn render_chart(report: &Report) -> String {
    let mut output = String::from("\nResource Timeline:\n\n");

    if report.timeline.values().all(Vec::is_empty) {
        output.push_str("  (no samples)\n");
        return output;
    }

    let last_sample = report
        .timeline
        .values()
        .filter_map(|samples| samples.last())
        .map(|s| s.timestamp)
        .max()
        .unwrap_or_default();
    let span_ms = report.duration_elapsed.max(last_sample).as_millis().max(1);

    for (name, samples) in &report.timeline {
        if samples.is_empty() {
            continue;
        }

        let summary = report.summary(name);
        let row = chart_row(samples, span_ms, summary.min, summary.max);
        output.push_str(&format!(
            "{:width$} |{}| {:.3} .. {:.3}\n",
            truncate(name, LABEL_WIDTH),
            row,
            summary.min,
            summary.max,
            width = LABEL_WIDTH
        ));
    }

    output.push_str(&format!(
        "\nSpan: {:.1} s, {} columns\n",
        span_ms as f64 / 1000.0,
        CHART_WIDTH
    ));
    output
}

/// Buckets samples into columns and shades each by its mean value.
fn chart_row(samples: &[Sample], span_ms: u128, min: f64, max: f64) -> String {
    let mut sums = [0.0f64; CHART_WIDTH];
    let mut counts = [0usize; CHART_WIDTH];

    for sample in samples {
        let column = (sample.timestamp.as_millis() * CHART_WIDTH as u128 / span_ms) as usize;
        let column = column.min(CHART_WIDTH - 1);
        sums[column] += sample.value;
        counts[column] += 1;
    }

    sums.iter()
        .zip(counts.iter())
        .map(|(&sum, &count)| {
            if count == 0 {
                ' '
            } else {
                shade(sum / count as f64, min, max)
            }
        })
        .collect()
}

fn shade(value: f64, min: f64, max: f64) -> char {
    let top = LEVELS.len() - 1;
    let range = max - min;

    // Flat series sit mid-scale; index 0 is reserved for "no data"
    let level = if range <= f64::EPSILON {
        top / 2
    } else {
        let scaled = ((value - min) / range * (top - 1) as f64).round() as usize;
        1 + scaled.min(top - 1)
    };

    LEVELS[level] as char
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Writes the chart to `burnin-chart-<UTC timestamp>.txt`.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    dir: PathBuf,
}

impl ChartRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, report: &Report) -> PathBuf {
        self.dir.join(format!(
            "burnin-chart-{}.txt",
            report.generated_at.format("%Y%m%dT%H%M%SZ")
        ))
    }
}

impl Renderer for ChartRenderer {
    fn name(&self) -> &str {
        "chart"
    }

    fn render(&self, report: &Report) -> Result<(), RenderError> {
        let path = self.path_for(report);
        write_file(&path, &render_chart(report))?;

        info!("Saved resource chart to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::counters::CountersSnapshot;
    use crate::execution::token::CancelReason;
    use crate::monitoring::buffer::SampleBuffer;
    use crate::report::model::RunSettings;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn report_from(buffer: &SampleBuffer, elapsed: Duration) -> Report {
        Report::build(
            elapsed,
            buffer,
            CountersSnapshot::default(),
            RunSettings {
                workload: "matmul".to_string(),
                probe: "system".to_string(),
                lanes: 1,
                sample_interval: Duration::from_secs(1),
                requested_duration: elapsed,
            },
            Some(CancelReason::Deadline),
        )
    }

    fn row_for<'a>(chart: &'a str, name: &str) -> &'a str {
        let line = chart.lines().find(|l| l.starts_with(name)).unwrap();
        let start = line.find('|').unwrap() + 1;
        let end = line.rfind('|').unwrap();
        &line[start..end]
    }

    #[test]
    fn test_empty_timeline() {
        let chart = render_chart(&report_from(&SampleBuffer::new(), Duration::from_secs(5)));
        assert!(chart.contains("(no samples)"));
    }

    #[test]
    fn test_rising_series_spans_levels() {
        let buffer = SampleBuffer::new();
        for i in 0..10 {
            buffer.append("cpu.load", Duration::from_secs(i), i as f64 / 10.0);
        }

        let chart = render_chart(&report_from(&buffer, Duration::from_secs(10)));
        let row = row_for(&chart, "cpu.load");

        assert_eq!(row.chars().count(), CHART_WIDTH);
        assert_eq!(row.chars().next(), Some('.'));
        assert!(row.contains('@'));
        assert!(chart.contains("0.000 .. 0.900"));
    }

    #[test]
    fn test_flat_series_is_mid_scale() {
        let buffer = SampleBuffer::new();
        buffer.append("memory.used_fraction", Duration::from_secs(0), 0.5);
        buffer.append("memory.used_fraction", Duration::from_secs(4), 0.5);

        let chart = render_chart(&report_from(&buffer, Duration::from_secs(4)));
        let row = row_for(&chart, "memory.used_fraction");

        assert_eq!(row.chars().next(), Some('='));
        assert_eq!(row.chars().last(), Some('='));
    }

    #[test]
    fn test_zero_elapsed_with_samples() {
        let buffer = SampleBuffer::new();
        buffer.append("cpu.load", Duration::ZERO, 1.0);

        let chart = render_chart(&report_from(&buffer, Duration::ZERO));
        let row = row_for(&chart, "cpu.load");
        assert_eq!(row.trim(), "=");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("accelerator.memory_used_bytes", 12), "accelerat...");
    }

    #[test]
    fn test_chart_renderer_writes_file() {
        let temp_dir = tempdir().unwrap();
        let buffer = SampleBuffer::new();
        buffer.append("cpu.load", Duration::from_secs(1), 0.7);

        let report = report_from(&buffer, Duration::from_secs(2));
        let renderer = ChartRenderer::new(temp_dir.path());
        renderer.render(&report).unwrap();

        let content = fs::read_to_string(renderer.path_for(&report)).unwrap();
        assert!(content.contains("Resource Timeline"));
        assert!(content.contains("cpu.load"));
    }
}
