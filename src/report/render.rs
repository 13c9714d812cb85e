//! Report Renderers
//!
//! A renderer persists or displays a finished [`Report`]. Renderers are
//! never required for a run to succeed: the harness logs their errors
//! and carries on.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use log::{info, warn};
use thiserror::Error;

use super::model::Report;

/// Errors raised while rendering a report.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Consumer of a finished report.
pub trait Renderer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Renders the report.
    fn render(&self, report: &Report) -> Result<(), RenderError>;
}

/// Prints a human-readable summary to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRenderer;

impl ConsoleRenderer {
    /// Formats the summary printed by [`ConsoleRenderer::render`].
    pub fn format(report: &Report) -> String {
        let mut out = String::new();

        let headline = match report.stop_reason {
            Some(reason) if report.is_partial() => format!("Burn-in stopped early ({})", reason)
                .yellow()
                .bold()
                .to_string(),
            _ => "Burn-in completed".green().bold().to_string(),
        };
        out.push_str(&format!("{}\n", headline));

        let c = &report.counters;
        out.push_str(&format!(
            "  Elapsed:      {:.2?} of {:.2?}\n",
            report.duration_elapsed, report.settings.requested_duration
        ));
        out.push_str(&format!(
            "  Workload:     {} x {} lane(s)\n",
            report.settings.workload, report.settings.lanes
        ));
        out.push_str(&format!(
            "  Iterations:   {} completed, {} failed ({:.2}/s)\n",
            c.iterations_completed,
            c.iterations_failed,
            report.iterations_per_second()
        ));
        if let Some(mean) = report.mean_metric() {
            out.push_str(&format!("  Mean metric:  {:.6}\n", mean));
        }

        if report.series.is_empty() {
            out.push_str("  No resource data collected\n");
            return out;
        }

        out.push_str(&format!("\nResource Usage ({} probe):\n", report.settings.probe));
        let width = report.series.keys().map(String::len).max().unwrap_or(0);
        for (name, summary) in &report.series {
            out.push_str(&format!(
                "  {:width$}  min {:>12.3}  mean {:>12.3}  max {:>12.3}  ({} samples)\n",
                name,
                summary.min,
                summary.mean,
                summary.max,
                summary.count,
                width = width
            ));
        }

        out
    }
}

impl Renderer for ConsoleRenderer {
    fn name(&self) -> &str {
        "console"
    }

    fn render(&self, report: &Report) -> Result<(), RenderError> {
        println!();
        print!("{}", Self::format(report));
        Ok(())
    }
}

/// Writes the report as pretty-printed JSON.
///
/// Files are named `burnin-report-<UTC timestamp>.json` inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonRenderer {
    dir: PathBuf,
}

impl JsonRenderer {
    /// Creates a renderer writing into `dir` (created on demand).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path the report will be written to.
    pub fn path_for(&self, report: &Report) -> PathBuf {
        self.dir.join(format!(
            "burnin-report-{}.json",
            report.generated_at.format("%Y%m%dT%H%M%SZ")
        ))
    }
}

impl Renderer for JsonRenderer {
    fn name(&self) -> &str {
        "json"
    }

    fn render(&self, report: &Report) -> Result<(), RenderError> {
        let path = self.path_for(report);
        let json = serde_json::to_string_pretty(report)?;
        write_file(&path, &json)?;

        info!("Saved report to {}", path.display());
        Ok(())
    }
}

/// Runs several renderers in order.
///
/// Every renderer runs even if an earlier one fails; the first error is
/// returned.
#[derive(Default)]
pub struct MultiRenderer {
    renderers: Vec<Box<dyn Renderer>>,
}

impl MultiRenderer {
    /// Creates an empty multi-renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a renderer.
    pub fn with(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderers.push(Box::new(renderer));
        self
    }

    /// Number of wrapped renderers.
    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    /// Returns true if no renderers are wrapped.
    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl Renderer for MultiRenderer {
    fn name(&self) -> &str {
        "multi"
    }

    fn render(&self, report: &Report) -> Result<(), RenderError> {
        let mut first_error = None;

        for renderer in &self.renderers {
            if let Err(e) = renderer.render(report) {
                warn!("Renderer '{}' failed: {}", renderer.name(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Writes `contents` to `path`, creating parent directories.
pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| RenderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    fs::write(path, contents).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}
