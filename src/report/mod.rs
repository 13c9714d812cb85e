//! Run Reporting Module
//!
//! Everything produced after (or while) a run executes.
//!
//! - [`model`]: The immutable [`Report`] built once at shutdown
//! - [`status`]: One-line live status snapshots
//! - [`render`]: The [`Renderer`] collaborator and its console/JSON variants
//! - [`chart`]: ASCII time-series chart renderer

pub mod chart;
pub mod model;
pub mod render;
pub mod status;

pub use chart::{render_chart, ChartRenderer};
pub use model::{Report, RunSettings};
pub use render::{ConsoleRenderer, JsonRenderer, MultiRenderer, RenderError, Renderer};
pub use status::format_status;

/// Serde helpers storing a [`std::time::Duration`] as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| D::Error::custom(format!("{}: {}", e, secs)))
    }
}
