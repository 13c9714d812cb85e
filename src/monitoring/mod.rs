//! Resource Monitoring Module
//!
//! Provides utilities for tracking system resource usage over the
//! course of a burn-in run.
//!
//! # Components
//!
//! - [`SampleBuffer`]: Multi-series time store with summary statistics
//! - [`ResourceProbe`]: CPU, memory, temperature and GPU readings
//! - [`ResourceSampler`]: Background loop feeding probe readings into the buffer

pub mod buffer;
pub mod probe;
pub mod sampler;

pub use buffer::{Sample, SampleBuffer, SeriesSummary};
pub use probe::{
    AcceleratorProbe, CompositeProbe, ProbeError, ProbeKind, ProbeReadings, ResourceProbe,
    SystemProbe,
};
pub use sampler::{ResourceSampler, SamplerError, SamplerState, DEFAULT_SAMPLE_INTERVAL};
