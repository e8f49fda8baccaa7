//! petbench - timing and resource analysis for PET reconstruction benchmarks
//!
//! This library records per-frame block timings of reconstruction runs
//! (NiftyPET, SIRF-STIR), recovers the same timings from e7-tools logs,
//! normalizes resource telemetry from every source into one table, and
//! cuts single frames out of a run for comparison across toolboxes.

pub mod cli;
pub mod config;
pub mod driver;
pub mod durations;
pub mod e7_log;
pub mod error;
pub mod frame;
pub mod inputs;
pub mod memory_trend;
pub mod recorder;
pub mod report;
pub mod resources;
pub mod timestamp;
pub mod timings;

pub use error::{BenchError, Result};
