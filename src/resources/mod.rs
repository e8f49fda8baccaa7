// Resource telemetry normalization
//
// Every telemetry source (container stats CSV, e7 PowerShell CSV) is read
// into the same canonical ResourceTable: one sample per observed
// timestamp, ordered by time, duplicates kept.

pub mod e7_csv;
pub mod generic;
pub mod units;

use crate::error::{BenchError, Result};
use crate::timestamp::Timestamp;
use chrono::TimeDelta;
use csv::StringRecord;
use serde::Serialize;
use std::collections::HashMap;

/// One observed resource usage row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSample {
    pub time: Timestamp,
    /// Busy CPU expressed in cores (1.5 = one and a half cores)
    pub cpu_fraction: f64,
    pub memory_gb: f64,
    pub gpu_util_pct: Option<f64>,
    pub gpu_memory_gb: Option<f64>,
    pub disk_read_gbps: Option<f64>,
    pub disk_written_gbps: Option<f64>,
}

impl ResourceSample {
    /// Sample with only the mandatory columns set
    pub fn new(time: Timestamp, cpu_fraction: f64, memory_gb: f64) -> Self {
        Self {
            time,
            cpu_fraction,
            memory_gb,
            gpu_util_pct: None,
            gpu_memory_gb: None,
            disk_read_gbps: None,
            disk_written_gbps: None,
        }
    }
}

/// Time-ordered resource samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    samples: Vec<ResourceSample>,
}

impl ResourceTable {
    /// Build a table, sorting by time while keeping same-timestamp rows in input order
    pub fn new(mut samples: Vec<ResourceSample>) -> Self {
        samples.sort_by_key(|s| s.time);
        Self { samples }
    }

    pub fn samples(&self) -> &[ResourceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_time(&self) -> Option<Timestamp> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.samples.last().map(|s| s.time)
    }

    /// Time between the first and the last sample
    pub fn span(&self) -> TimeDelta {
        match (self.first_time(), self.last_time()) {
            (Some(first), Some(last)) => last - first,
            _ => TimeDelta::zero(),
        }
    }

    /// Samples strictly inside `(start, end)`
    pub fn between_exclusive(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> impl Iterator<Item = &ResourceSample> {
        self.samples
            .iter()
            .filter(move |s| s.time > start && s.time < end)
    }

    /// Copy of the table with every timestamp moved by `delta`
    pub fn shifted(&self, delta: TimeDelta) -> Self {
        let samples = self
            .samples
            .iter()
            .map(|s| ResourceSample {
                time: s.time + delta,
                ..s.clone()
            })
            .collect();
        Self { samples }
    }

    /// Concatenate two tables, keeping time order
    pub fn concat(self, other: ResourceTable) -> Self {
        let mut samples = self.samples;
        samples.extend(other.samples);
        Self::new(samples)
    }
}

/// Canonical column names and the native header each source uses for them
pub type RenameTable = [(&'static str, &'static str)];

/// Header lookup that resolves canonical names through a rename table
pub(crate) struct HeaderIndex {
    positions: HashMap<String, usize>,
    renames: &'static RenameTable,
}

impl HeaderIndex {
    pub(crate) fn new(headers: &StringRecord, renames: &'static RenameTable) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        Self { positions, renames }
    }

    fn native<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(c, _)| *c == canonical)
            .map(|(_, n)| *n)
            .unwrap_or(canonical)
    }

    pub(crate) fn optional(&self, canonical: &str) -> Option<usize> {
        self.positions
            .get(self.native(canonical))
            .or_else(|| self.positions.get(canonical))
            .copied()
    }

    pub(crate) fn required(&self, canonical: &str) -> Result<usize> {
        self.optional(canonical)
            .ok_or_else(|| BenchError::MissingColumn(self.native(canonical).to_string()))
    }
}

/// Non-empty cell of an optional column
pub(crate) fn cell<'r>(record: &'r StringRecord, column: Option<usize>) -> Option<&'r str> {
    column
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Cell of a required column; an absent cell reads as empty
pub(crate) fn required_cell(record: &StringRecord, column: usize) -> &str {
    record.get(column).map(str::trim).unwrap_or("")
}
