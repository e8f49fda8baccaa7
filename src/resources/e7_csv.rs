//! e7-tools resource CSV (Windows PowerShell sampler)
//!
//! Values are already numeric: `cpu_cores` is a core count, `memory` and
//! `gpu_memory` are MiB. Disk columns are passed through unscaled.

use super::units::{mb_to_gb, parse_plain};
use super::{cell, required_cell, HeaderIndex, RenameTable, ResourceSample, ResourceTable};
use crate::error::Result;
use crate::timestamp::parse_timestamp;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Canonical name → PowerShell sampler header
pub const COLUMNS: &RenameTable = &[
    ("time", "time"),
    ("cpu_util", "cpu_cores"),
    ("memory", "memory"),
    ("gpu_util", "gpu_util"),
    ("gpu_memory", "gpu_memory"),
    ("disk_read", "disk_read"),
    ("disk_written", "disk_write"),
];

/// Parse an e7 resource CSV into the canonical table
pub fn parse<R: Read>(reader: R) -> Result<ResourceTable> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let index = HeaderIndex::new(csv.headers()?, COLUMNS);

    let time = index.required("time")?;
    let cpu = index.required("cpu_util")?;
    let memory = index.required("memory")?;
    let gpu_util = index.optional("gpu_util");
    let gpu_memory = index.optional("gpu_memory");
    let disk_read = index.optional("disk_read");
    let disk_written = index.optional("disk_written");

    let mut samples = Vec::new();
    for record in csv.records() {
        let record = record?;
        samples.push(ResourceSample {
            time: parse_timestamp(required_cell(&record, time))?,
            cpu_fraction: parse_plain("cpu_util", required_cell(&record, cpu))?,
            memory_gb: mb_to_gb(parse_plain("memory", required_cell(&record, memory))?),
            gpu_util_pct: cell(&record, gpu_util)
                .map(|v| parse_plain("gpu_util", v))
                .transpose()?,
            gpu_memory_gb: cell(&record, gpu_memory)
                .map(|v| parse_plain("gpu_memory", v).map(mb_to_gb))
                .transpose()?,
            disk_read_gbps: cell(&record, disk_read)
                .map(|v| parse_plain("disk_read", v))
                .transpose()?,
            disk_written_gbps: cell(&record, disk_written)
                .map(|v| parse_plain("disk_written", v))
                .transpose()?,
        });
    }

    tracing::debug!("Parsed {} e7 resource samples", samples.len());
    Ok(ResourceTable::new(samples))
}

/// Read an e7 resource CSV file
pub fn load(path: &Path) -> Result<ResourceTable> {
    parse(File::open(path)?)
}
