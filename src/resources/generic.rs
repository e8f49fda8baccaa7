//! Container-stats resource CSV (NiftyPET and SIRF-STIR runs)
//!
//! Columns arrive as `Timestamp, CPU_Usage(%), Memory_Usage(%),
//! Memory_Usage/Limit, GPU_Memory, GPU_Utilization, Disk_Read,
//! Disk_Written`. Memory carries `GiB`/`MiB` suffixes and an optional
//! `used / limit` pair, CPU and GPU utilization carry `%`, GPU memory
//! carries `MiB` and disk values are in MB.

use super::units::{parse_cpu_fraction, parse_disk_gb, parse_gpu_memory_gb, parse_memory_gb, parse_percent};
use super::{cell, required_cell, HeaderIndex, RenameTable, ResourceSample, ResourceTable};
use crate::error::Result;
use crate::timestamp::parse_timestamp;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Canonical name → container-stats header
pub const COLUMNS: &RenameTable = &[
    ("time", "Timestamp"),
    ("cpu_util", "CPU_Usage(%)"),
    ("memory", "Memory_Usage/Limit"),
    ("gpu_memory", "GPU_Memory"),
    ("gpu_util", "GPU_Utilization"),
    ("disk_read", "Disk_Read"),
    ("disk_written", "Disk_Written"),
];

/// Parse a container-stats CSV into the canonical table
pub fn parse<R: Read>(reader: R) -> Result<ResourceTable> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let index = HeaderIndex::new(csv.headers()?, COLUMNS);

    let time = index.required("time")?;
    let cpu = index.required("cpu_util")?;
    let memory = index.required("memory")?;
    let gpu_memory = index.optional("gpu_memory");
    let gpu_util = index.optional("gpu_util");
    let disk_read = index.optional("disk_read");
    let disk_written = index.optional("disk_written");

    let mut samples = Vec::new();
    for record in csv.records() {
        let record = record?;
        samples.push(ResourceSample {
            time: parse_timestamp(required_cell(&record, time))?,
            cpu_fraction: parse_cpu_fraction(required_cell(&record, cpu))?,
            memory_gb: parse_memory_gb(required_cell(&record, memory))?,
            gpu_util_pct: cell(&record, gpu_util)
                .map(|v| parse_percent("gpu_util", v))
                .transpose()?,
            gpu_memory_gb: cell(&record, gpu_memory)
                .map(parse_gpu_memory_gb)
                .transpose()?,
            disk_read_gbps: cell(&record, disk_read)
                .map(|v| parse_disk_gb("disk_read", v))
                .transpose()?,
            disk_written_gbps: cell(&record, disk_written)
                .map(|v| parse_disk_gb("disk_written", v))
                .transpose()?,
        });
    }

    tracing::debug!("Parsed {} container-stats samples", samples.len());
    Ok(ResourceTable::new(samples))
}

/// Read a container-stats CSV file
pub fn load(path: &Path) -> Result<ResourceTable> {
    parse(File::open(path)?)
}
