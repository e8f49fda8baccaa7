// Unit normalization for resource telemetry values
//
// All memory and disk values end up in decimal gigabytes (MiB / 1000),
// matching the GB convention used by every plot downstream.

use crate::error::{BenchError, Result};

const MB_PER_GB: f64 = 1000.0;

fn parse_number(column: &'static str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| BenchError::InvalidNumber {
            column,
            value: text.to_string(),
        })
}

/// Megabytes to gigabytes (decimal)
pub fn mb_to_gb(megabytes: f64) -> f64 {
    megabytes / MB_PER_GB
}

/// Parse a container memory string such as `"1.2GiB / 15.5GiB"`, `"500MiB"` or `"0B"`
///
/// Only the used side of a `used / limit` pair is kept.
pub fn parse_memory_gb(raw: &str) -> Result<f64> {
    let used = raw.split(" / ").next().unwrap_or(raw).trim();

    if used == "0B" {
        return Ok(0.0);
    }
    if let Some(value) = used.strip_suffix("GiB") {
        return parse_number("memory", value);
    }
    if let Some(value) = used.strip_suffix("MiB") {
        return parse_number("memory", value).map(mb_to_gb);
    }

    Err(BenchError::UnknownUnit {
        column: "memory",
        value: raw.to_string(),
        expected: "GiB or MiB",
    })
}

/// Parse a GPU memory string, which must carry a `MiB` suffix
pub fn parse_gpu_memory_gb(raw: &str) -> Result<f64> {
    match raw.trim().strip_suffix("MiB") {
        Some(value) => parse_number("gpu_memory", value).map(mb_to_gb),
        None => Err(BenchError::UnknownUnit {
            column: "gpu_memory",
            value: raw.to_string(),
            expected: "MiB",
        }),
    }
}

/// Parse a utilization string such as `"150%"` or `"45 %"` to its percentage
pub fn parse_percent(column: &'static str, raw: &str) -> Result<f64> {
    let text = raw.trim();
    let text = text.strip_suffix('%').unwrap_or(text);
    parse_number(column, text)
}

/// CPU percent-of-one-core to a core-count fraction (`"150%"` is 1.5 cores)
pub fn parse_cpu_fraction(raw: &str) -> Result<f64> {
    parse_percent("cpu_util", raw).map(|pct| pct / 100.0)
}

/// Disk throughput in MB to GB
pub fn parse_disk_gb(column: &'static str, raw: &str) -> Result<f64> {
    parse_number(column, raw).map(mb_to_gb)
}

/// Plain number in the unit it arrived in
pub fn parse_plain(column: &'static str, raw: &str) -> Result<f64> {
    parse_number(column, raw)
}
