//! Text, JSON and CSV rendering of analysis results
//!
//! Every report is written to a caller-supplied writer so the binary can
//! target stdout and tests can target a buffer.

use crate::cli::OutputFormat;
use crate::durations::{BlockSummary, StageBreakdown, StageShare};
use crate::frame::FrameSlice;
use crate::memory_trend::MemoryTrend;
use crate::timestamp::{delta_seconds, Timestamp};
use crate::timings::{Boundary, MarkerCounts};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_default()
}

#[derive(Serialize)]
struct JsonBreakdown<'a> {
    total_seconds: f64,
    stages: &'a [StageShare],
}

/// Stage breakdown: one line per stage plus the unassigned remainder
pub fn write_breakdown<W: Write>(
    out: &mut W,
    breakdown: &StageBreakdown,
    format: OutputFormat,
) -> Result<()> {
    let shares = breakdown.shares();
    match format {
        OutputFormat::Text => {
            writeln!(out, "Total: {:.1}s", delta_seconds(breakdown.total))?;
            for share in &shares {
                writeln!(
                    out,
                    "{:<16} {:>10.1}s {:>6.1}%",
                    share.stage, share.seconds, share.percent
                )?;
            }
        }
        OutputFormat::Json => {
            let json = JsonBreakdown {
                total_seconds: delta_seconds(breakdown.total),
                stages: &shares,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(out);
            for share in &shares {
                csv.serialize(share)?;
            }
            csv.flush()?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonFrame<'a> {
    frame_index: usize,
    frame_start: Timestamp,
    timings: BTreeMap<&'a str, BTreeMap<&'static str, i64>>,
    resources: &'a [crate::frame::RebasedSample],
}

/// One extracted frame: block offsets, then the rebased resource samples
///
/// CSV output holds the resource samples only.
pub fn write_frame<W: Write>(out: &mut W, slice: &FrameSlice, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(
                out,
                "Frame {} (started {})",
                slice.frame_index, slice.frame_start
            )?;
            for ((block, boundary), offset) in &slice.timings {
                writeln!(out, "  {block:<20} {boundary:<5} {offset:>6}s")?;
            }
            writeln!(out, "{} resource samples", slice.resources.len())?;
            for r in &slice.resources {
                writeln!(
                    out,
                    "  {:>6}s cpu={:.2} mem={:.3}GB",
                    r.offset_secs, r.sample.cpu_fraction, r.sample.memory_gb
                )?;
            }
        }
        OutputFormat::Json => {
            let mut timings: BTreeMap<&str, BTreeMap<&'static str, i64>> = BTreeMap::new();
            for ((block, boundary), offset) in &slice.timings {
                timings
                    .entry(block.as_str())
                    .or_default()
                    .insert(boundary.as_str(), *offset);
            }
            let json = JsonFrame {
                frame_index: slice.frame_index,
                frame_start: slice.frame_start,
                timings,
                resources: &slice.resources,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(out);
            csv.write_record([
                "offset_secs",
                "cpu_fraction",
                "memory_gb",
                "gpu_util_pct",
                "gpu_memory_gb",
                "disk_read_gbps",
                "disk_written_gbps",
            ])?;
            for r in &slice.resources {
                let s = &r.sample;
                csv.write_record([
                    r.offset_secs.to_string(),
                    format!("{:.3}", s.cpu_fraction),
                    format!("{:.3}", s.memory_gb),
                    opt(s.gpu_util_pct),
                    opt(s.gpu_memory_gb),
                    opt(s.disk_read_gbps),
                    opt(s.disk_written_gbps),
                ])?;
            }
            csv.flush()?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct MarkerRow<'a> {
    log: &'a str,
    block: &'a str,
    starts: usize,
    ends: usize,
}

/// Marker counts of the e7 histogramming and reconstruction logs
pub fn write_markers<W: Write>(
    out: &mut W,
    histo: &MarkerCounts,
    recon: &MarkerCounts,
    format: OutputFormat,
) -> Result<()> {
    let rows: Vec<MarkerRow> = [("histogramming", histo), ("reconstruction", recon)]
        .into_iter()
        .flat_map(|(log, counts)| {
            counts.iter().map(move |(block, c)| MarkerRow {
                log,
                block,
                starts: c.starts,
                ends: c.ends,
            })
        })
        .collect();

    match format {
        OutputFormat::Text => {
            for row in &rows {
                let flag = if row.starts == row.ends { "" } else { "  MISMATCH" };
                writeln!(
                    out,
                    "{:<15} {:<10} {}={} {}={}{}",
                    row.log,
                    row.block,
                    Boundary::Start,
                    row.starts,
                    Boundary::End,
                    row.ends,
                    flag
                )?;
            }
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(out);
            for row in &rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
        }
    }
    Ok(())
}

/// Per-frame memory means and the fitted growth rate
pub fn write_trend<W: Write>(out: &mut W, trend: &MemoryTrend, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for f in &trend.frames {
                writeln!(
                    out,
                    "frame {:>4}  {:>8.3} GB  ({} samples)",
                    f.frame_index, f.mean_memory_gb, f.samples
                )?;
            }
            match &trend.fit {
                Some(fit) => writeln!(
                    out,
                    "Memory grows by {:.4} GB per frame (intercept {:.3} GB)",
                    fit.rate, fit.intercept
                )?,
                None => writeln!(out, "Not enough frames to fit a trend")?,
            }
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(trend)?)?,
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(out);
            for f in &trend.frames {
                csv.serialize(f)?;
            }
            csv.flush()?;
        }
    }
    Ok(())
}

/// Mean and standard deviation of every block across frames
pub fn write_summaries<W: Write>(
    out: &mut W,
    summaries: &BTreeMap<String, BlockSummary>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (block, s) in summaries {
                writeln!(
                    out,
                    "{:<20} {:>10.3}s ± {:.3}s over {} frames",
                    block, s.mean_secs, s.std_dev_secs, s.frames
                )?;
            }
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(summaries)?)?,
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(out);
            csv.write_record(["block", "frames", "mean_secs", "std_dev_secs"])?;
            for (block, s) in summaries {
                csv.write_record([
                    block.clone(),
                    s.frames.to_string(),
                    format!("{:.3}", s.mean_secs),
                    format!("{:.3}", s.std_dev_secs),
                ])?;
            }
            csv.flush()?;
        }
    }
    Ok(())
}
