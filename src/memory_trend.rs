//! Memory growth across frames
//!
//! Long dynamic reconstructions sometimes leak host memory frame after
//! frame. Averaging the memory samples of each frame and fitting a line
//! through the averages gives the leak rate in GB per frame.

use crate::error::{BenchError, Result};
use crate::recorder::FRAME_BLOCK;
use crate::resources::ResourceTable;
use crate::timings::{Boundary, TimingTable};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean memory of the samples assigned to one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMemory {
    pub frame_index: usize,
    pub samples: usize,
    pub mean_memory_gb: f64,
}

/// Least-squares line through the per-frame means
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    /// GB per frame
    pub rate: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryTrend {
    pub frames: Vec<FrameMemory>,
    /// `None` with fewer than two frames holding samples
    pub fit: Option<LinearFit>,
}

/// Per-frame memory averages and their linear trend
///
/// Each sample goes to the first frame whose `[from_block.start, frame.end]`
/// window (both ends inclusive) contains it; samples outside every window
/// are ignored and frames without samples are left out.
pub fn memory_trend(
    resources: &ResourceTable,
    timings: &TimingTable,
    from_block: &str,
) -> Result<MemoryTrend> {
    let mut windows = Vec::with_capacity(timings.len());
    for (index, row) in timings.rows().iter().enumerate() {
        let start = row
            .get(from_block, Boundary::Start)
            .ok_or_else(|| BenchError::MissingBoundary {
                frame: index,
                block: from_block.to_string(),
                boundary: Boundary::Start.as_str(),
            })?;
        let end = row
            .get(FRAME_BLOCK, Boundary::End)
            .ok_or_else(|| BenchError::MissingBoundary {
                frame: index,
                block: FRAME_BLOCK.to_string(),
                boundary: Boundary::End.as_str(),
            })?;
        windows.push((start, end));
    }

    let mut sums: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
    for sample in resources.samples() {
        let frame = windows
            .iter()
            .position(|(start, end)| sample.time >= *start && sample.time <= *end);
        if let Some(frame) = frame {
            let entry = sums.entry(frame).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += sample.memory_gb;
        }
    }

    let frames: Vec<FrameMemory> = sums
        .into_iter()
        .map(|(frame_index, (samples, total))| FrameMemory {
            frame_index,
            samples,
            mean_memory_gb: total / samples as f64,
        })
        .collect();

    let points: Vec<(f64, f64)> = frames
        .iter()
        .map(|f| (f.frame_index as f64, f.mean_memory_gb))
        .collect();

    Ok(MemoryTrend {
        fit: linear_fit(&points),
        frames,
    })
}

/// Ordinary least-squares fit of `y = rate * x + intercept`
pub fn linear_fit(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let rate = sxy / sxx;
    Some(LinearFit {
        rate,
        intercept: mean_y - rate * mean_x,
    })
}

/// Join the histogramming and reconstruction telemetry of an e7 run
///
/// The histogramming table is shifted so its last sample lands on the first
/// reconstruction sample, hiding the idle gap between the two passes.
pub fn concat_phases(histo: &ResourceTable, recon: &ResourceTable) -> ResourceTable {
    match (histo.last_time(), recon.first_time()) {
        (Some(histo_end), Some(recon_start)) => {
            histo.shifted(recon_start - histo_end).concat(recon.clone())
        }
        _ => histo.clone().concat(recon.clone()),
    }
}
