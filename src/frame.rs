//! Single-frame extraction and rebasing
//!
//! Cuts one frame out of a whole-run resource table and timing table and
//! expresses both in whole seconds since the frame started.

use crate::error::{BenchError, Result};
use crate::recorder::FRAME_BLOCK;
use crate::resources::{ResourceSample, ResourceTable};
use crate::timestamp::{whole_seconds_since, Timestamp};
use crate::timings::{BlockKey, Boundary, TimingTable};
use serde::Serialize;
use std::collections::BTreeMap;

/// Resource sample positioned relative to its frame start
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebasedSample {
    /// Whole seconds since frame start (truncated)
    pub offset_secs: i64,
    #[serde(flatten)]
    pub sample: ResourceSample,
}

/// One frame of resources and timings, rebased to the frame start
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSlice {
    pub frame_index: usize,
    pub frame_start: Timestamp,
    pub resources: Vec<RebasedSample>,
    /// Whole seconds since frame start for every `(block, boundary)` cell of the frame
    pub timings: BTreeMap<BlockKey, i64>,
}

impl FrameSlice {
    pub fn timing(&self, block: &str, boundary: Boundary) -> Option<i64> {
        self.timings.get(&(block.to_string(), boundary)).copied()
    }

    /// Frame length in whole seconds
    pub fn duration_secs(&self) -> Option<i64> {
        self.timing(FRAME_BLOCK, Boundary::End)
    }
}

fn frame_boundary(timings: &TimingTable, frame_index: usize, boundary: Boundary) -> Result<Timestamp> {
    timings
        .row(frame_index)?
        .get(FRAME_BLOCK, boundary)
        .ok_or_else(|| BenchError::MissingBoundary {
            frame: frame_index,
            block: FRAME_BLOCK.to_string(),
            boundary: boundary.as_str(),
        })
}

/// Slice resources strictly inside the frame and rebase both tables to the frame start
///
/// A sample exactly on a boundary belongs to neither adjacent frame.
pub fn extract_frame(
    resources: &ResourceTable,
    timings: &TimingTable,
    frame_index: usize,
) -> Result<FrameSlice> {
    let start = frame_boundary(timings, frame_index, Boundary::Start)?;
    let end = frame_boundary(timings, frame_index, Boundary::End)?;

    let rebased_resources = resources
        .between_exclusive(start, end)
        .map(|sample| RebasedSample {
            offset_secs: whole_seconds_since(&start, &sample.time),
            sample: sample.clone(),
        })
        .collect::<Vec<_>>();

    let rebased_timings = timings
        .row(frame_index)?
        .cells()
        .iter()
        .map(|(key, ts)| (key.clone(), whole_seconds_since(&start, ts)))
        .collect();

    tracing::debug!(
        "Frame {} holds {} resource samples",
        frame_index,
        rebased_resources.len()
    );

    Ok(FrameSlice {
        frame_index,
        frame_start: start,
        resources: rebased_resources,
        timings: rebased_timings,
    })
}
