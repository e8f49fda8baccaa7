//! Timing tables from recorder output (NiftyPET and SIRF-STIR runs)

use super::{Boundary, TimingRow, TimingTable};
use crate::recorder::{FrameTiming, MetadataFile};

/// Flatten each frame's block mapping into one row of `(block, start|end)` cells
pub fn from_frames(frames: &[FrameTiming]) -> TimingTable {
    let rows = frames
        .iter()
        .map(|frame| {
            let mut row = TimingRow::default();
            for (name, span) in &frame.blocks {
                row.insert(name, Boundary::Start, span.start);
                row.insert(name, Boundary::End, span.end);
            }
            row
        })
        .collect();
    TimingTable::new(rows)
}

/// Timing table of a loaded `metadata.json`
pub fn from_metadata_file(file: &MetadataFile) -> TimingTable {
    from_frames(&file.timings)
}
