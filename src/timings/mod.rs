// Per-frame timing tables
//
// A TimingTable has one row per frame and one cell per
// (block_name, start|end) pair. Rows built from a TimingRecord and rows
// built from pattern-matched e7 log lines share this shape, so the frame
// extraction and duration code never needs to know where they came from.

pub mod e7;
pub mod record;

pub use e7::{
    histogram_timings, recon_timings, E7Timings, HistogramMarkerStrategy, MatchRule, PhaseMarker,
    SinogramPairHeuristic, RECON_MARKERS,
};
pub use record::{from_frames, from_metadata_file};

use crate::error::{BenchError, Result};
use crate::timestamp::Timestamp;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which end of a block a cell holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::Start => "start",
            Boundary::End => "end",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Column key of a timing table
pub type BlockKey = (String, Boundary);

/// Block boundaries of a single frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingRow {
    cells: BTreeMap<BlockKey, Timestamp>,
}

impl TimingRow {
    pub fn insert(&mut self, block: &str, boundary: Boundary, ts: Timestamp) {
        self.cells.insert((block.to_string(), boundary), ts);
    }

    pub fn get(&self, block: &str, boundary: Boundary) -> Option<Timestamp> {
        self.cells.get(&(block.to_string(), boundary)).copied()
    }

    /// `end - start` of a block, if both cells are present
    pub fn span(&self, block: &str) -> Option<TimeDelta> {
        Some(self.get(block, Boundary::End)? - self.get(block, Boundary::Start)?)
    }

    pub fn cells(&self) -> &BTreeMap<BlockKey, Timestamp> {
        &self.cells
    }

    /// Distinct block names present in this row
    pub fn block_names(&self) -> BTreeSet<&str> {
        self.cells.keys().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Frame-by-frame timing table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTable {
    rows: Vec<TimingRow>,
}

impl TimingTable {
    pub fn new(rows: Vec<TimingRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TimingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of a zero-based frame index
    pub fn row(&self, frame_index: usize) -> Result<&TimingRow> {
        self.rows
            .get(frame_index)
            .ok_or(BenchError::FrameIndexOutOfRange {
                index: frame_index,
                frames: self.rows.len(),
            })
    }

    /// Union of all column keys across frames
    pub fn columns(&self) -> BTreeSet<&BlockKey> {
        self.rows.iter().flat_map(|row| row.cells.keys()).collect()
    }

    /// Union of all block names across frames
    pub fn block_names(&self) -> BTreeSet<&str> {
        self.rows.iter().flat_map(|row| row.block_names()).collect()
    }

    /// Build a table from per-column timestamp lists; row `i` takes the `i`-th entry of every column
    pub fn from_columns(columns: &BTreeMap<BlockKey, Vec<Timestamp>>) -> Self {
        let frames = columns.values().map(Vec::len).max().unwrap_or(0);
        let mut rows = vec![TimingRow::default(); frames];
        for ((block, boundary), stamps) in columns {
            for (row, ts) in rows.iter_mut().zip(stamps) {
                row.insert(block, *boundary, *ts);
            }
        }
        Self { rows }
    }
}

/// Raw marker counts per column of a log-derived table
///
/// Log heuristics can silently pair the wrong lines; check the counts
/// before trusting the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkerCounts {
    counts: BTreeMap<String, BoundaryCounts>,
}

/// Number of start and end markers found for one block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryCounts {
    pub starts: usize,
    pub ends: usize,
}

impl MarkerCounts {
    pub fn from_columns(columns: &BTreeMap<BlockKey, Vec<Timestamp>>) -> Self {
        let mut counts: BTreeMap<String, BoundaryCounts> = BTreeMap::new();
        for ((block, boundary), stamps) in columns {
            let entry = counts.entry(block.clone()).or_default();
            match boundary {
                Boundary::Start => entry.starts = stamps.len(),
                Boundary::End => entry.ends = stamps.len(),
            }
        }
        Self { counts }
    }

    pub fn get(&self, block: &str) -> BoundaryCounts {
        self.counts.get(block).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, BoundaryCounts)> {
        self.counts.iter().map(|(name, c)| (name.as_str(), *c))
    }

    /// Every block has as many starts as ends
    pub fn is_balanced(&self) -> bool {
        self.counts.values().all(|c| c.starts == c.ends)
    }

    /// Fail unless every block has exactly `frames` starts and ends
    pub fn expect_frames(&self, frames: usize) -> Result<()> {
        for (block, c) in &self.counts {
            if c.starts != frames || c.ends != frames {
                return Err(BenchError::MarkerMismatch {
                    block: block.clone(),
                    starts: c.starts,
                    ends: c.ends,
                    expected: frames,
                });
            }
        }
        Ok(())
    }
}
