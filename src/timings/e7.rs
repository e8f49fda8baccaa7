//! Timing tables from e7-tools log text
//!
//! e7-tools writes no structured timing data, so phase boundaries are
//! recovered from fixed message substrings. The reconstruction log has
//! unambiguous markers; the histogramming log needs a heuristic, kept
//! behind [`HistogramMarkerStrategy`] so it can be swapped once validated
//! against more logs.

use super::{BlockKey, Boundary, MarkerCounts, TimingTable};
use crate::e7_log::LogEntry;
use crate::recorder::FRAME_BLOCK;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a marker matches a trimmed log message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Prefix(&'static str),
    Contains(&'static str),
}

impl MatchRule {
    pub fn matches(&self, message: &str) -> bool {
        match self {
            MatchRule::Prefix(p) => message.starts_with(p),
            MatchRule::Contains(p) => message.contains(p),
        }
    }
}

/// A log message that marks a block boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMarker {
    pub block: &'static str,
    pub boundary: Boundary,
    pub rule: MatchRule,
}

/// Phase markers of the e7 reconstruction log
pub const RECON_MARKERS: &[PhaseMarker] = &[
    PhaseMarker {
        block: FRAME_BLOCK,
        boundary: Boundary::Start,
        rule: MatchRule::Prefix("axis table=4084"),
    },
    PhaseMarker {
        block: FRAME_BLOCK,
        boundary: Boundary::End,
        rule: MatchRule::Prefix("finished calculation of image"),
    },
    PhaseMarker {
        block: "scatter",
        boundary: Boundary::Start,
        rule: MatchRule::Contains("estimate scatter sinogram"),
    },
    PhaseMarker {
        block: "scatter",
        boundary: Boundary::End,
        rule: MatchRule::Contains("End Scatter Simulation Iteration 2"),
    },
    PhaseMarker {
        block: "recon",
        boundary: Boundary::Start,
        rule: MatchRule::Contains("start calculation of image"),
    },
    PhaseMarker {
        block: "recon",
        boundary: Boundary::End,
        rule: MatchRule::Prefix("finished calculation of image"),
    },
];

/// Timing table recovered from a log, with the raw marker counts behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E7Timings {
    pub table: TimingTable,
    pub counts: MarkerCounts,
}

impl E7Timings {
    fn from_columns(columns: BTreeMap<BlockKey, Vec<Timestamp>>, log: &str) -> Self {
        let counts = MarkerCounts::from_columns(&columns);
        if !counts.is_balanced() {
            for (block, c) in counts.iter().filter(|(_, c)| c.starts != c.ends) {
                tracing::warn!(
                    "{} log: block '{}' has {} start markers but {} end markers",
                    log,
                    block,
                    c.starts,
                    c.ends
                );
            }
        }
        Self {
            table: TimingTable::from_columns(&columns),
            counts,
        }
    }
}

/// Build the frame/scatter/recon table of an e7 reconstruction log
pub fn recon_timings(entries: &[LogEntry]) -> E7Timings {
    let mut columns: BTreeMap<BlockKey, Vec<Timestamp>> = RECON_MARKERS
        .iter()
        .map(|m| ((m.block.to_string(), m.boundary), Vec::new()))
        .collect();

    for entry in entries {
        for marker in RECON_MARKERS {
            if marker.rule.matches(&entry.message) {
                if let Some(stamps) = columns.get_mut(&(marker.block.to_string(), marker.boundary)) {
                    stamps.push(entry.time);
                }
            }
        }
    }

    E7Timings::from_columns(columns, "reconstruction")
}

/// Strategy that finds frame boundaries in the histogramming log
pub trait HistogramMarkerStrategy {
    fn start_markers(&self, entries: &[LogEntry]) -> Vec<Timestamp>;
    fn end_markers(&self, entries: &[LogEntry]) -> Vec<Timestamp>;
}

/// Empirical histogramming-log heuristic
///
/// The first `skip_lines` lines are setup output. Sinogram-number
/// messages come in pairs per frame, so only every `start_stride`-th one
/// starts a frame. The first `dropped_end_markers` frame-written messages
/// precede the first real frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinogramPairHeuristic {
    pub skip_lines: usize,
    pub start_stride: usize,
    pub dropped_end_markers: usize,
}

impl SinogramPairHeuristic {
    pub const START_PATTERN: &'static str = "Sinogram no =";
    pub const END_PATTERN: &'static str = "Frame_write: Just sent Frame";
}

impl Default for SinogramPairHeuristic {
    fn default() -> Self {
        Self {
            skip_lines: 600,
            start_stride: 2,
            dropped_end_markers: 1,
        }
    }
}

impl HistogramMarkerStrategy for SinogramPairHeuristic {
    fn start_markers(&self, entries: &[LogEntry]) -> Vec<Timestamp> {
        entries
            .iter()
            .skip(self.skip_lines)
            .filter(|e| e.message.contains(Self::START_PATTERN))
            .step_by(self.start_stride.max(1))
            .map(|e| e.time)
            .collect()
    }

    fn end_markers(&self, entries: &[LogEntry]) -> Vec<Timestamp> {
        entries
            .iter()
            .filter(|e| e.message.contains(Self::END_PATTERN))
            .skip(self.dropped_end_markers)
            .map(|e| e.time)
            .collect()
    }
}

/// Build the single-block (`"frame"`) table of an e7 histogramming log
pub fn histogram_timings(
    entries: &[LogEntry],
    strategy: &dyn HistogramMarkerStrategy,
) -> E7Timings {
    let mut columns = BTreeMap::new();
    columns.insert(
        (FRAME_BLOCK.to_string(), Boundary::Start),
        strategy.start_markers(entries),
    );
    columns.insert(
        (FRAME_BLOCK.to_string(), Boundary::End),
        strategy.end_markers(entries),
    );
    E7Timings::from_columns(columns, "histogramming")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn entry(second: i64, message: &str) -> LogEntry {
        let base = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        LogEntry {
            code: 'I',
            time: base + TimeDelta::seconds(second),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_recon_markers() {
        let entries = vec![
            entry(0, "axis table=4084 planes"),
            entry(2, "estimate scatter sinogram"),
            entry(20, "End Scatter Simulation Iteration 1"),
            entry(30, "End Scatter Simulation Iteration 2"),
            entry(31, "start calculation of image 0"),
            entry(60, "finished calculation of image 0"),
            entry(61, "axis table=4084 planes"),
            entry(62, "estimate scatter sinogram"),
            entry(80, "End Scatter Simulation Iteration 2"),
            entry(81, "start calculation of image 1"),
            entry(99, "finished calculation of image 1"),
            // prefix rule: not a frame start
            entry(100, "using axis table=4084"),
        ];
        let timings = recon_timings(&entries);
        assert!(timings.counts.is_balanced());
        timings.counts.expect_frames(2).unwrap();

        let table = &timings.table;
        assert_eq!(table.len(), 2);
        let row = table.row(0).unwrap();
        assert_eq!(row.span("frame"), Some(TimeDelta::seconds(60)));
        assert_eq!(row.span("scatter"), Some(TimeDelta::seconds(28)));
        assert_eq!(row.span("recon"), Some(TimeDelta::seconds(29)));
        assert_eq!(table.row(1).unwrap().span("frame"), Some(TimeDelta::seconds(38)));
    }

    #[test]
    fn test_sinogram_pair_heuristic() {
        let mut entries: Vec<LogEntry> = (0..600)
            .map(|i| entry(0, if i % 7 == 0 { "Sinogram no = 0" } else { "setup" }))
            .collect();
        entries.push(entry(1, "Frame_write: Just sent Frame 0"));
        entries.push(entry(10, "Sinogram no = 1"));
        entries.push(entry(11, "Sinogram no = 1"));
        entries.push(entry(40, "Frame_write: Just sent Frame 1"));
        entries.push(entry(41, "Sinogram no = 2"));
        entries.push(entry(42, "Sinogram no = 2"));
        entries.push(entry(70, "Frame_write: Just sent Frame 2"));

        let strategy = SinogramPairHeuristic::default();
        let timings = histogram_timings(&entries, &strategy);
        timings.counts.expect_frames(2).unwrap();

        let row = timings.table.row(0).unwrap();
        assert_eq!(row.span("frame"), Some(TimeDelta::seconds(30)));
        let row = timings.table.row(1).unwrap();
        assert_eq!(row.span("frame"), Some(TimeDelta::seconds(29)));
    }

    #[test]
    fn test_unbalanced_markers_are_reported_not_fatal() {
        let entries = vec![
            entry(0, "axis table=4084"),
            entry(5, "axis table=4084"),
            entry(9, "finished calculation of image 0"),
        ];
        let timings = recon_timings(&entries);
        assert!(!timings.counts.is_balanced());
        assert_eq!(timings.table.len(), 2);
        assert!(timings.counts.expect_frames(2).is_err());
    }
}
