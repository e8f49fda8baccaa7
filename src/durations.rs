//! Stage breakdown of a run's wall-clock time
//!
//! Attributes the run duration to pipeline stages (histogramming,
//! scatter estimation, reconstruction) so toolboxes with very different
//! internal structure can be compared on the same axes. Whatever no block
//! covers is reported as unassigned.

use crate::recorder::{FrameTiming, FRAME_BLOCK};
use crate::resources::ResourceTable;
use crate::timestamp::delta_seconds;
use crate::timings::TimingTable;
use chrono::TimeDelta;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

fn itr_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([a-zA-Z]+)(?:_itr\d+)?$").ok())
        .as_ref()
}

/// Display label of a block: `scatter_itr3` groups under `scatter`
///
/// Names that do not follow the `<letters>[_itr<N>]` convention are their own label.
pub fn block_label(block_name: &str) -> &str {
    itr_pattern()
        .and_then(|re| re.captures(block_name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(block_name)
}

/// Pipeline stage a block belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Histogramming,
    Scatter,
    Reconstruction,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Histogramming, Stage::Scatter, Stage::Reconstruction];

    /// Stage of a block name, `None` for the frame block and unrecognized blocks
    pub fn classify(block_name: &str) -> Option<Stage> {
        if block_name == FRAME_BLOCK {
            return None;
        }
        match block_label(block_name) {
            "histograming" | "histogramming" | "randoms" => Some(Stage::Histogramming),
            label if label.starts_with("scatter") => Some(Stage::Scatter),
            label if label.starts_with("recon") => Some(Stage::Reconstruction),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Histogramming => "histogramming",
            Stage::Scatter => "scatter",
            Stage::Reconstruction => "reconstruction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Time spent per stage relative to the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBreakdown {
    pub total: TimeDelta,
    pub stages: BTreeMap<Stage, TimeDelta>,
}

/// One line of a breakdown report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageShare {
    pub stage: String,
    pub seconds: f64,
    pub percent: f64,
}

impl StageBreakdown {
    fn empty(total: TimeDelta) -> Self {
        Self {
            total,
            stages: Stage::ALL.iter().map(|s| (*s, TimeDelta::zero())).collect(),
        }
    }

    fn add(&mut self, stage: Stage, delta: TimeDelta) {
        *self.stages.entry(stage).or_insert(TimeDelta::zero()) += delta;
    }

    pub fn stage(&self, stage: Stage) -> TimeDelta {
        self.stages.get(&stage).copied().unwrap_or(TimeDelta::zero())
    }

    /// Run time covered by no stage
    pub fn unassigned(&self) -> TimeDelta {
        self.stages
            .values()
            .fold(self.total, |remaining, d| remaining - *d)
    }

    /// Share of the total in percent (0 for an empty run)
    pub fn percent(&self, delta: TimeDelta) -> f64 {
        let total = delta_seconds(self.total);
        if total == 0.0 {
            return 0.0;
        }
        delta_seconds(delta) * 100.0 / total
    }

    /// Report lines: every stage, then unassigned
    pub fn shares(&self) -> Vec<StageShare> {
        let mut shares: Vec<StageShare> = Stage::ALL
            .iter()
            .map(|stage| StageShare {
                stage: stage.name().to_string(),
                seconds: delta_seconds(self.stage(*stage)),
                percent: self.percent(self.stage(*stage)),
            })
            .collect();
        shares.push(StageShare {
            stage: "unassigned".to_string(),
            seconds: delta_seconds(self.unassigned()),
            percent: self.percent(self.unassigned()),
        });
        shares
    }
}

fn add_table(breakdown: &mut StageBreakdown, timings: &TimingTable) {
    for row in timings.rows() {
        for block in row.block_names() {
            if let (Some(stage), Some(span)) = (Stage::classify(block), row.span(block)) {
                breakdown.add(stage, span);
            }
        }
    }
}

/// Breakdown of a NiftyPET / SIRF-STIR run
///
/// The total is the span of the resource samples, so time outside any frame counts as unassigned.
pub fn stage_breakdown(resources: &ResourceTable, timings: &TimingTable) -> StageBreakdown {
    let mut breakdown = StageBreakdown::empty(resources.span());
    add_table(&mut breakdown, timings);
    breakdown
}

/// Breakdown of an e7-tools run made of a histogramming and a reconstruction pass
pub fn e7_stage_breakdown(
    histo_resources: &ResourceTable,
    histo_timings: &TimingTable,
    recon_resources: &ResourceTable,
    recon_timings: &TimingTable,
) -> StageBreakdown {
    let mut breakdown = StageBreakdown::empty(histo_resources.span() + recon_resources.span());
    for row in histo_timings.rows() {
        if let Some(span) = row.span(FRAME_BLOCK) {
            breakdown.add(Stage::Histogramming, span);
        }
    }
    add_table(&mut breakdown, recon_timings);
    breakdown
}

/// Mean and spread of one block's duration across frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockSummary {
    pub frames: usize,
    pub mean_secs: f64,
    pub std_dev_secs: f64,
}

/// Per-block mean and population standard deviation of durations in seconds
pub fn block_summaries(frames: &[FrameTiming]) -> BTreeMap<String, BlockSummary> {
    let mut durations: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for frame in frames {
        for (name, span) in &frame.blocks {
            durations
                .entry(name.as_str())
                .or_default()
                .push(delta_seconds(span.duration()));
        }
    }

    durations
        .into_iter()
        .map(|(name, values)| {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (
                name.to_string(),
                BlockSummary {
                    frames: values.len(),
                    mean_secs: mean,
                    std_dev_secs: variance.sqrt(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::BlockSpan;
    use crate::resources::ResourceSample;
    use crate::timestamp::Timestamp;
    use crate::timings::{Boundary, TimingRow};
    use chrono::NaiveDate;

    fn at(s: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + TimeDelta::seconds(s)
    }

    fn span_row(blocks: &[(&str, i64, i64)]) -> TimingRow {
        let mut row = TimingRow::default();
        for (name, start, end) in blocks {
            row.insert(name, Boundary::Start, at(*start));
            row.insert(name, Boundary::End, at(*end));
        }
        row
    }

    #[test]
    fn test_block_label() {
        assert_eq!(block_label("scatter_itr0"), "scatter");
        assert_eq!(block_label("recon_itr12"), "recon");
        assert_eq!(block_label("histograming"), "histograming");
        assert_eq!(block_label("odd_name_2"), "odd_name_2");
    }

    #[test]
    fn test_stage_classification() {
        assert_eq!(Stage::classify("frame"), None);
        assert_eq!(Stage::classify("randoms"), Some(Stage::Histogramming));
        assert_eq!(Stage::classify("histograming"), Some(Stage::Histogramming));
        assert_eq!(Stage::classify("scatter_itr4"), Some(Stage::Scatter));
        assert_eq!(Stage::classify("recon"), Some(Stage::Reconstruction));
        assert_eq!(Stage::classify("mumap"), None);
    }

    #[test]
    fn test_stage_breakdown() {
        let resources = ResourceTable::new(vec![
            ResourceSample::new(at(0), 1.0, 1.0),
            ResourceSample::new(at(200), 1.0, 1.0),
        ]);
        let timings = TimingTable::new(vec![
            span_row(&[
                ("frame", 0, 100),
                ("histograming", 0, 10),
                ("randoms", 10, 15),
                ("scatter_itr0", 15, 25),
                ("scatter_itr1", 25, 35),
                ("recon", 35, 95),
            ]),
            span_row(&[("frame", 100, 200), ("histograming", 100, 110), ("recon", 110, 190)]),
        ]);

        let breakdown = stage_breakdown(&resources, &timings);
        assert_eq!(breakdown.total, TimeDelta::seconds(200));
        assert_eq!(breakdown.stage(Stage::Histogramming), TimeDelta::seconds(25));
        assert_eq!(breakdown.stage(Stage::Scatter), TimeDelta::seconds(20));
        assert_eq!(breakdown.stage(Stage::Reconstruction), TimeDelta::seconds(140));
        assert_eq!(breakdown.unassigned(), TimeDelta::seconds(15));
        assert_eq!(breakdown.percent(breakdown.stage(Stage::Scatter)), 10.0);

        let shares = breakdown.shares();
        assert_eq!(shares.len(), 4);
        assert_eq!(shares[3].stage, "unassigned");
        assert_eq!(shares[3].percent, 7.5);
    }

    #[test]
    fn test_e7_stage_breakdown() {
        let histo_res = ResourceTable::new(vec![
            ResourceSample::new(at(0), 1.0, 1.0),
            ResourceSample::new(at(100), 1.0, 1.0),
        ]);
        let recon_res = ResourceTable::new(vec![
            ResourceSample::new(at(500), 1.0, 1.0),
            ResourceSample::new(at(800), 1.0, 1.0),
        ]);
        let histo = TimingTable::new(vec![span_row(&[("frame", 5, 45)]), span_row(&[("frame", 50, 90)])]);
        let recon = TimingTable::new(vec![span_row(&[
            ("frame", 500, 780),
            ("scatter", 510, 600),
            ("recon", 600, 780),
        ])]);

        let breakdown = e7_stage_breakdown(&histo_res, &histo, &recon_res, &recon);
        assert_eq!(breakdown.total, TimeDelta::seconds(400));
        assert_eq!(breakdown.stage(Stage::Histogramming), TimeDelta::seconds(80));
        assert_eq!(breakdown.stage(Stage::Scatter), TimeDelta::seconds(90));
        assert_eq!(breakdown.stage(Stage::Reconstruction), TimeDelta::seconds(180));
        assert_eq!(breakdown.unassigned(), TimeDelta::seconds(50));
    }

    #[test]
    fn test_block_summaries() {
        let frame = |recon_secs: i64| FrameTiming {
            blocks: [(
                "recon".to_string(),
                BlockSpan {
                    start: at(0),
                    end: at(recon_secs),
                },
            )]
            .into_iter()
            .collect(),
        };
        let summaries = block_summaries(&[frame(10), frame(20), frame(30)]);
        let recon = summaries["recon"];
        assert_eq!(recon.frames, 3);
        assert_eq!(recon.mean_secs, 20.0);
        assert!((recon.std_dev_secs - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run_has_zero_percentages() {
        let breakdown = stage_breakdown(&ResourceTable::default(), &TimingTable::default());
        assert!(breakdown.shares().iter().all(|s| s.percent == 0.0));
    }
}
