//! Metadata and timing recorder for reconstruction runs
//!
//! A driver creates one [`Recorder`] per run, calls [`Recorder::start`],
//! wraps every frame in [`Recorder::start_frame`] / [`Recorder::end_frame`],
//! times phases inside a frame with [`Recorder::start_block`] /
//! [`Recorder::end_block`], and finally calls [`Recorder::end`] and
//! [`Recorder::save`]. Saving consumes the recorder, so a run is persisted
//! exactly once.
//!
//! # Example
//!
//! ```
//! use petbench::recorder::Recorder;
//!
//! let mut meta = Recorder::new("a1b2c3d");
//! meta.start();
//! let subsets = meta.add_metadatum("num_subsets", 21);
//! assert_eq!(subsets, 21);
//!
//! meta.start_frame().unwrap();
//! meta.start_block("recon").unwrap();
//! meta.end_block("recon").unwrap();
//! meta.end_frame().unwrap();
//! meta.end();
//!
//! let record = meta.finish().unwrap();
//! assert_eq!(record.frames.len(), 1);
//! assert!(record.frames[0].blocks.contains_key("recon"));
//! ```

use crate::error::{BenchError, Result};
use crate::timestamp::{self, Timestamp};
use chrono::{SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the block that bounds every frame
pub const FRAME_BLOCK: &str = "frame";

/// File name of the persisted record inside a run directory
pub const METADATA_FILE: &str = "metadata.json";

/// Source of wall-clock time for the recorder
pub trait Clock {
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Wall-clock time in UTC, truncated to the microseconds `metadata.json` keeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().naive_utc().trunc_subsecs(6)
    }
}

/// Clock that only moves when told to (replays and tests)
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        self.now.set(self.now.get() + delta);
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.advance(TimeDelta::seconds(seconds));
    }

    pub fn set(&self, ts: Timestamp) {
        self.now.set(ts);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Start and end of one timed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    #[serde(with = "timestamp::epoch_seconds")]
    pub start: Timestamp,
    #[serde(with = "timestamp::epoch_seconds")]
    pub end: Timestamp,
}

impl BlockSpan {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Completed timings of one frame, keyed by block name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameTiming {
    pub blocks: BTreeMap<String, BlockSpan>,
}

impl FrameTiming {
    /// Outer span of the frame
    pub fn frame_span(&self) -> Option<&BlockSpan> {
        self.blocks.get(FRAME_BLOCK)
    }
}

/// Per-frame state of a block name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    NotStarted,
    Open { start: Timestamp },
    Closed(BlockSpan),
}

/// Process-lifetime recorder of run boundaries, metadata and per-frame block timings
#[derive(Debug)]
pub struct Recorder<C: Clock = SystemClock> {
    clock: C,
    identifier: String,
    metadata: BTreeMap<String, String>,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    current: BTreeMap<String, BlockState>,
    frames: Vec<FrameTiming>,
}

impl Recorder<SystemClock> {
    /// Create a recorder driven by the system clock
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_clock(identifier, SystemClock)
    }
}

impl<C: Clock> Recorder<C> {
    /// Create a recorder with an explicit clock
    pub fn with_clock(identifier: impl Into<String>, clock: C) -> Self {
        let identifier = identifier.into();
        let mut recorder = Self {
            clock,
            identifier: identifier.clone(),
            metadata: BTreeMap::new(),
            start_time: None,
            end_time: None,
            current: BTreeMap::new(),
            frames: Vec::new(),
        };
        recorder.add_metadatum("identifier", identifier);
        recorder
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Set the overall run start to now
    pub fn start(&mut self) {
        self.start_time = Some(self.clock.now());
    }

    /// Set the overall run end to now
    pub fn end(&mut self) {
        self.end_time = Some(self.clock.now());
    }

    /// Store `value` as a string under `key` and hand the value back
    pub fn add_metadatum<T: Display>(&mut self, key: &str, value: T) -> T {
        self.metadata.insert(key.to_string(), value.to_string());
        value
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// State of `name` within the in-progress frame
    pub fn block_state(&self, name: &str) -> BlockState {
        self.current
            .get(name)
            .copied()
            .unwrap_or(BlockState::NotStarted)
    }

    /// Open a block in the in-progress frame
    pub fn start_block(&mut self, name: &str) -> Result<()> {
        match self.block_state(name) {
            BlockState::NotStarted => {
                let start = self.clock.now();
                self.current
                    .insert(name.to_string(), BlockState::Open { start });
                Ok(())
            }
            BlockState::Open { .. } | BlockState::Closed(_) => {
                Err(BenchError::BlockReopened(name.to_string()))
            }
        }
    }

    /// Close a block opened in the in-progress frame
    pub fn end_block(&mut self, name: &str) -> Result<()> {
        match self.block_state(name) {
            BlockState::NotStarted => Err(BenchError::BlockNotStarted(name.to_string())),
            BlockState::Open { start } => {
                let end = self.clock.now();
                self.current
                    .insert(name.to_string(), BlockState::Closed(BlockSpan { start, end }));
                Ok(())
            }
            BlockState::Closed(_) => Err(BenchError::BlockAlreadyClosed(name.to_string())),
        }
    }

    pub fn start_frame(&mut self) -> Result<()> {
        self.start_block(FRAME_BLOCK)
    }

    /// Close the frame, move its blocks into the completed frames and reset block state
    ///
    /// Returns the elapsed frame duration.
    pub fn end_frame(&mut self) -> Result<TimeDelta> {
        let frame_start = match self.block_state(FRAME_BLOCK) {
            BlockState::Open { start } => start,
            _ => return Err(BenchError::NoFrameOpen),
        };

        for (name, state) in &self.current {
            match state {
                BlockState::Open { .. } if name != FRAME_BLOCK => {
                    return Err(BenchError::BlockLeftOpen(name.clone()));
                }
                BlockState::Closed(span) if span.start < frame_start => {
                    return Err(BenchError::BlockOutsideFrame(name.clone()));
                }
                _ => {}
            }
        }

        self.end_block(FRAME_BLOCK)?;

        let blocks = std::mem::take(&mut self.current)
            .into_iter()
            .filter_map(|(name, state)| match state {
                BlockState::Closed(span) => Some((name, span)),
                _ => None,
            })
            .collect::<BTreeMap<_, _>>();

        let elapsed = blocks
            .get(FRAME_BLOCK)
            .map(BlockSpan::duration)
            .unwrap_or(TimeDelta::zero());
        self.frames.push(FrameTiming { blocks });

        tracing::info!(
            "Finished frame nr {}. Took {:.3} seconds.",
            self.frames.len(),
            timestamp::delta_seconds(elapsed)
        );

        Ok(elapsed)
    }

    /// Frames completed so far
    pub fn frames(&self) -> &[FrameTiming] {
        &self.frames
    }

    /// Wall-clock duration of the whole run
    pub fn total_duration(&self) -> Result<TimeDelta> {
        run_duration(self.start_time, self.end_time)
    }

    /// Freeze the recorder into its immutable record
    pub fn finish(self) -> Result<TimingRecord> {
        for (name, state) in &self.current {
            match state {
                BlockState::Open { .. } => return Err(BenchError::BlockLeftOpen(name.clone())),
                BlockState::Closed(_) => {
                    return Err(BenchError::BlockOutsideFrame(name.clone()));
                }
                BlockState::NotStarted => {}
            }
        }
        run_duration(self.start_time, self.end_time)?;

        Ok(TimingRecord {
            identifier: self.identifier,
            metadata: self.metadata,
            start_time: self.start_time.ok_or(BenchError::RunNotStarted)?,
            end_time: self.end_time.ok_or(BenchError::RunNotFinished)?,
            frames: self.frames,
        })
    }

    /// Freeze the recorder and write `metadata.json` into `outdir`
    ///
    /// The caller owns directory uniqueness; concurrent runs must not share `outdir`.
    pub fn save(self, outdir: &Path) -> Result<TimingRecord> {
        let record = self.finish()?;
        record.save(outdir)?;
        Ok(record)
    }
}

fn run_duration(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<TimeDelta> {
    let start = start.ok_or(BenchError::RunNotStarted)?;
    let end = end.ok_or(BenchError::RunNotFinished)?;
    let duration = end - start;
    if duration < TimeDelta::zero() {
        return Err(BenchError::InvalidRunBounds {
            seconds: duration.num_seconds(),
        });
    }
    Ok(duration)
}

/// Immutable record of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub identifier: String,
    pub metadata: BTreeMap<String, String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub frames: Vec<FrameTiming>,
}

impl TimingRecord {
    pub fn total_duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    /// Whole seconds of the run (not the sum of frame durations)
    pub fn total_seconds(&self) -> i64 {
        self.total_duration().num_seconds()
    }

    pub fn to_file(&self) -> MetadataFile {
        MetadataFile {
            metadata: self.metadata.clone(),
            total_seconds: self.total_seconds(),
            timings: self.frames.clone(),
        }
    }

    /// Write `metadata.json` into `outdir`, returning the written path
    pub fn save(&self, outdir: &Path) -> Result<PathBuf> {
        let path = outdir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(&self.to_file())?;
        fs::write(&path, json)?;
        tracing::debug!("Wrote run record to {}", path.display());
        Ok(path)
    }
}

/// On-disk shape of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub metadata: BTreeMap<String, String>,
    pub total_seconds: i64,
    pub timings: Vec<FrameTiming>,
}

impl MetadataFile {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
