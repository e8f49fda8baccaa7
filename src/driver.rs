//! Frame loop shared by the toolbox drivers
//!
//! The toolbox call itself is opaque; a driver only decides the frame
//! intervals, records the reconstruction parameters, and wraps every
//! frame in the recorder protocol.

use crate::config::BenchConfig;
use crate::recorder::{Clock, Recorder, TimingRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Reconstruction toolbox under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Toolbox {
    #[serde(rename = "niftypet")]
    NiftyPet,
    SirfStir,
    E7Tools,
}

impl Toolbox {
    pub fn name(&self) -> &'static str {
        match self {
            Toolbox::NiftyPet => "NiftyPET",
            Toolbox::SirfStir => "SIRF-STIR",
            Toolbox::E7Tools => "e7-tools",
        }
    }

    /// Whether the toolbox reconstructs on the GPU
    pub fn supports_gpu(&self) -> bool {
        match self {
            Toolbox::NiftyPet | Toolbox::E7Tools => true,
            Toolbox::SirfStir => false,
        }
    }
}

impl fmt::Display for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Acquisition time window of one frame, in seconds from scan start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInterval {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

/// Back-to-back frames of `step` seconds; a trailing partial frame is dropped
pub fn frame_intervals(start: u64, end: u64, step: u64) -> Vec<FrameInterval> {
    if step == 0 || end <= start {
        return Vec::new();
    }
    (0..(end - start) / step)
        .map(|n| FrameInterval {
            index: n as usize,
            start: start + n * step,
            end: start + (n + 1) * step,
        })
        .collect()
}

/// Parameters every toolbox run records next to its timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionParams {
    #[serde(default)]
    pub time_start: u64,
    #[serde(default = "default_time_end")]
    pub time_end: u64,
    #[serde(default = "default_time_step")]
    pub time_step: u64,
    #[serde(default = "default_num_subsets")]
    pub num_subsets: u32,
    #[serde(default = "default_num_subiterations")]
    pub num_subiterations: u32,
    /// Pre-smoothing / resolution model FWHM in mm
    #[serde(default = "default_psf_fwhm")]
    pub psf_fwhm: f64,
    #[serde(default = "default_span")]
    pub span: u32,
    #[serde(default = "default_max_ring_diff")]
    pub max_ring_diff: u32,
    #[serde(default = "default_view_mash_factor")]
    pub view_mash_factor: u32,
    #[serde(default = "default_image_size")]
    pub image_x_size: u32,
    #[serde(default = "default_image_size")]
    pub image_y_size: u32,
    #[serde(default = "default_num_iterations_scatter")]
    pub num_iterations_scatter: u32,
    #[serde(default = "default_num_subsets")]
    pub num_subsets_scatter: u32,
}

fn default_time_end() -> u64 {
    3600
}

fn default_time_step() -> u64 {
    60
}

// mMR gaps make multiples of 9 unbalanced
fn default_num_subsets() -> u32 {
    21
}

fn default_num_subiterations() -> u32 {
    60
}

fn default_psf_fwhm() -> f64 {
    4.0
}

fn default_span() -> u32 {
    11
}

fn default_max_ring_diff() -> u32 {
    60
}

fn default_view_mash_factor() -> u32 {
    1
}

fn default_image_size() -> u32 {
    344
}

fn default_num_iterations_scatter() -> u32 {
    3
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            time_start: 0,
            time_end: default_time_end(),
            time_step: default_time_step(),
            num_subsets: default_num_subsets(),
            num_subiterations: default_num_subiterations(),
            psf_fwhm: default_psf_fwhm(),
            span: default_span(),
            max_ring_diff: default_max_ring_diff(),
            view_mash_factor: default_view_mash_factor(),
            image_x_size: default_image_size(),
            image_y_size: default_image_size(),
            num_iterations_scatter: default_num_iterations_scatter(),
            num_subsets_scatter: default_num_subsets(),
        }
    }
}

impl ReconstructionParams {
    pub fn intervals(&self) -> Vec<FrameInterval> {
        frame_intervals(self.time_start, self.time_end, self.time_step)
    }

    /// Store every parameter as run metadata
    pub fn record<C: Clock>(&self, meta: &mut Recorder<C>) {
        meta.add_metadatum("time_start", self.time_start);
        meta.add_metadatum("time_end", self.time_end);
        meta.add_metadatum("time_step", self.time_step);
        meta.add_metadatum("num_subsets", self.num_subsets);
        meta.add_metadatum("num_subiterations", self.num_subiterations);
        meta.add_metadatum("psf_fwhm", self.psf_fwhm);
        meta.add_metadatum("span", self.span);
        meta.add_metadatum("max_ring_diff", self.max_ring_diff);
        meta.add_metadatum("view_mash_factor", self.view_mash_factor);
        meta.add_metadatum("image_x_size", self.image_x_size);
        meta.add_metadatum("image_y_size", self.image_y_size);
        meta.add_metadatum("num_iterations_scatter", self.num_iterations_scatter);
        meta.add_metadatum("num_subsets_scatter", self.num_subsets_scatter);
    }
}

/// One toolbox, reconstructing one frame at a time
///
/// Implementations open and close their own blocks (`histograming`,
/// `scatter_itr<N>`, `recon`, ...) on the recorder they are handed. The
/// frame block itself is managed by [`run_reconstruction`].
pub trait FrameReconstructor {
    fn toolbox(&self) -> Toolbox;

    /// Work done once before the first frame (attenuation maps, templates)
    fn prepare(&mut self, _params: &ReconstructionParams) -> Result<()> {
        Ok(())
    }

    fn reconstruct_frame<C: Clock>(
        &mut self,
        interval: &FrameInterval,
        params: &ReconstructionParams,
        meta: &mut Recorder<C>,
    ) -> Result<()>;
}

/// Where a finished run was saved
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub record: TimingRecord,
}

/// `<output_dir>/<%Y-%m-%d-%H-%M>_<identifier>`
pub fn run_dir_name<C: Clock>(output_dir: &Path, identifier: &str, clock: &C) -> PathBuf {
    let stamp = clock.now().format("%Y-%m-%d-%H-%M");
    output_dir.join(format!("{stamp}_{identifier}"))
}

/// Run every frame of `config` through `reconstructor` and persist the timings
pub fn run_reconstruction<R: FrameReconstructor, C: Clock>(
    config: &BenchConfig,
    reconstructor: &mut R,
    clock: C,
) -> Result<RunOutcome> {
    let params = &config.reconstruction;
    let run_dir = run_dir_name(&config.output_dir, &config.identifier, &clock);
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;
    fs::create_dir(&run_dir)
        .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

    let toolbox = reconstructor.toolbox();
    tracing::info!("Reconstructing with {} into {}", toolbox, run_dir.display());

    let mut meta = Recorder::with_clock(config.identifier.clone(), clock);
    meta.start();
    meta.add_metadatum("toolbox", toolbox);
    meta.add_metadatum("gpu", toolbox.supports_gpu());
    params.record(&mut meta);

    reconstructor
        .prepare(params)
        .with_context(|| format!("{toolbox} setup failed"))?;

    for interval in params.intervals() {
        meta.start_frame()?;
        reconstructor
            .reconstruct_frame(&interval, params, &mut meta)
            .with_context(|| {
                format!(
                    "{} failed on frame {} ({}s to {}s)",
                    toolbox, interval.index, interval.start, interval.end
                )
            })?;
        meta.end_frame()?;
    }

    meta.end();
    let record = meta
        .save(&run_dir)
        .with_context(|| format!("Failed to save run record in {}", run_dir.display()))?;
    tracing::info!("Processing took {} seconds", record.total_seconds());

    Ok(RunOutcome { run_dir, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{ManualClock, MetadataFile, METADATA_FILE};
    use chrono::NaiveDate;

    struct FakeToolbox<'c> {
        clock: &'c ManualClock,
        frames_seen: Vec<FrameInterval>,
        fail_on: Option<usize>,
    }

    impl<'c> FakeToolbox<'c> {
        fn new(clock: &'c ManualClock) -> Self {
            Self {
                clock,
                frames_seen: Vec::new(),
                fail_on: None,
            }
        }
    }

    impl FrameReconstructor for FakeToolbox<'_> {
        fn toolbox(&self) -> Toolbox {
            Toolbox::SirfStir
        }

        fn prepare(&mut self, _params: &ReconstructionParams) -> Result<()> {
            self.clock.advance_secs(7);
            Ok(())
        }

        fn reconstruct_frame<C: Clock>(
            &mut self,
            interval: &FrameInterval,
            _params: &ReconstructionParams,
            meta: &mut Recorder<C>,
        ) -> Result<()> {
            if self.fail_on == Some(interval.index) {
                anyhow::bail!("listmode file truncated");
            }
            self.frames_seen.push(*interval);
            meta.start_block("histograming")?;
            self.clock.advance_secs(10);
            meta.end_block("histograming")?;
            meta.start_block("recon")?;
            self.clock.advance_secs(30);
            meta.end_block("recon")?;
            Ok(())
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn config(output_dir: &Path) -> BenchConfig {
        let mut config = BenchConfig {
            output_dir: output_dir.to_path_buf(),
            identifier: "abc1234".to_string(),
            ..BenchConfig::default()
        };
        config.reconstruction.time_start = 0;
        config.reconstruction.time_end = 600;
        config.reconstruction.time_step = 300;
        config
    }

    #[test]
    fn test_frame_intervals() {
        let intervals = frame_intervals(0, 3600, 600);
        assert_eq!(intervals.len(), 6);
        assert_eq!(intervals[5].start, 3000);
        assert_eq!(intervals[5].end, 3600);
    }

    #[test]
    fn test_frame_intervals_drop_partial_frame() {
        let intervals = frame_intervals(100, 350, 100);
        assert_eq!(
            intervals,
            vec![
                FrameInterval { index: 0, start: 100, end: 200 },
                FrameInterval { index: 1, start: 200, end: 300 },
            ]
        );
        assert!(frame_intervals(0, 10, 0).is_empty());
        assert!(frame_intervals(10, 0, 5).is_empty());
    }

    #[test]
    fn test_params_are_recorded_as_metadata() {
        let mut meta = Recorder::with_clock("x", clock());
        ReconstructionParams::default().record(&mut meta);
        let md = meta.metadata();
        assert_eq!(md["num_subsets"], "21");
        assert_eq!(md["num_subiterations"], "60");
        assert_eq!(md["span"], "11");
        assert_eq!(md["image_x_size"], "344");
        assert_eq!(md["psf_fwhm"], "4");
    }

    #[test]
    fn test_run_reconstruction_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let mut toolbox = FakeToolbox::new(&c);

        let outcome = run_reconstruction(&config(tmp.path()), &mut toolbox, &c).unwrap();

        assert_eq!(outcome.run_dir, tmp.path().join("2024-03-01-09-00_abc1234"));
        assert_eq!(toolbox.frames_seen.len(), 2);
        assert_eq!(toolbox.frames_seen[1].start, 300);

        // total spans the setup too, so it exceeds the sum of frame durations
        assert_eq!(outcome.record.total_seconds(), 87);
        let frame_secs: i64 = outcome
            .record
            .frames
            .iter()
            .map(|f| f.frame_span().unwrap().duration().num_seconds())
            .sum();
        assert_eq!(frame_secs, 80);

        let file = MetadataFile::from_file(&outcome.run_dir.join(METADATA_FILE)).unwrap();
        assert_eq!(file.total_seconds, 87);
        assert_eq!(file.metadata["identifier"], "abc1234");
        assert_eq!(file.metadata["toolbox"], "SIRF-STIR");
        assert_eq!(file.metadata["gpu"], "false");
        assert_eq!(file.timings.len(), 2);
        assert_eq!(
            file.timings[0].blocks["recon"].duration().num_seconds(),
            30
        );
    }

    #[test]
    fn test_run_directory_is_never_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let cfg = config(tmp.path());
        run_reconstruction(&cfg, &mut FakeToolbox::new(&c), &c).unwrap();

        c.set(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 30)
                .unwrap(),
        );
        let err = run_reconstruction(&cfg, &mut FakeToolbox::new(&c), &c).unwrap_err();
        assert!(err.to_string().contains("Failed to create run directory"));
    }

    #[test]
    fn test_toolbox_failure_names_the_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let mut toolbox = FakeToolbox::new(&c);
        toolbox.fail_on = Some(1);

        let err = run_reconstruction(&config(tmp.path()), &mut toolbox, &c).unwrap_err();
        assert!(err.to_string().contains("frame 1"));
        assert!(!tmp
            .path()
            .join("2024-03-01-09-00_abc1234")
            .join(METADATA_FILE)
            .exists());
    }
}
