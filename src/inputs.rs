//! Locating and loading the files of a finished run
//!
//! A NiftyPET or SIRF-STIR run directory holds `resources.csv` (container
//! stats) and `metadata.json` (recorder output). An e7-tools results
//! directory holds one sub-directory per hardware variant, each with a
//! resource CSV and a log for the histogramming and the reconstruction
//! pass.

use crate::config::E7Config;
use crate::e7_log;
use crate::error::BenchError;
use crate::recorder::{MetadataFile, METADATA_FILE};
use crate::resources::{e7_csv, generic, ResourceTable};
use crate::timings::{self, E7Timings, MarkerCounts, TimingTable};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Container stats file inside a run directory
pub const RESOURCES_FILE: &str = "resources.csv";

/// The single file in `dir` whose name ends with `suffix`
pub fn find_file_with_suffix(dir: &Path, suffix: &str) -> crate::error::Result<PathBuf> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if is_match && path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(BenchError::MissingInput {
            suffix: suffix.to_string(),
            dir: dir.to_path_buf(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(BenchError::AmbiguousInput {
            suffix: suffix.to_string(),
            dir: dir.to_path_buf(),
        }),
    }
}

/// Resources, recorder output and the timing table derived from it
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub resources: ResourceTable,
    pub metadata: MetadataFile,
    pub timings: TimingTable,
}

/// Load `resources.csv` and `metadata.json` of a NiftyPET / SIRF-STIR run
pub fn load_resources_and_timings(dir: &Path) -> Result<RecordedRun> {
    let resources_path = dir.join(RESOURCES_FILE);
    let resources = generic::load(&resources_path).with_context(|| {
        format!("Failed to load resources: {}", resources_path.display())
    })?;

    let metadata_path = dir.join(METADATA_FILE);
    let metadata = MetadataFile::from_file(&metadata_path).with_context(|| {
        format!("Failed to load run metadata: {}", metadata_path.display())
    })?;
    let timings = timings::from_metadata_file(&metadata);

    tracing::debug!(
        "Loaded {} resource samples and {} frames from {}",
        resources.len(),
        timings.len(),
        dir.display()
    );

    Ok(RecordedRun {
        resources,
        metadata,
        timings,
    })
}

/// Both passes of an e7-tools run
#[derive(Debug, Clone)]
pub struct E7Run {
    pub histo_resources: ResourceTable,
    pub histo_timings: TimingTable,
    pub histo_counts: MarkerCounts,
    pub recon_resources: ResourceTable,
    pub recon_timings: TimingTable,
    pub recon_counts: MarkerCounts,
}

fn load_e7_resources(dir: &Path, suffix: &str) -> Result<ResourceTable> {
    let path = find_file_with_suffix(dir, suffix)?;
    e7_csv::load(&path).with_context(|| format!("Failed to load resources: {}", path.display()))
}

fn load_e7_log(dir: &Path, suffix: &str, config: &E7Config) -> Result<Vec<e7_log::LogEntry>> {
    let path = find_file_with_suffix(dir, suffix)?;
    e7_log::load_log(&path, &config.layout, false)
        .with_context(|| format!("Failed to read e7 log: {}", path.display()))
}

/// Load the histogramming and reconstruction files of an e7-tools run
///
/// Logs are repaired next to themselves first unless a repaired copy exists.
pub fn load_e7_resources_and_timings(dir: &Path, gpu: bool, config: &E7Config) -> Result<E7Run> {
    let run_dir = dir.join(config.run_subdir(gpu));
    if !run_dir.is_dir() {
        anyhow::bail!("No e7 results directory at {}", run_dir.display());
    }

    let histo_resources = load_e7_resources(&run_dir, &config.histo_resources_suffix)?;
    let recon_resources = load_e7_resources(&run_dir, &config.recon_resources_suffix)?;

    let histo_entries = load_e7_log(&run_dir, &config.histo_log_suffix, config)?;
    let recon_entries = load_e7_log(&run_dir, &config.recon_log_suffix, config)?;

    let E7Timings {
        table: histo_timings,
        counts: histo_counts,
    } = timings::histogram_timings(&histo_entries, &config.heuristic);
    let E7Timings {
        table: recon_timings,
        counts: recon_counts,
    } = timings::recon_timings(&recon_entries);

    Ok(E7Run {
        histo_resources,
        histo_timings,
        histo_counts,
        recon_resources,
        recon_timings,
        recon_counts,
    })
}
