//! Benchmark configuration
//!
//! Every setting is explicit and defaulted, so an empty TOML file is a
//! valid configuration.
//!
//! ```toml
//! input_dir = "input"
//! output_dir = "output"
//! identifier = "3f9c2e1"
//!
//! [reconstruction]
//! time_start = 0
//! time_end = 3600
//! time_step = 600
//!
//! [e7.heuristic]
//! skip_lines = 600
//! ```

use crate::driver::ReconstructionParams;
use crate::e7_log::LogLayout;
use crate::timings::SinogramPairHeuristic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Directory holding the scanner input files
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Parent of the per-run result directories
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Build identifier (usually a short commit hash) embedded in run directory names
    #[serde(default)]
    pub identifier: String,

    #[serde(default)]
    pub reconstruction: ReconstructionParams,

    #[serde(default)]
    pub e7: E7Config,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            identifier: String::new(),
            reconstruction: ReconstructionParams::default(),
            e7: E7Config::default(),
        }
    }
}

/// Where e7-tools puts its outputs and how to read them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct E7Config {
    #[serde(default)]
    pub layout: LogLayout,

    #[serde(default)]
    pub heuristic: SinogramPairHeuristic,

    #[serde(default = "default_histo_resources_suffix")]
    pub histo_resources_suffix: String,

    #[serde(default = "default_recon_resources_suffix")]
    pub recon_resources_suffix: String,

    #[serde(default = "default_histo_log_suffix")]
    pub histo_log_suffix: String,

    #[serde(default = "default_recon_log_suffix")]
    pub recon_log_suffix: String,

    #[serde(default = "default_gpu_subdir")]
    pub gpu_subdir: String,

    #[serde(default = "default_cpu_subdir")]
    pub cpu_subdir: String,
}

fn default_histo_resources_suffix() -> String {
    "_histo.csv".to_string()
}

fn default_recon_resources_suffix() -> String {
    "_recon.csv".to_string()
}

fn default_histo_log_suffix() -> String {
    "_histo.log".to_string()
}

fn default_recon_log_suffix() -> String {
    "_recon.log".to_string()
}

fn default_gpu_subdir() -> String {
    "GPU".to_string()
}

fn default_cpu_subdir() -> String {
    "CPU".to_string()
}

impl Default for E7Config {
    fn default() -> Self {
        Self {
            layout: LogLayout::default(),
            heuristic: SinogramPairHeuristic::default(),
            histo_resources_suffix: default_histo_resources_suffix(),
            recon_resources_suffix: default_recon_resources_suffix(),
            histo_log_suffix: default_histo_log_suffix(),
            recon_log_suffix: default_recon_log_suffix(),
            gpu_subdir: default_gpu_subdir(),
            cpu_subdir: default_cpu_subdir(),
        }
    }
}

impl E7Config {
    /// Sub-directory of an e7 results directory for one hardware variant
    pub fn run_subdir(&self, gpu: bool) -> &str {
        if gpu {
            &self.gpu_subdir
        } else {
            &self.cpu_subdir
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        let config: BenchConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", path.as_ref().display())
        })?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        let params = &self.reconstruction;
        if params.time_step == 0 {
            return Err("time_step must be > 0".to_string());
        }
        if params.time_end < params.time_start {
            return Err(format!(
                "time_end ({}) must not precede time_start ({})",
                params.time_end, params.time_start
            ));
        }
        if self.e7.heuristic.start_stride == 0 {
            return Err("e7.heuristic.start_stride must be > 0".to_string());
        }
        self.e7.layout.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.e7.run_subdir(true), "GPU");
        assert_eq!(config.e7.run_subdir(false), "CPU");
        assert_eq!(config.e7.heuristic.skip_lines, 600);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: BenchConfig = toml::from_str("").unwrap();
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn test_from_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"
identifier = "3f9c2e1"
output_dir = "/data/results"

[reconstruction]
time_end = 1800
time_step = 300
num_subsets = 14
num_subiterations = 7

[e7]
gpu_subdir = "gpu-run"

[e7.heuristic]
skip_lines = 10

[e7.layout]
timestamp_format = "%d.%m.%Y %H:%M:%S%.3f"
"#
        )?;

        let config = BenchConfig::from_toml(file.path())?;
        assert_eq!(config.identifier, "3f9c2e1");
        assert_eq!(config.output_dir, PathBuf::from("/data/results"));
        assert_eq!(config.reconstruction.intervals().len(), 6);
        assert_eq!(config.reconstruction.num_subsets, 14);
        assert_eq!(config.reconstruction.span, 11);
        assert_eq!(config.e7.gpu_subdir, "gpu-run");
        assert_eq!(config.e7.cpu_subdir, "CPU");
        assert_eq!(config.e7.heuristic.skip_lines, 10);
        assert_eq!(config.e7.heuristic.start_stride, 2);
        assert_eq!(config.e7.layout.timestamp_start, 2);
        assert_eq!(config.e7.layout.timestamp_format, "%d.%m.%Y %H:%M:%S%.3f");
        Ok(())
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = BenchConfig::from_toml("/nonexistent/petbench.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/petbench.toml"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BenchConfig::default();
        config.reconstruction.time_step = 0;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.reconstruction.time_start = 100;
        config.reconstruction.time_end = 50;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.e7.heuristic.start_stride = 0;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.e7.layout.message_start = 10;
        assert!(config.validate().unwrap_err().contains("message_start"));
    }
}
