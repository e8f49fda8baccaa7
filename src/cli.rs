//! CLI argument parsing for petbench

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "petbench")]
#[command(version)]
#[command(about = "Timing and resource analysis for PET reconstruction benchmarks", long_about = None)]
pub struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output (to stderr)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stage breakdown of a NiftyPET or SIRF-STIR run directory
    Breakdown {
        run_dir: PathBuf,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Stage breakdown of an e7-tools results directory
    E7Breakdown {
        run_dir: PathBuf,

        /// Read the GPU run instead of the CPU run
        #[arg(long)]
        gpu: bool,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Resources and timings of one frame, in seconds since the frame started
    Frame {
        run_dir: PathBuf,

        /// Zero-based frame index
        #[arg(long, value_name = "N")]
        frame: usize,

        /// Treat RUN_DIR as an e7-tools results directory (reconstruction pass)
        #[arg(long)]
        e7: bool,

        #[arg(long, requires = "e7")]
        gpu: bool,

        /// Slice the e7 histogramming pass instead of the reconstruction pass
        #[arg(long, requires = "e7")]
        histo: bool,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Mean and spread of every block's duration across frames
    Summary {
        run_dir: PathBuf,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Pad an e7 log to uniform line width (header dropped)
    RepairLog {
        input: PathBuf,
        output: PathBuf,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Start/end marker counts of an e7-tools run, to validate the log heuristics
    Markers {
        run_dir: PathBuf,

        #[arg(long)]
        gpu: bool,

        /// Fail unless every block has exactly N starts and ends
        #[arg(long, value_name = "N")]
        expect_frames: Option<usize>,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Per-frame memory averages and growth rate of an e7-tools reconstruction
    Trend {
        run_dir: PathBuf,

        #[arg(long)]
        gpu: bool,

        /// Block whose start opens each frame's sampling window
        #[arg(long, default_value = "scatter")]
        from_block: String,

        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
