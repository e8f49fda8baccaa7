//! Error taxonomy for the timing harness
//!
//! Protocol violations (driver bugs), format violations (input contract
//! broken) and missing/duplicate inputs are all fatal. Heuristic log
//! ambiguity is only an error when a caller asks for validation through
//! [`crate::timings::MarkerCounts::expect_frames`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the recorder, normalizers, timing builders and frame extraction
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Block '{0}' was not started")]
    BlockNotStarted(String),

    #[error("Block '{0}' was already started in this frame; use a per-iteration name such as '{0}_itr<N>'")]
    BlockReopened(String),

    #[error("Block '{0}' was already ended in this frame")]
    BlockAlreadyClosed(String),

    #[error("Block '{0}' is still open at the end of the frame")]
    BlockLeftOpen(String),

    #[error("Block '{0}' started before its enclosing frame")]
    BlockOutsideFrame(String),

    #[error("No frame is open")]
    NoFrameOpen,

    #[error("Run was never started")]
    RunNotStarted,

    #[error("Run was never ended")]
    RunNotFinished,

    #[error("Run ended before it started ({seconds}s)")]
    InvalidRunBounds { seconds: i64 },

    #[error("Frame index {index} out of range (table has {frames} frames)")]
    FrameIndexOutOfRange { index: usize, frames: usize },

    #[error("Frame {frame} has no ('{block}', '{boundary}') timestamp")]
    MissingBoundary {
        frame: usize,
        block: String,
        boundary: &'static str,
    },

    #[error("Unrecognized unit in {column} value '{value}' (expected {expected})")]
    UnknownUnit {
        column: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Invalid number in {column}: '{value}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("Log line {line} has length {found}, expected {expected}; repair the log first")]
    RaggedLog {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Missing '{suffix}' file in {}", dir.display())]
    MissingInput { suffix: String, dir: PathBuf },

    #[error("Multiple '{suffix}' files in {}. Ambiguous input.", dir.display())]
    AmbiguousInput { suffix: String, dir: PathBuf },

    #[error("Marker count mismatch for {block}: {starts} starts, {ends} ends, expected {expected}")]
    MarkerMismatch {
        block: String,
        starts: usize,
        ends: usize,
        expected: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    /// Whether the error indicates a bug in the calling driver rather than bad data
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            BenchError::BlockNotStarted(_)
                | BenchError::BlockReopened(_)
                | BenchError::BlockAlreadyClosed(_)
                | BenchError::BlockLeftOpen(_)
                | BenchError::BlockOutsideFrame(_)
                | BenchError::NoFrameOpen
                | BenchError::RunNotStarted
                | BenchError::RunNotFinished
                | BenchError::FrameIndexOutOfRange { .. }
                | BenchError::MissingBoundary { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        assert!(BenchError::BlockNotStarted("recon".into()).is_protocol_violation());
        assert!(BenchError::FrameIndexOutOfRange { index: 3, frames: 2 }.is_protocol_violation());
        assert!(!BenchError::InvalidTimestamp("x".into()).is_protocol_violation());
    }

    #[test]
    fn test_missing_input_message_names_suffix_and_dir() {
        let err = BenchError::MissingInput {
            suffix: ".l.hdr".into(),
            dir: PathBuf::from("/data/input"),
        };
        let msg = err.to_string();
        assert!(msg.contains(".l.hdr"));
        assert!(msg.contains("/data/input"));
    }
}
