//! e7-tools fixed-width log reading
//!
//! e7 logs are a fixed-width table: a one character message type code, a
//! timestamp field and a free-text message. The message column is not
//! padded by the tool, so line lengths vary and a fixed-width reader
//! cannot find the column end. [`repair_log`] drops the header line and
//! right-pads every line to the longest one; [`parse_log`] then reads the
//! uniform file.

use crate::error::{BenchError, Result};
use crate::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Column positions (in characters) of the e7 log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogLayout {
    /// First character of the timestamp field
    pub timestamp_start: usize,
    /// One past the last character of the timestamp field
    pub timestamp_end: usize,
    /// First character of the message field
    pub message_start: usize,
    /// `strftime` format of the timestamp field
    pub timestamp_format: String,
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            timestamp_start: 2,
            timestamp_end: 25,
            message_start: 26,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        }
    }
}

impl LogLayout {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.timestamp_start < 1 {
            return Err("timestamp_start must leave room for the type code".to_string());
        }
        if self.timestamp_end <= self.timestamp_start {
            return Err(format!(
                "timestamp_end ({}) must be after timestamp_start ({})",
                self.timestamp_end, self.timestamp_start
            ));
        }
        if self.message_start < self.timestamp_end {
            return Err(format!(
                "message_start ({}) lies inside the timestamp field (ends at {})",
                self.message_start, self.timestamp_end
            ));
        }
        Ok(())
    }
}

/// One parsed log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub code: char,
    pub time: Timestamp,
    pub message: String,
}

/// What [`repair_log`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Repaired { lines: usize, width: usize },
    /// Output already existed and `force` was not set
    Skipped,
}

/// Path the repaired copy of `log` is written to
pub fn repaired_path(log: &Path) -> PathBuf {
    let mut name = log
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".repaired");
    log.with_file_name(name)
}

/// Pad lines (header dropped) to the longest line
pub fn repair_text(raw: &str) -> (String, usize) {
    let lines: Vec<&str> = raw.lines().skip(1).collect();
    let width = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);

    let mut repaired = String::with_capacity(lines.len() * (width + 1));
    for line in &lines {
        repaired.push_str(&format!("{line:<width$}"));
        repaired.push('\n');
    }
    (repaired, width)
}

/// Write a uniformly padded copy of `input` to `output`
///
/// Skipped when `output` exists unless `force` is set.
pub fn repair_log(input: &Path, output: &Path, force: bool) -> Result<RepairOutcome> {
    if output.exists() && !force {
        tracing::debug!("Repaired log {} exists, skipping", output.display());
        return Ok(RepairOutcome::Skipped);
    }

    let raw = read_lossy(input)?;
    let (repaired, width) = repair_text(&raw);
    let lines = repaired.lines().count();
    fs::write(output, repaired)?;

    tracing::debug!(
        "Repaired {} ({} lines padded to {} chars)",
        input.display(),
        lines,
        width
    );
    Ok(RepairOutcome::Repaired { lines, width })
}

/// Substring of `line` between two character positions
fn char_slice(line: &str, start: usize, end: Option<usize>) -> &str {
    let byte_at = |pos: usize| {
        line.char_indices()
            .nth(pos)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    };
    let from = byte_at(start);
    let to = end.map(byte_at).unwrap_or(line.len());
    if from >= to {
        ""
    } else {
        &line[from..to]
    }
}

fn parse_line(line: &str, layout: &LogLayout) -> Result<LogEntry> {
    let code = line.chars().next().unwrap_or(' ');
    let raw_time = char_slice(line, layout.timestamp_start, Some(layout.timestamp_end));
    let time = timestamp::parse_with_format(raw_time, &layout.timestamp_format)
        .or_else(|_| timestamp::parse_timestamp(raw_time))?;
    let message = char_slice(line, layout.message_start, None).trim().to_string();

    Ok(LogEntry {
        code,
        time,
        message,
    })
}

/// Parse a repaired (uniform width, header-free) log
pub fn parse_log(text: &str, layout: &LogLayout) -> Result<Vec<LogEntry>> {
    let mut uniform_width = None;
    let mut entries = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let width = line.chars().count();
        let expected = *uniform_width.get_or_insert(width);
        if width != expected {
            return Err(BenchError::RaggedLog {
                line: i + 1,
                expected,
                found: width,
            });
        }
        if line.trim().is_empty() {
            continue;
        }
        entries.push(parse_line(line, layout)?);
    }

    Ok(entries)
}

/// Log text with invalid UTF-8 replaced by U+FFFD
///
/// e7 messages may carry Windows-1252 bytes (`µ`, `°`); the phase markers are ASCII.
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a repaired log file
pub fn read_log(path: &Path, layout: &LogLayout) -> Result<Vec<LogEntry>> {
    let text = read_lossy(path)?;
    parse_log(&text, layout)
}

/// Repair `log` next to itself (unless already done or forced) and parse the repaired copy
pub fn load_log(log: &Path, layout: &LogLayout, force: bool) -> Result<Vec<LogEntry>> {
    let repaired = repaired_path(log);
    repair_log(log, &repaired, force)?;
    read_log(&repaired, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RAW: &str = "\
T Timestamp               Message
I 2024-03-01 10:00:00.000 axis table=4084
I 2024-03-01 10:00:05.250 start calculation of image 1
W 2024-03-01 10:01:00.000 finished calculation of image 1 (took 55s)
";

    #[test]
    fn test_repair_pads_to_longest_line_and_drops_header() {
        let (repaired, width) = repair_text(RAW);
        let lines: Vec<&str> = repaired.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert!(lines[0].starts_with("I 2024-03-01 10:00:00.000 axis table=4084 "));
        assert_eq!(width, RAW.lines().nth(3).unwrap().len());
    }

    #[test]
    fn test_parse_repaired_log() {
        let (repaired, _) = repair_text(RAW);
        let entries = parse_log(&repaired, &LogLayout::default()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].code, 'I');
        assert_eq!(entries[0].message, "axis table=4084");
        assert_eq!(entries[2].code, 'W');
        assert_eq!(entries[2].message, "finished calculation of image 1 (took 55s)");
        assert_eq!(
            entries[1].time,
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_milli_opt(10, 0, 5, 250)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_unrepaired_log() {
        let unrepaired: String = RAW.lines().skip(1).map(|l| format!("{l}\n")).collect();
        let err = parse_log(&unrepaired, &LogLayout::default()).unwrap_err();
        assert!(matches!(err, BenchError::RaggedLog { line: 2, .. }));
    }

    #[test]
    fn test_repair_log_is_skipped_when_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("recon.log");
        fs::write(&input, RAW).unwrap();
        let output = repaired_path(&input);

        let first = repair_log(&input, &output, false).unwrap();
        assert!(matches!(first, RepairOutcome::Repaired { lines: 3, .. }));
        let before = fs::read_to_string(&output).unwrap();

        assert_eq!(repair_log(&input, &output, false).unwrap(), RepairOutcome::Skipped);
        assert_eq!(fs::read_to_string(&output).unwrap(), before);

        assert!(matches!(
            repair_log(&input, &output, true).unwrap(),
            RepairOutcome::Repaired { .. }
        ));
        assert_eq!(fs::read_to_string(&output).unwrap(), before);
    }

    #[test]
    fn test_load_log_tolerates_non_utf8_message_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("recon.log");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"T Timestamp               Message\n");
        raw.extend_from_slice(b"I 2024-03-01 10:00:00.000 axis table=4084\n");
        raw.extend_from_slice(b"I 2024-03-01 10:00:01.000 dose 12 \xb5Sv\n");
        raw.extend_from_slice(b"I 2024-03-01 10:00:30.000 finished calculation of image 0\n");
        fs::write(&log, raw).unwrap();

        let entries = load_log(&log, &LogLayout::default(), false).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "axis table=4084");
        assert_eq!(entries[1].message, "dose 12 \u{FFFD}Sv");
        assert_eq!(entries[2].message, "finished calculation of image 0");
    }

    #[test]
    fn test_repaired_path_appends_suffix() {
        assert_eq!(
            repaired_path(Path::new("/runs/GPU/recon.log")),
            PathBuf::from("/runs/GPU/recon.log.repaired")
        );
    }

    #[test]
    fn test_layout_validation() {
        assert!(LogLayout::default().validate().is_ok());
        let overlapping = LogLayout {
            message_start: 10,
            ..LogLayout::default()
        };
        assert!(overlapping.validate().is_err());
    }
}
