//! Timestamp parsing shared by records, resource tables and logs
//!
//! All timestamps are naive UTC. The recorder writes fractional epoch
//! seconds; resource CSVs and hand-edited records may carry ISO 8601.

use crate::error::{BenchError, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta};

/// Point in time used throughout the harness
pub type Timestamp = NaiveDateTime;

const TEXT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Convert fractional epoch seconds to a timestamp (microsecond resolution)
pub fn from_epoch_seconds(seconds: f64) -> Option<Timestamp> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Convert a timestamp to fractional epoch seconds
pub fn to_epoch_seconds(ts: &Timestamp) -> f64 {
    ts.and_utc().timestamp_micros() as f64 / 1_000_000.0
}

/// Parse a timestamp given as epoch seconds, RFC 3339 or a plain ISO 8601 date-time
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    let text = raw.trim();

    if let Ok(seconds) = text.parse::<f64>() {
        return from_epoch_seconds(seconds)
            .ok_or_else(|| BenchError::InvalidTimestamp(raw.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }

    TEXT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| BenchError::InvalidTimestamp(raw.to_string()))
}

/// Parse a timestamp with one explicit `strftime` format
pub fn parse_with_format(raw: &str, format: &str) -> Result<Timestamp> {
    NaiveDateTime::parse_from_str(raw.trim(), format)
        .map_err(|_| BenchError::InvalidTimestamp(raw.to_string()))
}

/// Whole seconds elapsed from `origin` to `ts`, truncated toward zero
pub fn whole_seconds_since(origin: &Timestamp, ts: &Timestamp) -> i64 {
    (*ts - *origin).num_seconds()
}

/// Duration as fractional seconds
pub fn delta_seconds(delta: TimeDelta) -> f64 {
    delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0
}

/// Serde adapter: writes fractional epoch seconds, reads epoch seconds or ISO 8601 text
pub mod epoch_seconds {
    use super::{from_epoch_seconds, parse_timestamp, to_epoch_seconds, Timestamp};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_epoch_seconds(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(seconds) => from_epoch_seconds(seconds)
                .ok_or_else(|| de::Error::custom(format!("epoch seconds out of range: {seconds}"))),
            Raw::Text(text) => parse_timestamp(&text).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_epoch_seconds() {
        let ts = parse_timestamp("1709294400.5").unwrap();
        assert_eq!(ts, at(12, 0, 0) + TimeDelta::milliseconds(500));
    }

    #[test]
    fn test_parse_iso_variants() {
        assert_eq!(parse_timestamp("2024-03-01 12:00:00").unwrap(), at(12, 0, 0));
        assert_eq!(parse_timestamp("2024-03-01T12:00:00").unwrap(), at(12, 0, 0));
        assert_eq!(
            parse_timestamp("2024-03-01T13:00:00+01:00").unwrap(),
            at(12, 0, 0)
        );
        assert_eq!(
            parse_timestamp(" 2024-03-01 12:00:00.250 ").unwrap(),
            at(12, 0, 0) + TimeDelta::milliseconds(250)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(BenchError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_epoch_round_trip_keeps_micros() {
        let ts = at(8, 30, 15) + TimeDelta::microseconds(123_456);
        assert_eq!(from_epoch_seconds(to_epoch_seconds(&ts)), Some(ts));
    }

    #[test]
    fn test_whole_seconds_truncates() {
        let start = at(10, 0, 0);
        let sample = start + TimeDelta::milliseconds(65_700);
        assert_eq!(whole_seconds_since(&start, &sample), 65);
    }
}
