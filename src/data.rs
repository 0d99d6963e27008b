//! Cell values and the parsing helpers shared by ingestion, editing and retyping.
//!
//! [`Value`] is the widest, storage-independent view of a single cell. Every
//! column can hand out its cells as `Option<Value>`, and [`Value::as_display`]
//! is the canonical string form used when two cells are compared for edits.

use std::fmt;

use anyhow::{Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Largest magnitude at which an integral float is still printed without a
/// fractional part.
const INTEGRAL_DISPLAY_LIMIT: f64 = 1e15;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
        }
    }

    /// Numeric view used by summaries; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// True for values that compare as missing: NaN floats and empty strings.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Float(f) => f.is_nan(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < INTEGRAL_DISPLAY_LIMIT {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Tries each chrono format in order and keeps the first match.
fn first_match<T>(
    value: &str,
    formats: &[&str],
    kind: &str,
    parse: impl Fn(&str, &str) -> chrono::ParseResult<T>,
) -> Result<T> {
    formats
        .iter()
        .find_map(|format| parse(value, format).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as {kind}"))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    first_match(value, DATE_FORMATS, "date", NaiveDate::parse_from_str)
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    first_match(value, DATETIME_FORMATS, "datetime", NaiveDateTime::parse_from_str)
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    first_match(value, TIME_FORMATS, "time", NaiveTime::parse_from_str)
}

/// Accepts either a full datetime or a bare date (read as midnight).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(parsed) = parse_naive_datetime(trimmed) {
        return Ok(parsed);
    }
    let date = parse_naive_date(trimmed)?;
    Ok(date.and_time(NaiveTime::MIN))
}

pub fn parse_boolean(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => bail!("Failed to parse '{value}' as boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_first_dates_are_tried_before_month_first() {
        let may_sixth = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("06/05/2024").unwrap(), may_sixth);
        assert_eq!(parse_naive_date("2024/05/06").unwrap(), may_sixth);
        let thirteenth = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();
        assert_eq!(parse_naive_date("05/13/2024").unwrap(), thirteenth);
        assert!(parse_naive_time("25:00").is_err());
    }

    #[test]
    fn parse_timestamp_reads_dates_as_midnight() {
        let parsed = parse_timestamp("2024-05-06").unwrap();
        assert_eq!(
            Value::DateTime(parsed).as_display(),
            "2024-05-06 00:00:00"
        );
        assert!(parse_timestamp("not a date").is_err());
    }

    #[test]
    fn parse_boolean_accepts_common_tokens() {
        assert!(parse_boolean("Yes").unwrap());
        assert!(!parse_boolean("0").unwrap());
        assert!(parse_boolean("maybe").is_err());
    }

    #[test]
    fn integral_floats_display_without_fraction() {
        assert_eq!(Value::Float(1500.0).as_display(), "1500");
        assert_eq!(Value::Float(2.5).as_display(), "2.5");
        assert_eq!(Value::Float(1e20).as_display(), "100000000000000000000");
        assert_eq!(Value::Integer(1500).as_display(), "1500");
    }

    #[test]
    fn nan_and_empty_strings_count_as_missing() {
        assert!(Value::Float(f64::NAN).is_missing());
        assert!(Value::String(String::new()).is_missing());
        assert!(!Value::Integer(0).is_missing());
    }
}
