use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    Date, OffsetDateTime, UtcOffset,
};

/// Counter fields summed into daily totals.
///
/// Each mode is reported as a total and optionally split by direction
/// (`_lft` / `_rgt`).
pub const CATEGORY_FIELDS: &[&str] = &[
    "car",
    "car_lft",
    "car_rgt",
    "bike",
    "bike_lft",
    "bike_rgt",
    "pedestrian",
    "pedestrian_lft",
    "pedestrian_rgt",
    "heavy",
    "heavy_lft",
    "heavy_rgt",
    "night",
    "night_lft",
    "night_rgt",
];

pub const UPTIME_FIELD: &str = "uptime";

/// One hourly observation from a traffic sensor.
///
/// `date` is the observation timestamp as delivered upstream (ISO-8601 UTC,
/// e.g. `2024-06-01T13:00:00.000Z`). Every other field, `uptime` included, is
/// carried verbatim in `fields`, so upstream attributes survive a
/// load/merge/save cycle even when nothing here interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Reading {
    pub fn at(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, field: &str, value: f64) -> Self {
        self.set_count(field, value);
        self
    }

    pub fn with_uptime(self, uptime: f64) -> Self {
        self.with_count(UPTIME_FIELD, uptime)
    }

    /// The raw timestamp, if present and non-blank. This string is the
    /// deduplication and ordering key.
    pub fn timestamp(&self) -> Option<&str> {
        self.date.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// The timestamp interpreted for calendar bucketing.
    pub fn time(&self) -> Option<ReadingTime> {
        self.timestamp().map(ReadingTime::parse)
    }

    /// Numeric value of `field`, or `None` if absent or not a number.
    pub fn count(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn uptime(&self) -> Option<f64> {
        self.count(UPTIME_FIELD)
    }

    pub fn set_count(&mut self, field: &str, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.fields.insert(field.to_string(), value);
    }
}

/// A reading timestamp resolved to a calendar position.
///
/// RFC 3339 and other ISO-8601 forms (basic `20240601T130000Z` included) are
/// parsed and normalised to UTC. Anything else keeps its raw text and is
/// bucketed by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingTime {
    Instant(OffsetDateTime),
    Raw(String),
}

impl ReadingTime {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        OffsetDateTime::parse(trimmed, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT))
            .map(|ts| Self::Instant(ts.to_offset(UtcOffset::UTC)))
            .unwrap_or_else(|_| Self::Raw(trimmed.to_string()))
    }

    /// UTC calendar day as `YYYY-MM-DD`.
    ///
    /// Unparsed timestamps fall back to their first ten characters.
    pub fn day(&self) -> String {
        match self {
            Self::Instant(ts) => format_date(ts.date()),
            Self::Raw(s) => prefix(s, 10).to_string(),
        }
    }

    /// UTC calendar month as `YYYY-MM`, if one can be derived.
    pub fn month(&self) -> Option<String> {
        match self {
            Self::Instant(ts) => Some(format!("{:04}-{:02}", ts.year(), u8::from(ts.month()))),
            Self::Raw(s) => {
                let m = prefix(s, 7);
                is_month_key(m).then(|| m.to_string())
            }
        }
    }
}

/// A reading tagged with the device it was collected from.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReading {
    pub device_id: String,
    pub reading: Reading,
}

/// Whether `s` is a `YYYY-MM` month key with month 01-12.
pub fn is_month_key(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 7 || b[4] != b'-' {
        return false;
    }
    if !b[..4].iter().chain(&b[5..]).all(u8::is_ascii_digit) {
        return false;
    }
    matches!(s[5..].parse::<u8>(), Ok(1..=12))
}

fn format_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
