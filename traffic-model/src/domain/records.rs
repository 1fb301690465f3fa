use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{DailyEntry, Reading};

/// All readings of one device for one calendar month, as stored in
/// `<device>/<YYYY-MM>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    pub device_id: String,
    pub month: String,
    #[serde(rename = "lastUpdated", with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub data: Vec<Reading>,
}

impl MonthlyRecord {
    pub fn new(device_id: &str, month: &str, data: Vec<Reading>) -> Self {
        Self {
            device_id: device_id.to_string(),
            month: month.to_string(),
            last_updated: OffsetDateTime::now_utc(),
            data,
        }
    }
}

/// Daily aggregates of one device for one calendar month, as stored in
/// `<device>/daily/<YYYY-MM>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub device_id: String,
    pub month: String,
    #[serde(rename = "lastUpdated", with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub days: Vec<DailyEntry>,
}

impl DailyRecord {
    pub fn new(device_id: &str, month: &str, days: Vec<DailyEntry>) -> Self {
        Self {
            device_id: device_id.to_string(),
            month: month.to_string(),
            last_updated: OffsetDateTime::now_utc(),
            days,
        }
    }
}

/// Device-level metadata kept in `<device>/index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIndex {
    pub device_id: String,
    /// Months with stored data, sorted and unique.
    pub months: Vec<String>,
    #[serde(rename = "lastUpdated", with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl DeviceIndex {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            months: Vec::new(),
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    /// Adds `month` keeping the list sorted. Returns `false` if it was already listed.
    pub fn insert_month(&mut self, month: &str) -> bool {
        match self.months.binary_search_by(|m| m.as_str().cmp(month)) {
            Ok(_) => false,
            Err(pos) => {
                self.months.insert(pos, month.to_string());
                true
            }
        }
    }
}
