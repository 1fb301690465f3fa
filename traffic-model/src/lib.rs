//! Domain types for per-device traffic readings and the JSON records they are
//! persisted in.

pub mod domain;

pub use domain::{
    is_month_key, DailyEntry, DailyRecord, DailyTotals, DeviceIndex, DeviceReading, MonthlyRecord,
    Reading, ReadingTime, CATEGORY_FIELDS, UPTIME_FIELD,
};
