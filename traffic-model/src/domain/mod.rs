pub mod daily;
pub mod reading;
pub mod records;

pub use daily::{DailyEntry, DailyTotals};
pub use reading::{is_month_key, DeviceReading, Reading, ReadingTime, CATEGORY_FIELDS, UPTIME_FIELD};
pub use records::{DailyRecord, DeviceIndex, MonthlyRecord};
