//! Pure transforms over in-memory readings. None of these can fail.

pub mod aggregate;
pub mod daily;
pub mod merge;
pub mod months;

pub use aggregate::aggregate_daily;
pub use daily::merge_daily;
pub use merge::{merge_readings, MergeOutcome};
pub use months::{group_by_month, MonthGroups};
