use std::collections::BTreeMap;

use traffic_model::Reading;

/// Readings split by UTC calendar month (`YYYY-MM`), order within a month
/// preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthGroups {
    pub months: BTreeMap<String, Vec<Reading>>,
    /// Readings without a timestamp.
    pub skipped: usize,
    /// Readings whose timestamp yields no calendar month.
    pub unplaced: usize,
}

pub fn group_by_month<'a, I>(readings: I) -> MonthGroups
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut groups = MonthGroups::default();
    for reading in readings {
        let Some(time) = reading.time() else {
            groups.skipped += 1;
            continue;
        };
        match time.month() {
            Some(month) => groups.months.entry(month).or_default().push(reading.clone()),
            None => groups.unplaced += 1,
        }
    }
    groups
}
