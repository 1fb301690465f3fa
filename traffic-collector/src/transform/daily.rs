use std::collections::BTreeMap;

use traffic_model::DailyEntry;

/// Combine stored daily entries with freshly computed ones.
///
/// Keyed by date; an incoming entry replaces the stored entry for that day
/// outright, totals are never added together. Result is ascending by date.
pub fn merge_daily(existing: &[DailyEntry], incoming: &[DailyEntry]) -> Vec<DailyEntry> {
    let mut by_date: BTreeMap<&str, &DailyEntry> = BTreeMap::new();
    for entry in existing.iter().chain(incoming) {
        by_date.insert(entry.date.as_str(), entry);
    }
    by_date.into_values().cloned().collect()
}
