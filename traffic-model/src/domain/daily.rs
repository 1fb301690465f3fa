use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Counters for one calendar day.
///
/// `counts` only holds category fields that at least one contributing reading
/// defined; a category nobody reported is absent rather than zero. Sums of
/// integer counts stay integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub hours: u32,
    #[serde(flatten)]
    pub counts: BTreeMap<String, Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_avg: Option<f64>,
}

impl DailyTotals {
    pub fn count(&self, field: &str) -> Option<f64> {
        self.counts.get(field).and_then(Number::as_f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    pub totals: DailyTotals,
}
