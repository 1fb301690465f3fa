use std::collections::BTreeMap;

use serde_json::{Number, Value};
use traffic_model::{DailyEntry, DailyTotals, Reading, CATEGORY_FIELDS};

/// Running sum that stays integral until a fractional value shows up.
#[derive(Clone, Copy)]
enum Sum {
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, value: &Value) -> Self {
        match (self, value.as_i64()) {
            (Self::Int(acc), Some(v)) => match acc.checked_add(v) {
                Some(total) => Self::Int(total),
                None => Self::Float(acc as f64 + v as f64),
            },
            _ => Self::Float(self.as_f64() + value.as_f64().unwrap_or_default()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    fn into_number(self) -> Option<Number> {
        match self {
            Self::Int(v) => Some(Number::from(v)),
            Self::Float(v) => Number::from_f64(v),
        }
    }
}

#[derive(Default)]
struct DayAccumulator {
    hours: u32,
    counts: BTreeMap<&'static str, Sum>,
    uptime_sum: f64,
    uptime_n: u32,
}

impl DayAccumulator {
    fn add(&mut self, reading: &Reading) {
        self.hours += 1;

        for &field in CATEGORY_FIELDS {
            let Some(value) = reading.fields.get(field).filter(|v| v.is_number()) else {
                continue;
            };
            let sum = self.counts.entry(field).or_insert(Sum::Int(0));
            *sum = sum.add(value);
        }

        if let Some(u) = reading.uptime() {
            self.uptime_sum += u;
            self.uptime_n += 1;
        }
    }

    fn finish(self) -> DailyTotals {
        DailyTotals {
            hours: self.hours,
            counts: self
                .counts
                .into_iter()
                .filter_map(|(field, sum)| Some((field.to_string(), sum.into_number()?)))
                .collect(),
            uptime_avg: (self.uptime_n > 0).then(|| self.uptime_sum / f64::from(self.uptime_n)),
        }
    }
}

/// Fold readings into one [`DailyEntry`] per UTC calendar day, ascending by date.
///
/// Category fields no reading of a day defines are left out of that day's
/// totals. Readings without a timestamp are ignored.
pub fn aggregate_daily(points: &[Reading]) -> Vec<DailyEntry> {
    let mut days: BTreeMap<String, DayAccumulator> = BTreeMap::new();

    for reading in points {
        let Some(time) = reading.time() else {
            continue;
        };
        days.entry(time.day()).or_default().add(reading);
    }

    days.into_iter()
        .map(|(date, acc)| DailyEntry {
            date,
            totals: acc.finish(),
        })
        .collect()
}
