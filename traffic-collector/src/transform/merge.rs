use std::collections::BTreeMap;

use traffic_model::Reading;

/// Result of folding two reading sets together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Unique by timestamp, ascending by timestamp string.
    pub readings: Vec<Reading>,
    /// Readings dropped because they carried no timestamp.
    pub skipped: usize,
}

/// Merge `incoming` into `existing`, deduplicating by timestamp.
///
/// The key is the timestamp exactly as delivered: two spellings of the same
/// instant are distinct readings. Readings are applied in order, `existing`
/// first, so for a shared timestamp the last incoming reading replaces the
/// whole stored one. Readings without a timestamp are dropped and counted in
/// [`MergeOutcome::skipped`].
pub fn merge_readings(existing: &[Reading], incoming: &[Reading]) -> MergeOutcome {
    let mut by_key: BTreeMap<&str, &Reading> = BTreeMap::new();
    let mut skipped = 0;

    for reading in existing.iter().chain(incoming) {
        match reading.timestamp() {
            Some(key) => {
                by_key.insert(key, reading);
            }
            None => skipped += 1,
        }
    }

    MergeOutcome {
        readings: by_key.into_values().cloned().collect(),
        skipped,
    }
}
