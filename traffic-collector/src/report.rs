//! Per-run bookkeeping for a collection run.
//!
//! A [`Reporter`] is created for each run and handed to the components doing
//! the work; the resulting [`RunReport`] is what the caller inspects to decide
//! on an exit status and which files changed.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthFailure {
    pub month: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceReport {
    pub received: usize,
    /// Readings without a timestamp.
    pub skipped: usize,
    /// Readings whose timestamp could not be placed in a month.
    pub unplaced: usize,
    /// Stored reading count per month after this run's saves.
    pub months: BTreeMap<String, usize>,
    pub failures: Vec<MonthFailure>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub devices: BTreeMap<String, DeviceReport>,
    /// Every file successfully written during the run, in write order.
    pub written: Vec<PathBuf>,
    /// Upstream items that could not be turned into readings.
    pub source_errors: Vec<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.devices.values().any(|d| !d.failures.is_empty())
    }

    pub fn failed_devices(&self) -> Vec<&str> {
        self.devices
            .iter()
            .filter(|(_, d)| !d.failures.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn total_skipped(&self) -> usize {
        self.devices.values().map(|d| d.skipped).sum()
    }

    pub fn total_unplaced(&self) -> usize {
        self.devices.values().map(|d| d.unplaced).sum()
    }
}

/// Cloneable handle onto one run's [`RunReport`].
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    inner: Arc<Mutex<RunReport>>,
}

impl Reporter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunReport {
                run_id: run_id.into(),
                ..RunReport::default()
            })),
        }
    }

    /// A run id derived from the current UTC time, e.g. `20240601T120000Z`.
    pub fn timestamped() -> Self {
        let now = time::OffsetDateTime::now_utc();
        Self::new(format!(
            "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
            now.year(),
            u8::from(now.month()),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        ))
    }

    pub fn run_id(&self) -> String {
        self.lock().run_id.clone()
    }

    pub fn received(&self, device_id: &str, n: usize) {
        self.device(device_id, |d| d.received += n);
    }

    pub fn skipped(&self, device_id: &str, n: usize) {
        if n > 0 {
            self.device(device_id, |d| d.skipped += n);
        }
    }

    pub fn unplaced(&self, device_id: &str, n: usize) {
        if n > 0 {
            self.device(device_id, |d| d.unplaced += n);
        }
    }

    pub fn month_saved(&self, device_id: &str, month: &str, count: usize) {
        self.device(device_id, |d| {
            d.months.insert(month.to_string(), count);
        });
    }

    pub fn failed(&self, device_id: &str, month: Option<&str>, message: impl Into<String>) {
        let failure = MonthFailure {
            month: month.map(str::to_string),
            message: message.into(),
        };
        self.device(device_id, |d| d.failures.push(failure));
    }

    pub fn source_error(&self, message: impl Into<String>) {
        self.lock().source_errors.push(message.into());
    }

    pub fn written(&self, path: PathBuf) {
        self.lock().written.push(path);
    }

    pub fn snapshot(&self) -> RunReport {
        self.lock().clone()
    }

    fn device(&self, device_id: &str, f: impl FnOnce(&mut DeviceReport)) {
        let mut report = self.lock();
        f(report.devices.entry(device_id.to_string()).or_default());
    }

    fn lock(&self) -> MutexGuard<'_, RunReport> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
