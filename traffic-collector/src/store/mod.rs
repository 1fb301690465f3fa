//! JSON file persistence for monthly readings and daily aggregates.
//!
//! Layout under the store root:
//!
//! ```text
//! <device>/<YYYY-MM>.json        MonthlyRecord
//! <device>/daily/<YYYY-MM>.json  DailyRecord
//! <device>/index.json            DeviceIndex
//! ```
//!
//! Every save is load, merge, then one atomic whole-file replace. There is no
//! locking; a single writer per file is assumed.

pub mod error;
mod files;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::fs;
use traffic_model::{is_month_key, DailyEntry, DailyRecord, DeviceIndex, MonthlyRecord, Reading};

use crate::transform::{merge_daily, merge_readings};

pub use error::{Result, StoreError, StoreOp};

const DAILY_DIR: &str = "daily";
const INDEX_FILE: &str = "index.json";

/// Outcome of [`JsonStore::save_monthly`].
#[derive(Debug, Clone)]
pub struct MonthlySave {
    /// The merged readings now on disk.
    pub readings: Vec<Reading>,
    /// Incoming or stored readings dropped for lack of a timestamp.
    pub skipped: usize,
    pub path: PathBuf,
}

impl MonthlySave {
    pub fn count(&self) -> usize {
        self.readings.len()
    }
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn monthly_path(&self, device_id: &str, month: &str) -> Result<PathBuf> {
        Ok(self.device_dir(device_id)?.join(month_file(month)?))
    }

    pub fn daily_path(&self, device_id: &str, month: &str) -> Result<PathBuf> {
        Ok(self.device_dir(device_id)?.join(DAILY_DIR).join(month_file(month)?))
    }

    pub fn index_path(&self, device_id: &str) -> Result<PathBuf> {
        Ok(self.device_dir(device_id)?.join(INDEX_FILE))
    }

    pub async fn load_monthly(&self, device_id: &str, month: &str) -> Result<Option<MonthlyRecord>> {
        let path = self.monthly_path(device_id, month)?;
        files::read_json(StoreOp::LoadMonthly, &path).await
    }

    pub async fn load_daily(&self, device_id: &str, month: &str) -> Result<Option<DailyRecord>> {
        let path = self.daily_path(device_id, month)?;
        files::read_json(StoreOp::LoadDaily, &path).await
    }

    pub async fn load_index(&self, device_id: &str) -> Result<Option<DeviceIndex>> {
        let path = self.index_path(device_id)?;
        files::read_json(StoreOp::LoadIndex, &path).await
    }

    /// Merge `readings` into the stored month and write the result.
    pub async fn save_monthly(
        &self,
        device_id: &str,
        month: &str,
        readings: &[Reading],
    ) -> Result<MonthlySave> {
        let path = self.monthly_path(device_id, month)?;
        let existing = self
            .load_monthly(device_id, month)
            .await?
            .map(|r| r.data)
            .unwrap_or_default();

        let merged = merge_readings(&existing, readings);
        if merged.skipped > 0 {
            metrics::counter!("store_readings_skipped_total").increment(merged.skipped as u64);
            tracing::warn!(device_id, month, skipped = merged.skipped, "dropped readings without timestamp");
        }

        let record = MonthlyRecord::new(device_id, month, merged.readings);
        self.write(StoreOp::SaveMonthly, &path, &record).await?;
        metrics::counter!("store_monthly_saves_total").increment(1);
        tracing::debug!(device_id, month, count = record.data.len(), "monthly file written");

        Ok(MonthlySave {
            readings: record.data,
            skipped: merged.skipped,
            path,
        })
    }

    /// Merge `entries` into the stored daily aggregates for the month.
    ///
    /// Returns the number of days in the file.
    pub async fn save_daily(&self, device_id: &str, month: &str, entries: &[DailyEntry]) -> Result<usize> {
        let existing = self
            .load_daily(device_id, month)
            .await?
            .map(|r| r.days)
            .unwrap_or_default();

        self.replace_daily(device_id, month, merge_daily(&existing, entries))
            .await
    }

    /// Write the daily aggregates for the month without consulting the stored file.
    pub async fn replace_daily(&self, device_id: &str, month: &str, days: Vec<DailyEntry>) -> Result<usize> {
        let path = self.daily_path(device_id, month)?;
        let record = DailyRecord::new(device_id, month, days);
        self.write(StoreOp::SaveDaily, &path, &record).await?;
        metrics::counter!("store_daily_saves_total").increment(1);
        tracing::debug!(device_id, month, days = record.days.len(), "daily file written");
        Ok(record.days.len())
    }

    /// Add `month` to the device index. Returns `false` if it was already listed,
    /// in which case the file is left as is.
    pub async fn record_month(&self, device_id: &str, month: &str) -> Result<bool> {
        month_file(month)?;
        let path = self.index_path(device_id)?;
        let mut index = self
            .load_index(device_id)
            .await?
            .unwrap_or_else(|| DeviceIndex::new(device_id));

        if !index.insert_month(month) {
            return Ok(false);
        }
        index.last_updated = time::OffsetDateTime::now_utc();
        self.write(StoreOp::SaveIndex, &path, &index).await?;
        Ok(true)
    }

    /// Device directories under the root, sorted. A missing root has no devices.
    pub async fn list_devices(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (name, is_dir) in read_dir_names(StoreOp::ListDevices, &self.root).await? {
            if is_dir && valid_device_id(&name) {
                out.push(name);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Months with a stored monthly file for the device, sorted.
    pub async fn list_months(&self, device_id: &str) -> Result<Vec<String>> {
        let dir = self.device_dir(device_id)?;
        let mut out = Vec::new();
        for (name, is_dir) in read_dir_names(StoreOp::ListMonths, &dir).await? {
            if is_dir {
                continue;
            }
            if let Some(month) = name.strip_suffix(".json").filter(|m| is_month_key(m)) {
                out.push(month.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    async fn write<T: serde::Serialize>(&self, op: StoreOp, path: &Path, value: &T) -> Result<()> {
        files::write_json_atomic(op, path, value).await.inspect_err(|e| {
            metrics::counter!("store_write_errors_total").increment(1);
            tracing::error!(error = %e, "store write failed");
        })
    }

    fn device_dir(&self, device_id: &str) -> Result<PathBuf> {
        if !valid_device_id(device_id) {
            return Err(StoreError::InvalidKey {
                kind: "device id",
                value: device_id.to_string(),
            });
        }
        Ok(self.root.join(device_id))
    }
}

fn valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn month_file(month: &str) -> Result<String> {
    if !is_month_key(month) {
        return Err(StoreError::InvalidKey {
            kind: "month",
            value: month.to_string(),
        });
    }
    Ok(format!("{month}.json"))
}

async fn read_dir_names(op: StoreOp, dir: &Path) -> Result<Vec<(String, bool)>> {
    let io_err = |e: std::io::Error| StoreError::Io {
        op,
        path: dir.to_path_buf(),
        source: e,
    };

    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(io_err)? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().await.map_err(io_err)?.is_dir();
        names.push((name, is_dir));
    }
    Ok(names)
}
