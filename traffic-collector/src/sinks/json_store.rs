use std::{
    collections::BTreeMap,
    future::Future,
    time::{Duration, Instant, SystemTime},
};

use futures::StreamExt;
use tracing::Instrument;
use traffic_model::{DeviceReading, Reading};

use crate::{
    config::{DailySource, SinkConfig},
    pipeline::{Envelope, PipelineError, Sink},
    report::Reporter,
    store::{JsonStore, StoreError},
    transform::{aggregate_daily, group_by_month},
};

/// Persists device readings into a [`JsonStore`].
///
/// Envelopes are buffered up to `batch_size`. Each flush splits the batch by
/// device and month and, per group, merges the monthly file, refreshes the
/// daily aggregates and records the month in the device index. A failing group
/// is reported and does not stop the others.
pub struct StoreSink {
    store: JsonStore,
    reporter: Reporter,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    daily_source: DailySource,
}

impl StoreSink {
    pub fn new(store: JsonStore, reporter: Reporter, cfg: &SinkConfig) -> Self {
        Self {
            store,
            reporter,
            batch_size: cfg.batch_size.max(1),
            max_retries: cfg.max_retries,
            retry_backoff: cfg.retry_backoff(),
            daily_source: cfg.daily_source,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<DeviceReading>]) {
        if batch.is_empty() {
            return;
        }
        let started = Instant::now();

        let mut by_device: BTreeMap<&str, Vec<&Reading>> = BTreeMap::new();
        for env in batch {
            by_device
                .entry(env.payload.device_id.as_str())
                .or_default()
                .push(&env.payload.reading);
        }

        for (device_id, readings) in by_device {
            self.reporter.received(device_id, readings.len());

            let groups = group_by_month(readings);
            if groups.skipped > 0 {
                metrics::counter!("store_readings_skipped_total").increment(groups.skipped as u64);
                tracing::warn!(device_id, skipped = groups.skipped, "dropped readings without timestamp");
                self.reporter.skipped(device_id, groups.skipped);
            }
            if groups.unplaced > 0 {
                metrics::counter!("store_readings_unplaced_total").increment(groups.unplaced as u64);
                tracing::warn!(device_id, unplaced = groups.unplaced, "dropped readings whose timestamp has no calendar month");
                self.reporter.unplaced(device_id, groups.unplaced);
            }

            for (month, readings) in &groups.months {
                let span = tracing::info_span!("persist", device_id, month = month.as_str());
                if let Err(e) = self.persist_month(device_id, month, readings).instrument(span).await {
                    tracing::error!(error = %e, device_id, month = month.as_str(), "failed to persist month");
                    self.reporter.failed(device_id, Some(month.as_str()), e.to_string());
                }
            }
        }

        metrics::histogram!("collection_flush_seconds").record(started.elapsed().as_secs_f64());
        // Latency from the earliest envelope of the batch to the end of its flush.
        if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
            if let Ok(dur) = SystemTime::now().duration_since(min_received) {
                metrics::histogram!("collection_end_to_end_latency_seconds").record(dur.as_secs_f64());
            }
        }
    }

    async fn persist_month(&self, device_id: &str, month: &str, readings: &[Reading]) -> Result<(), StoreError> {
        let saved = self
            .retrying(|| self.store.save_monthly(device_id, month, readings))
            .await?;
        self.reporter.skipped(device_id, saved.skipped);
        self.reporter.month_saved(device_id, month, saved.count());
        self.reporter.written(saved.path.clone());

        let days = match self.daily_source {
            DailySource::MergedMonth => aggregate_daily(&saved.readings),
            DailySource::Batch => aggregate_daily(readings),
        };
        self.retrying(|| self.store.save_daily(device_id, month, &days))
            .await?;
        self.reporter.written(self.store.daily_path(device_id, month)?);

        if self.retrying(|| self.store.record_month(device_id, month)).await? {
            self.reporter.written(self.store.index_path(device_id)?);
        }

        tracing::info!(count = saved.count(), days = days.len(), "month persisted");
        Ok(())
    }

    async fn retrying<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "store operation failed, retrying with backoff");
                    metrics::counter!("store_sink_retry_total").increment(1);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<DeviceReading> for StoreSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<DeviceReading>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<Envelope<DeviceReading>> = Vec::with_capacity(self.batch_size.min(4096));

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for StoreSink");
                    self.reporter.source_error(e.to_string());
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await;
                buffer.clear();
            }
        }

        self.flush_batch(&buffer).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn env(device_id: &str, reading: Reading) -> Result<Envelope<DeviceReading>, PipelineError> {
        Ok(Envelope::now(DeviceReading {
            device_id: device_id.to_string(),
            reading,
        }))
    }

    fn sink(store: &JsonStore, reporter: &Reporter, batch_size: usize, daily_source: DailySource) -> StoreSink {
        let cfg = SinkConfig {
            batch_size,
            max_retries: 0,
            retry_backoff_ms: 0,
            daily_source,
        };
        StoreSink::new(store.clone(), reporter.clone(), &cfg)
    }

    #[tokio::test]
    async fn splits_batch_by_device_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let reporter = Reporter::new("t");

        let items = vec![
            env("dev-a", Reading::at("2024-05-31T23:00:00.000Z").with_count("car", 1.0)),
            env("dev-a", Reading::at("2024-06-01T00:00:00.000Z").with_count("car", 2.0)),
            env("dev-b", Reading::at("2024-06-01T00:00:00.000Z").with_count("bike", 5.0)),
            env("dev-b", Reading::default().with_count("bike", 9.0)),
            Err(PipelineError::Source("bad line".to_string())),
        ];
        sink(&store, &reporter, 2, DailySource::MergedMonth)
            .run(stream::iter(items))
            .await
            .unwrap();

        assert_eq!(store.list_months("dev-a").await.unwrap(), vec!["2024-05", "2024-06"]);
        let daily = store.load_daily("dev-b", "2024-06").await.unwrap().unwrap();
        assert_eq!(daily.days[0].totals.count("bike"), Some(5.0));

        let report = reporter.snapshot();
        assert_eq!(report.devices["dev-a"].received, 2);
        assert_eq!(report.devices["dev-b"].received, 2);
        assert_eq!(report.devices["dev-b"].skipped, 1);
        assert_eq!(report.source_errors, vec!["source error: bad line".to_string()]);
        assert!(!report.has_failures());
        let index = store.load_index("dev-a").await.unwrap().unwrap();
        assert_eq!(index.months, vec!["2024-05", "2024-06"]);
    }

    #[tokio::test]
    async fn merged_month_daily_accumulates_partial_day_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let reporter = Reporter::new("t");

        for (hour, car) in [("00", 1.0), ("01", 2.0)] {
            let item = env("dev-a", Reading::at(format!("2024-06-01T{hour}:00:00.000Z")).with_count("car", car));
            sink(&store, &reporter, 10, DailySource::MergedMonth)
                .run(stream::iter(vec![item]))
                .await
                .unwrap();
        }

        let daily = store.load_daily("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(daily.days[0].totals.hours, 2);
        assert_eq!(daily.days[0].totals.count("car"), Some(3.0));
    }

    #[tokio::test]
    async fn batch_daily_overwrites_with_latest_subset() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let reporter = Reporter::new("t");

        for (hour, car) in [("00", 1.0), ("01", 2.0)] {
            let item = env("dev-a", Reading::at(format!("2024-06-01T{hour}:00:00.000Z")).with_count("car", car));
            sink(&store, &reporter, 10, DailySource::Batch)
                .run(stream::iter(vec![item]))
                .await
                .unwrap();
        }

        let daily = store.load_daily("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(daily.days[0].totals.hours, 1);
        assert_eq!(daily.days[0].totals.count("car"), Some(2.0));

        let monthly = store.load_monthly("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(monthly.data.len(), 2);
    }

    #[tokio::test]
    async fn one_corrupt_device_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let reporter = Reporter::new("t");

        let bad = dir.path().join("dev-bad").join("2024-06.json");
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        std::fs::write(&bad, "{").unwrap();

        let items = vec![
            env("dev-bad", Reading::at("2024-06-01T00:00:00.000Z").with_count("car", 1.0)),
            env("dev-good", Reading::at("2024-06-01T00:00:00.000Z").with_count("car", 1.0)),
        ];
        sink(&store, &reporter, 100, DailySource::MergedMonth)
            .run(stream::iter(items))
            .await
            .unwrap();

        let report = reporter.snapshot();
        assert_eq!(report.failed_devices(), vec!["dev-bad"]);
        assert_eq!(report.devices["dev-good"].months["2024-06"], 1);
        assert!(store.load_monthly("dev-good", "2024-06").await.unwrap().is_some());
        assert_eq!(std::fs::read_to_string(&bad).unwrap(), "{");
        assert!(report.written.iter().all(|p| !p.starts_with(dir.path().join("dev-bad"))));
    }

    #[tokio::test]
    async fn unplaceable_timestamps_are_reported_apart_from_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let reporter = Reporter::new("t");

        let items = vec![
            env("dev-a", Reading::at("20240601T130000Z").with_count("car", 2.0)),
            env("dev-a", Reading::at("sometime in june").with_count("car", 4.0)),
            env("dev-a", Reading::default().with_count("car", 8.0)),
        ];
        sink(&store, &reporter, 10, DailySource::MergedMonth)
            .run(stream::iter(items))
            .await
            .unwrap();

        let monthly = store.load_monthly("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(monthly.data.len(), 1);
        assert_eq!(monthly.data[0].timestamp(), Some("20240601T130000Z"));
        let daily = store.load_daily("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(daily.days[0].date, "2024-06-01");

        let dev = &reporter.snapshot().devices["dev-a"];
        assert_eq!(dev.received, 3);
        assert_eq!(dev.skipped, 1);
        assert_eq!(dev.unplaced, 1);
    }
}
