//! Collection-run orchestration shared by the binaries.

use tracing::Instrument;
use traffic_model::DeviceReading;

use crate::{
    config::{AppConfig, DeviceConfig, SinkConfig},
    pipeline::{Pipeline, PipelineError, Source},
    report::{Reporter, RunReport},
    sinks::StoreSink,
    sources::FileSource,
    store::{JsonStore, StoreError},
    transform::aggregate_daily,
};

/// Feed one source through a [`StoreSink`].
pub async fn collect<S>(
    source: S,
    store: &JsonStore,
    sink_cfg: &SinkConfig,
    reporter: &Reporter,
) -> Result<(), PipelineError>
where
    S: Source<DeviceReading> + 'static,
{
    let sink = StoreSink::new(store.clone(), reporter.clone(), sink_cfg);
    let pipeline: Pipeline<_, DeviceReading, _> = Pipeline::new(source, sink);
    pipeline.run().await
}

/// Run every configured device, one after the other.
///
/// Devices are isolated from each other: a device whose pipeline fails is
/// recorded in the report and the run moves on.
pub async fn run_collection(cfg: &AppConfig, reporter: &Reporter) -> RunReport {
    let store = JsonStore::new(&cfg.storage.data_dir);
    let span = tracing::info_span!("collection_run", run_id = %reporter.run_id());

    async {
        tracing::info!(devices = cfg.devices.len(), data_dir = %store.root().display(), "collection run started");

        for device in &cfg.devices {
            collect_device(device, &store, &cfg.sink, reporter).await;
        }

        let report = reporter.snapshot();
        tracing::info!(
            written = report.written.len(),
            skipped = report.total_skipped(),
            unplaced = report.total_unplaced(),
            source_errors = report.source_errors.len(),
            failed_devices = report.failed_devices().len(),
            "collection run finished"
        );
        report
    }
    .instrument(span)
    .await
}

async fn collect_device(device: &DeviceConfig, store: &JsonStore, sink_cfg: &SinkConfig, reporter: &Reporter) {
    let source = FileSource::for_device(device);
    let span = tracing::info_span!("device", device_id = device.id.as_str());

    if let Err(e) = collect(source, store, sink_cfg, reporter).instrument(span).await {
        tracing::error!(error = %e, device_id = device.id.as_str(), "device collection failed");
        reporter.failed(&device.id, None, e.to_string());
    }
}

/// Recompute every daily-aggregate file of a device from its monthly files.
///
/// Returns the number of months rewritten.
pub async fn rebuild_daily(store: &JsonStore, device_id: &str, reporter: &Reporter) -> Result<usize, StoreError> {
    let mut rebuilt = 0;
    for month in store.list_months(device_id).await? {
        let Some(record) = store.load_monthly(device_id, &month).await? else {
            continue;
        };

        let days = aggregate_daily(&record.data);
        store.replace_daily(device_id, &month, days).await?;
        reporter.written(store.daily_path(device_id, &month)?);
        reporter.month_saved(device_id, &month, record.data.len());
        if store.record_month(device_id, &month).await? {
            reporter.written(store.index_path(device_id)?);
        }
        rebuilt += 1;
    }
    tracing::info!(device_id, months = rebuilt, "daily aggregates rebuilt");
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SourceKind, StorageConfig};
    use traffic_model::{DailyEntry, DailyTotals, Reading};

    #[tokio::test]
    async fn run_isolates_a_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.ndjson");
        std::fs::write(&good, "{\"date\":\"2024-06-01T00:00:00.000Z\",\"car\":1}\n").unwrap();

        let cfg = AppConfig {
            storage: StorageConfig {
                data_dir: dir.path().join("data"),
            },
            sink: SinkConfig::default(),
            metrics: None,
            devices: vec![
                DeviceConfig {
                    id: "missing".to_string(),
                    source: SourceConfig {
                        kind: SourceKind::Ndjson,
                        path: dir.path().join("nope.ndjson"),
                    },
                },
                DeviceConfig {
                    id: "good".to_string(),
                    source: SourceConfig {
                        kind: SourceKind::Ndjson,
                        path: good,
                    },
                },
            ],
        };

        let report = run_collection(&cfg, &Reporter::new("t")).await;
        assert_eq!(report.source_errors.len(), 1);
        assert_eq!(report.devices["good"].months["2024-06"], 1);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn rebuild_replaces_stale_daily_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let readings = vec![
            Reading::at("2024-06-01T00:00:00.000Z").with_count("car", 1.0),
            Reading::at("2024-06-01T01:00:00.000Z").with_count("car", 2.0),
        ];
        store.save_monthly("dev-a", "2024-06", &readings).await.unwrap();

        let stale = DailyEntry {
            date: "2024-06-01".to_string(),
            totals: DailyTotals {
                hours: 1,
                ..DailyTotals::default()
            },
        };
        store.save_daily("dev-a", "2024-06", &[stale]).await.unwrap();

        let reporter = Reporter::new("t");
        assert_eq!(rebuild_daily(&store, "dev-a", &reporter).await.unwrap(), 1);

        let daily = store.load_daily("dev-a", "2024-06").await.unwrap().unwrap();
        assert_eq!(daily.days[0].totals.hours, 2);
        assert_eq!(daily.days[0].totals.count("car"), Some(3.0));
        assert!(!reporter.snapshot().written.is_empty());
    }
}
