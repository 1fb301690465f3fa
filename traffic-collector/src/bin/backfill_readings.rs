use anyhow::{bail, Context, Result};
use std::{env, path::Path};
use tracing::Instrument;
use traffic_collector::{
    config::{AppConfig, SourceKind},
    observability, run,
    sources::FileSource,
    JsonStore, Reporter,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: backfill_readings <device_id> <file.ndjson|file.json|file.csv>");
    }
    let device_id = &args[1];
    let file_path = Path::new(&args[2]);
    let kind = SourceKind::from_path(file_path)
        .with_context(|| format!("cannot tell the format of {} from its extension", file_path.display()))?;

    // Load configuration (can point COLLECTOR_CONFIG to a backfill-specific file).
    let cfg = AppConfig::load()?;
    let store = JsonStore::new(&cfg.storage.data_dir);
    let reporter = Reporter::timestamped();

    let source = FileSource::new(kind, device_id.as_str(), file_path);
    let span = tracing::info_span!("collection_run", run_id = %reporter.run_id(), device_id = device_id.as_str());
    run::collect(source, &store, &cfg.sink, &reporter)
        .instrument(span)
        .await?;

    let report = reporter.snapshot();
    if let Some(dev) = report.devices.get(device_id) {
        tracing::info!(
            received = dev.received,
            skipped = dev.skipped,
            unplaced = dev.unplaced,
            months = dev.months.len(),
            "backfill finished"
        );
    }
    if !report.source_errors.is_empty() {
        tracing::warn!(count = report.source_errors.len(), "some input lines were rejected");
    }
    if report.has_failures() {
        bail!("backfill for {device_id} failed; see log for affected months");
    }

    Ok(())
}
