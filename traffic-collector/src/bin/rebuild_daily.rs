use anyhow::Result;
use std::env;
use traffic_collector::{config::AppConfig, observability, run, JsonStore, Reporter};

/// Re-derive daily aggregate files from the stored monthly readings, for one
/// device or for every device under the data directory.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let store = JsonStore::new(&cfg.storage.data_dir);
    let reporter = Reporter::timestamped();

    let devices = match env::args().nth(1) {
        Some(device_id) => vec![device_id],
        None => store.list_devices().await?,
    };

    let mut failed = Vec::new();
    for device_id in &devices {
        if let Err(e) = run::rebuild_daily(&store, device_id, &reporter).await {
            tracing::error!(error = %e, device_id = device_id.as_str(), "rebuild failed");
            failed.push(device_id.as_str());
        }
    }

    tracing::info!(
        devices = devices.len(),
        written = reporter.snapshot().written.len(),
        "rebuild finished"
    );
    if !failed.is_empty() {
        anyhow::bail!("rebuild failed for device(s): {}", failed.join(", "));
    }

    Ok(())
}
