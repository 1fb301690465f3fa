use anyhow::Result;
use traffic_collector::{config::AppConfig, metrics_server, observability, run, Reporter};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let reporter = Reporter::timestamped();
    let report = run::run_collection(&cfg, &reporter).await;

    for path in &report.written {
        tracing::debug!(path = %path.display(), "written");
    }
    if !report.source_errors.is_empty() {
        tracing::warn!(count = report.source_errors.len(), "some upstream items were rejected");
    }
    if report.has_failures() {
        anyhow::bail!(
            "collection run {} failed for device(s): {}",
            report.run_id,
            report.failed_devices().join(", ")
        );
    }

    Ok(())
}
