use serde_json::Value;
use traffic_collector::{
    config::{SinkConfig, SourceKind},
    run,
    sources::FileSource,
    JsonStore, Reporter,
};

const BATCH: &str = r#"{"date":"2024-06-30T23:00:00.000Z","car":4,"bike":1,"uptime":0.5,"segment_id":42}
{"date":"2024-07-01T00:00:00.000Z","car":2,"pedestrian":3}
{"date":"2024-07-01T01:00:00.000Z","car":6,"uptime":1.0}
{"car":100}
"#;

async fn collect_once(store: &JsonStore, input: &std::path::Path) -> traffic_collector::RunReport {
    let reporter = Reporter::new("it");
    run::collect(
        FileSource::new(SourceKind::Ndjson, "9000001234", input),
        store,
        &SinkConfig::default(),
        &reporter,
    )
    .await
    .unwrap();
    reporter.snapshot()
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn ndjson_batch_lands_in_monthly_and_daily_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch.ndjson");
    std::fs::write(&input, BATCH).unwrap();
    let store = JsonStore::new(dir.path().join("data"));

    let report = collect_once(&store, &input).await;
    let dev = &report.devices["9000001234"];
    assert_eq!(dev.received, 4);
    assert_eq!(dev.skipped, 1);
    assert_eq!(dev.months.len(), 2);

    let july = read_json(&dir.path().join("data/9000001234/2024-07.json"));
    assert_eq!(july["device_id"], "9000001234");
    assert_eq!(july["month"], "2024-07");
    assert!(july["lastUpdated"].is_string());
    assert_eq!(july["data"].as_array().unwrap().len(), 2);

    let june = read_json(&dir.path().join("data/9000001234/2024-06.json"));
    assert_eq!(june["data"][0]["segment_id"], 42);

    let daily = read_json(&dir.path().join("data/9000001234/daily/2024-07.json"));
    let totals = &daily["days"][0]["totals"];
    assert_eq!(daily["days"][0]["date"], "2024-07-01");
    assert_eq!(totals["hours"], 2);
    assert_eq!(totals["car"], serde_json::json!(8));
    assert_eq!(totals["pedestrian"], serde_json::json!(3));
    assert_eq!(totals["uptime_avg"], 1.0);
    assert!(totals.get("bike").is_none());

    let index = read_json(&dir.path().join("data/9000001234/index.json"));
    assert_eq!(index["months"], serde_json::json!(["2024-06", "2024-07"]));
}

#[tokio::test]
async fn rerunning_the_same_batch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch.ndjson");
    std::fs::write(&input, BATCH).unwrap();
    let store = JsonStore::new(dir.path().join("data"));

    collect_once(&store, &input).await;
    let first = store.load_monthly("9000001234", "2024-07").await.unwrap().unwrap();
    let first_daily = store.load_daily("9000001234", "2024-07").await.unwrap().unwrap();

    let report = collect_once(&store, &input).await;
    let second = store.load_monthly("9000001234", "2024-07").await.unwrap().unwrap();
    let second_daily = store.load_daily("9000001234", "2024-07").await.unwrap().unwrap();

    assert_eq!(first.data, second.data);
    assert_eq!(first_daily.days, second_daily.days);
    assert_eq!(report.devices["9000001234"].months["2024-07"], 2);
    assert!(!report.has_failures());
}
