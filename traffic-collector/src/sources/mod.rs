pub mod csv_file;
pub mod json_report_file;
pub mod ndjson_file;

pub use csv_file::CsvReadingsSource;
pub use json_report_file::JsonReportSource;
pub use ndjson_file::NdjsonReadingsSource;

use std::path::PathBuf;

use traffic_model::DeviceReading;

use crate::{
    config::{DeviceConfig, SourceKind},
    pipeline::{EnvelopeStream, Source},
};

/// A file source of any supported format, chosen at runtime.
pub enum FileSource {
    Ndjson(NdjsonReadingsSource),
    Json(JsonReportSource),
    Csv(CsvReadingsSource),
}

impl FileSource {
    pub fn new(kind: SourceKind, device_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        match kind {
            SourceKind::Ndjson => Self::Ndjson(NdjsonReadingsSource::new(device_id, path)),
            SourceKind::Json => Self::Json(JsonReportSource::new(device_id, path)),
            SourceKind::Csv => Self::Csv(CsvReadingsSource::new(device_id, path)),
        }
    }

    pub fn for_device(device: &DeviceConfig) -> Self {
        Self::new(device.source.kind, device.id.clone(), device.source.path.clone())
    }
}

#[async_trait::async_trait]
impl Source<DeviceReading> for FileSource {
    async fn stream(&self) -> EnvelopeStream<DeviceReading> {
        match self {
            Self::Ndjson(s) => s.stream().await,
            Self::Json(s) => s.stream().await,
            Self::Csv(s) => s.stream().await,
        }
    }
}
