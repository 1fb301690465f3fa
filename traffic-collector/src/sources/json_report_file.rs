use std::path::PathBuf;

use async_stream::stream;
use serde::Deserialize;
use serde_json::Value;
use traffic_model::{DeviceReading, Reading};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Readings for one device from a single JSON document.
///
/// Accepts either a bare array of readings or a saved API response of the
/// form `{"report": [...]}`. Elements are decoded one by one, so a bad element
/// is an error item and does not cost the rest of the document.
pub struct JsonReportSource {
    device_id: String,
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReportDocument {
    Report { report: Vec<Value> },
    Readings(Vec<Value>),
}

impl ReportDocument {
    fn into_elements(self) -> Vec<Value> {
        match self {
            Self::Report { report } => report,
            Self::Readings(readings) => readings,
        }
    }
}

impl JsonReportSource {
    pub fn new<P: Into<PathBuf>>(device_id: impl Into<String>, path: P) -> Self {
        Self {
            device_id: device_id.into(),
            path: path.into(),
        }
    }
}

#[async_trait::async_trait]
impl Source<DeviceReading> for JsonReportSource {
    async fn stream(&self) -> EnvelopeStream<DeviceReading> {
        let path = self.path.clone();
        let device_id = self.device_id.clone();

        let s = stream! {
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to read {}: {e}", path.display())));
                    return;
                }
            };
            let doc: ReportDocument = match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    metrics::counter!("source_parse_errors_total").increment(1);
                    yield Err(PipelineError::Source(format!("invalid report {}: {e}", path.display())));
                    return;
                }
            };

            for (idx, element) in doc.into_elements().into_iter().enumerate() {
                match serde_json::from_value::<Reading>(element) {
                    Ok(reading) => {
                        yield Ok(Envelope::now(DeviceReading {
                            device_id: device_id.clone(),
                            reading,
                        }));
                    }
                    Err(e) => {
                        metrics::counter!("source_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!(
                            "{}: invalid reading #{idx}: {e}", path.display()
                        )));
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(contents: &str) -> Vec<Result<Envelope<DeviceReading>, PipelineError>> {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        JsonReportSource::new("dev-1", file.path()).stream().await.collect().await
    }

    #[tokio::test]
    async fn reads_api_report_shape() {
        let items = collect(
            r#"{"status_code":200,"report":[
                {"date":"2024-06-01T00:00:00.000Z","car":1,"segment_id":7},
                {"date":"2024-06-01T01:00:00.000Z","bike":2}
            ]}"#,
        )
        .await;

        assert_eq!(items.len(), 2);
        let second = &items[1].as_ref().unwrap().payload;
        assert_eq!(second.device_id, "dev-1");
        assert_eq!(second.reading.count("bike"), Some(2.0));
    }

    #[tokio::test]
    async fn reads_bare_array() {
        let items = collect(r#"[{"date":"2024-06-01T00:00:00.000Z"}]"#).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn malformed_document_is_one_error() {
        let items = collect(r#"{"report": 5}"#).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }

    #[tokio::test]
    async fn bad_element_does_not_drop_its_neighbours() {
        let items = collect(
            r#"{"report":[
                {"date":"2024-06-01T00:00:00.000Z","car":1},
                {"date":"2024-06-01T01:00:00.000Z","car":2,"uptime":"n/a"},
                {"date":17,"car":3},
                {"date":"2024-06-01T03:00:00.000Z","car":4}
            ]}"#,
        )
        .await;

        assert_eq!(items.len(), 4);
        let second = &items[1].as_ref().unwrap().payload.reading;
        assert_eq!(second.count("car"), Some(2.0));
        assert_eq!(second.uptime(), None);
        assert!(matches!(&items[2], Err(PipelineError::Source(msg)) if msg.contains("#2")));
        assert!(items[3].is_ok());
    }
}
