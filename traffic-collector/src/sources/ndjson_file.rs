use std::path::PathBuf;

use async_stream::stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use traffic_model::{DeviceReading, Reading};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Readings for one device from a newline-delimited JSON file.
///
/// Each non-blank line is one reading object in the upstream API shape. A line
/// that fails to parse becomes an error item; the lines after it are still read.
pub struct NdjsonReadingsSource {
    device_id: String,
    path: PathBuf,
}

impl NdjsonReadingsSource {
    pub fn new<P: Into<PathBuf>>(device_id: impl Into<String>, path: P) -> Self {
        Self {
            device_id: device_id.into(),
            path: path.into(),
        }
    }
}

#[async_trait::async_trait]
impl Source<DeviceReading> for NdjsonReadingsSource {
    async fn stream(&self) -> EnvelopeStream<DeviceReading> {
        let path = self.path.clone();
        let device_id = self.device_id.clone();

        let s = stream! {
            let file = match File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open {}: {e}", path.display()
                    )));
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!(
                            "failed to read {}: {e}", path.display()
                        )));
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<Reading>(&line) {
                    Ok(reading) => {
                        yield Ok(Envelope::now(DeviceReading {
                            device_id: device_id.clone(),
                            reading,
                        }));
                    }
                    Err(e) => {
                        metrics::counter!("source_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!(
                            "{}:{line_no}: invalid reading: {e}", path.display()
                        )));
                    }
                }
            }
        };

        Box::pin(s)
    }
}
