use std::{fs::File, path::PathBuf};

use async_stream::stream;
use csv::StringRecord;
use serde_json::Value;
use traffic_model::{DeviceReading, Reading};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// CSV export of readings for one device.
///
/// The header row names the fields and must include `date`. Every other column,
/// `uptime` included, is stored as a number when it parses as one and as text
/// otherwise. Empty cells are left out of the reading. A row the CSV reader
/// rejects becomes an error item and the rows after it are still read.
pub struct CsvReadingsSource {
    device_id: String,
    path: PathBuf,
}

impl CsvReadingsSource {
    pub fn new<P: Into<PathBuf>>(device_id: impl Into<String>, path: P) -> Self {
        Self {
            device_id: device_id.into(),
            path: path.into(),
        }
    }
}

fn parse_cell(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::from(i));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Value::from(f)),
        _ => Some(Value::from(trimmed)),
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Reading {
    let mut reading = Reading::default();

    for (name, cell) in headers.iter().zip(record.iter()) {
        let name = name.trim();
        if name == "date" {
            let trimmed = cell.trim();
            if !trimmed.is_empty() {
                reading.date = Some(trimmed.to_string());
            }
        } else if let Some(v) = parse_cell(cell) {
            reading.fields.insert(name.to_string(), v);
        }
    }

    reading
}

#[async_trait::async_trait]
impl Source<DeviceReading> for CsvReadingsSource {
    async fn stream(&self) -> EnvelopeStream<DeviceReading> {
        // Blocking CSV reader inside a single async task; exports are one
        // device-month or so.
        let path = self.path.clone();
        let device_id = self.device_id.clone();

        let s = stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open CSV file {}: {e}", path.display()
                    )));
                    return;
                }
            };
            let mut rdr = csv::Reader::from_reader(file);
            let headers = match rdr.headers() {
                Ok(h) => h.clone(),
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to read CSV headers of {}: {e}", path.display()
                    )));
                    return;
                }
            };

            if !headers.iter().any(|h| h.trim() == "date") {
                yield Err(PipelineError::Source(format!(
                    "missing column 'date' in CSV header of {}", path.display()
                )));
                return;
            }

            for result in rdr.records() {
                match result {
                    Ok(record) => {
                        yield Ok(Envelope::now(DeviceReading {
                            device_id: device_id.clone(),
                            reading: record_to_reading(&record, &headers),
                        }));
                    }
                    Err(e) => {
                        let fatal = e.is_io_error();
                        metrics::counter!("source_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!(
                            "{}: invalid CSV record: {e}", path.display()
                        )));
                        if fatal {
                            break;
                        }
                    }
                }
            }
        };

        Box::pin(s)
    }
}
