//! Hand-off of the finished log to persistence.

use rttprof_core::{EventLog, StreamError};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes a terminated [`EventLog`] somewhere durable.
pub trait EventLogWriter: Send + Sync {
    fn write(&self, log: &EventLog) -> Result<(), StreamError>;
}

/// Writes the schema table and the event sequence as two JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileWriter {
    events_path: PathBuf,
    types_path: PathBuf,
}

#[derive(Serialize)]
struct EventRow<'a> {
    #[serde(rename = "type")]
    type_name: Option<&'a str>,
    type_id: u8,
    timestamp_ms: f64,
    fields: &'a [rttprof_core::FieldValue],
}

impl JsonFileWriter {
    pub fn new(events_path: impl Into<PathBuf>, types_path: impl Into<PathBuf>) -> Self {
        Self {
            events_path: events_path.into(),
            types_path: types_path.into(),
        }
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn types_path(&self) -> &Path {
        &self.types_path
    }

    fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StreamError> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, value)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl EventLogWriter for JsonFileWriter {
    fn write(&self, log: &EventLog) -> Result<(), StreamError> {
        Self::write_json(&self.types_path, log.registry().as_ref())?;

        let rows: Vec<EventRow<'_>> = log
            .events()
            .iter()
            .map(|e| EventRow {
                type_name: log.type_name(e),
                type_id: e.type_id,
                timestamp_ms: e.timestamp_ms,
                fields: &e.fields,
            })
            .collect();
        Self::write_json(&self.events_path, &rows)
    }
}
