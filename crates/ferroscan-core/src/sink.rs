use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{PersistError, QuoteRecord};

/// Persistence boundary invoked by the orchestrator after a pass.
///
/// Returns how many records were stored. A record that cannot be stored is
/// dropped from the count; it must not fail the rest of the batch.
pub trait RecordSink: Send + Sync {
    fn persist(&self, records: &[QuoteRecord]) -> Result<usize, PersistError>;
}

/// Appends records as newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<BufWriter<File>, PersistError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(BufWriter::new(file))
    }
}

impl RecordSink for JsonLinesSink {
    fn persist(&self, records: &[QuoteRecord]) -> Result<usize, PersistError> {
        let mut writer = self.open()?;
        let mut written = 0;

        for record in records {
            match serde_json::to_string(record) {
                Ok(line) => {
                    writer.write_all(line.as_bytes())?;
                    writer.write_all(b"\n")?;
                    written += 1;
                }
                Err(error) => warn!(ticker = %record.ticker, %error, "skipping unserializable record"),
            }
        }

        writer.flush()?;
        Ok(written)
    }
}
