//! CSV Record Sink
//!
//! Writes the accumulated records once, at shutdown:
//!
//! ```text
//! timestamp,symbol,close_price
//! 2023-11-14 22:13:20,BTCUSDT,43250.55
//! ```
//!
//! Timestamps are rendered in the host's local time zone. Prices use the
//! shortest representation that round-trips (`f64` `Display`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};

use crate::application::ports::{RecordSink, SinkError};
use crate::domain::kline::KlineRecord;

/// Header row.
pub const CSV_HEADER: &str = "timestamp,symbol,close_price";

/// Timestamp layout for the first column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render epoch seconds as local wall-clock time.
///
/// Falls back to the raw number for instants chrono cannot represent.
#[must_use]
pub fn format_local_timestamp(epoch_secs: i64) -> String {
    Local
        .timestamp_opt(epoch_secs, 0)
        .earliest()
        .map_or_else(
            || epoch_secs.to_string(),
            |dt| dt.format(TIMESTAMP_FORMAT).to_string(),
        )
}

/// Write the header and one row per record to any writer.
///
/// Returns the number of data rows written.
///
/// # Errors
///
/// Returns the first I/O error from the writer.
pub fn write_records<W: Write>(out: &mut W, records: &[KlineRecord]) -> std::io::Result<usize> {
    writeln!(out, "{CSV_HEADER}")?;
    for record in records {
        writeln!(
            out,
            "{},{},{}",
            format_local_timestamp(record.event_time_secs()),
            record.symbol(),
            record.close_price()
        )?;
    }
    out.flush()?;
    Ok(records.len())
}

/// Sink that (re)creates a CSV file on flush.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    /// Create a sink targeting `path`. Nothing is touched until `flush`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvFileSink {
    fn flush(&mut self, records: &[KlineRecord]) -> Result<usize, SinkError> {
        let file = File::create(&self.path).map_err(|source| SinkError::Open {
            path: self.path.clone(),
            source,
        })?;

        let mut out = BufWriter::new(file);
        let rows = write_records(&mut out, records)?;
        tracing::debug!(path = %self.path.display(), rows, "CSV written");
        Ok(rows)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
