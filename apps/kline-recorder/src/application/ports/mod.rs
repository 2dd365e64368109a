//! Port Interfaces
//!
//! The contracts the processing loop is written against. Infrastructure
//! adapters implement them; tests substitute their own.
//!
//! ## Driven Ports (Outbound)
//!
//! - `EventDecoder`: turns one raw payload into a record
//! - `RecordSink`: persists the accumulated records once at shutdown

use std::path::PathBuf;

use crate::domain::kline::{KlineRecord, RawPayload};

// =============================================================================
// Errors
// =============================================================================

/// A payload that could not be turned into a record.
///
/// Always recoverable: the payload is dropped and the loop continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON, or the envelope shape is wrong.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A numeric field could not be parsed.
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber {
        /// Field path, e.g. `data.k.c`.
        field: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// A field was present but empty.
    #[error("empty field: {0}")]
    EmptyField(&'static str),
}

/// Failure while persisting records.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The destination could not be created or opened.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or flushing rows failed part way.
    #[error("failed to write records: {0}")]
    Write(#[from] std::io::Error),
}

// =============================================================================
// Ports
// =============================================================================

/// Decodes one raw payload into a record.
#[cfg_attr(test, mockall::automock)]
pub trait EventDecoder: Send {
    /// Decode a payload.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` describing why the payload was rejected.
    fn decode(&self, payload: &RawPayload) -> Result<KlineRecord, DecodeError>;
}

/// Writes the accumulated records to durable storage.
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    /// Persist all records, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the destination cannot be opened or written.
    fn flush(&mut self, records: &[KlineRecord]) -> Result<usize, SinkError>;

    /// Human-readable destination, used in logs.
    fn describe(&self) -> String;
}
