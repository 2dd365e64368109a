//! Kline Record Types
//!
//! Core domain types for captured candlestick data: the raw payload handed
//! over by the feed, the decoded close-price record, and the append-only
//! accumulator the processing loop owns until flush.

use std::fmt;

// =============================================================================
// Raw Payload
// =============================================================================

/// One undecoded message as delivered by the feed.
///
/// Payloads are opaque to the queue; only the decoder looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(String);

impl RawPayload {
    /// Wrap a text frame.
    #[must_use]
    pub const fn new(text: String) -> Self {
        Self(text)
    }

    /// Borrow the payload text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawPayload {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

// =============================================================================
// Kline Record
// =============================================================================

/// A decoded close-price observation for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRecord {
    symbol: String,
    close_price: f64,
    event_time_secs: i64,
}

impl KlineRecord {
    /// Create a record from an already second-resolution timestamp.
    #[must_use]
    pub const fn new(symbol: String, close_price: f64, event_time_secs: i64) -> Self {
        Self {
            symbol,
            close_price,
            event_time_secs,
        }
    }

    /// Create a record from a millisecond epoch timestamp.
    ///
    /// Seconds are obtained by floor division, so `1_700_000_000_999` ms
    /// becomes `1_700_000_000` s and `-1` ms becomes `-1` s.
    #[must_use]
    pub const fn from_millis(symbol: String, close_price: f64, event_time_ms: i64) -> Self {
        Self::new(symbol, close_price, event_time_ms.div_euclid(1000))
    }

    /// Trading symbol, e.g. `BTCUSDT`.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Close price of the kline at event time.
    #[must_use]
    pub const fn close_price(&self) -> f64 {
        self.close_price
    }

    /// Event time in whole seconds since the Unix epoch.
    #[must_use]
    pub const fn event_time_secs(&self) -> i64 {
        self.event_time_secs
    }
}

impl fmt::Display for KlineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} = {}",
            self.symbol, self.event_time_secs, self.close_price
        )
    }
}

// =============================================================================
// Accumulator
// =============================================================================

/// Append-only sequence of decoded records.
///
/// Owned by the processing loop; nothing is ever removed before the flush.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    records: Vec<KlineRecord>,
}

impl Accumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record.
    pub fn append(&mut self, record: KlineRecord) {
        self.records.push(record);
    }

    /// Number of records collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been collected yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in arrival order.
    #[must_use]
    pub fn records(&self) -> &[KlineRecord] {
        &self.records
    }
}
