//! Prometheus Metrics Module
//!
//! Exposes recorder metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ingestion**: Payloads received from the feed, current queue depth
//! - **Decoding**: Records decoded, payloads rejected, batch sizes
//! - **Persistence**: Rows flushed, flush failures
//! - **Feed**: Connection state and transport errors
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Every
//! recording function is a no-op until `init_metrics` has installed the
//! recorder, so library code and tests can call them freely.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed, for example
/// because another global recorder is already in place.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Ingestion
    describe_counter!(
        "kline_recorder_payloads_received_total",
        "Total raw payloads pushed into the ingestion queue"
    );
    describe_gauge!(
        "kline_recorder_queue_depth",
        "Payloads waiting in the ingestion queue"
    );

    // Decoding
    describe_counter!(
        "kline_recorder_records_decoded_total",
        "Total payloads decoded into kline records"
    );
    describe_counter!(
        "kline_recorder_decode_failures_total",
        "Total payloads rejected by the decoder"
    );
    describe_histogram!(
        "kline_recorder_batch_size",
        "Payloads drained per processing batch"
    );

    // Persistence
    describe_counter!(
        "kline_recorder_records_flushed_total",
        "Total rows written to the output file"
    );
    describe_counter!(
        "kline_recorder_flush_failures_total",
        "Total failed flush attempts"
    );

    // Feed
    describe_gauge!(
        "kline_recorder_feed_connected",
        "1 while the kline stream connection is open"
    );
    describe_counter!(
        "kline_recorder_feed_errors_total",
        "Total feed transport errors by type"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for feed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Connecting or upgrading the WebSocket failed.
    Connect,
    /// Reading a frame failed.
    Transport,
    /// The server closed the stream.
    Closed,
}

impl FeedErrorKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Transport => "transport",
            Self::Closed => "closed",
        }
    }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Record one payload received from the feed.
pub fn record_payload_received() {
    counter!("kline_recorder_payloads_received_total").increment(1);
}

/// Update the ingestion queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    gauge!("kline_recorder_queue_depth").set(depth as f64);
}

/// Record the size of a drained batch.
#[allow(clippy::cast_precision_loss)]
pub fn record_batch_size(size: usize) {
    histogram!("kline_recorder_batch_size").record(size as f64);
}

/// Record records appended to the accumulator.
pub fn record_records_decoded(count: usize) {
    if count > 0 {
        counter!("kline_recorder_records_decoded_total").increment(as_count(count));
    }
}

/// Record payloads rejected by the decoder.
pub fn record_decode_failures(count: usize) {
    if count > 0 {
        counter!("kline_recorder_decode_failures_total").increment(as_count(count));
    }
}

/// Record rows written by a successful flush.
pub fn record_records_flushed(rows: usize) {
    counter!("kline_recorder_records_flushed_total").increment(as_count(rows));
}

/// Record a failed flush.
pub fn record_flush_failure() {
    counter!("kline_recorder_flush_failures_total").increment(1);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("kline_recorder_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a feed transport error.
pub fn record_feed_error(kind: FeedErrorKind) {
    counter!(
        "kline_recorder_feed_errors_total",
        "error_type" => kind.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_error_kind_as_str() {
        assert_eq!(FeedErrorKind::Connect.as_str(), "connect");
        assert_eq!(FeedErrorKind::Transport.as_str(), "transport");
        assert_eq!(FeedErrorKind::Closed.as_str(), "closed");
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_payload_received();
        set_queue_depth(3);
        record_batch_size(3);
        record_records_decoded(2);
        record_decode_failures(1);
        record_records_flushed(2);
        record_flush_failure();
        set_feed_connected(true);
        record_feed_error(FeedErrorKind::Closed);
    }

    #[test]
    fn count_conversion_saturates() {
        assert_eq!(as_count(0), 0);
        assert_eq!(as_count(42), 42);
    }
}
