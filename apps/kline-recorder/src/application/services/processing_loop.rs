//! Processing Loop
//!
//! The single consumer of the ingestion queue. Waits for payloads, drains
//! them in batches, decodes each one and appends successes to the
//! accumulator. When a stop is observed it optionally drains once more,
//! then flushes the accumulator to the sink exactly once.
//!
//! # States
//!
//! ```text
//! Running ──signal──► DrainingAndDecoding ──batch done──► Running
//!    │
//!    └──stop observed──► (final drain per policy) ──► Stopped (flushed)
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{EventDecoder, RecordSink, SinkError};
use crate::domain::kline::{Accumulator, RawPayload};
use crate::infrastructure::metrics;

use super::queue::IngestionQueue;
use super::shutdown::ShutdownController;

/// Default wait between cancellation checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Policy & State
// =============================================================================

/// What to do with payloads still queued when a stop is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopDrainPolicy {
    /// Drain and decode everything still queued before flushing.
    #[default]
    DrainPending,
    /// Drop whatever is still queued.
    Discard,
}

impl StopDrainPolicy {
    /// Parse a policy name; anything but `discard` means drain.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "discard" => Self::Discard,
            _ => Self::DrainPending,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DrainPending => "drain",
            Self::Discard => "discard",
        }
    }
}

/// Current position in the loop's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for payloads.
    Running,
    /// Decoding a drained batch.
    DrainingAndDecoding,
    /// Terminated; the accumulator has been handed to the sink.
    Stopped,
}

impl LoopState {
    /// State name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::DrainingAndDecoding => "draining",
            Self::Stopped => "stopped",
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of the terminal flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Records were written.
    Written {
        /// Rows written, excluding the header.
        rows: usize,
    },
    /// The sink failed; records were not persisted.
    Failed {
        /// Error message from the sink.
        reason: String,
    },
    /// A flush had already happened; nothing was written.
    AlreadyFlushed,
}

/// Counters for one decoded batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Payloads removed from the queue.
    pub drained: usize,
    /// Payloads decoded into records.
    pub decoded: usize,
    /// Payloads rejected by the decoder.
    pub rejected: usize,
}

/// Summary returned when the loop terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// Total payloads drained from the queue.
    pub payloads_drained: usize,
    /// Records appended to the accumulator.
    pub records_decoded: usize,
    /// Payloads rejected by the decoder.
    pub decode_failures: usize,
    /// Payloads dropped at stop under the discard policy.
    pub payloads_discarded: usize,
    /// Outcome of the terminal flush.
    pub flush: FlushOutcome,
}

// =============================================================================
// Processing Loop
// =============================================================================

/// Consumer state machine over the ingestion queue.
pub struct ProcessingLoop<D, S> {
    queue: Arc<IngestionQueue>,
    shutdown: Arc<ShutdownController>,
    decoder: D,
    sink: S,
    accumulator: Accumulator,
    poll_interval: Duration,
    stop_policy: StopDrainPolicy,
    state: LoopState,
    flushed: bool,
    totals: BatchOutcome,
    discarded: usize,
}

impl<D: EventDecoder, S: RecordSink> ProcessingLoop<D, S> {
    /// Create a loop with the default poll interval and drain policy.
    #[must_use]
    pub fn new(
        queue: Arc<IngestionQueue>,
        shutdown: Arc<ShutdownController>,
        decoder: D,
        sink: S,
    ) -> Self {
        Self {
            queue,
            shutdown,
            decoder,
            sink,
            accumulator: Accumulator::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_policy: StopDrainPolicy::default(),
            state: LoopState::Running,
            flushed: false,
            totals: BatchOutcome::default(),
            discarded: 0,
        }
    }

    /// Override the wait between cancellation checks.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override what happens to queued payloads at stop.
    #[must_use]
    pub fn with_stop_policy(mut self, stop_policy: StopDrainPolicy) -> Self {
        self.stop_policy = stop_policy;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Records collected so far.
    #[must_use]
    pub const fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Run until a stop is observed, then flush.
    pub fn run(&mut self) -> LoopReport {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis(),
            stop_policy = self.stop_policy.as_str(),
            "Collecting kline messages"
        );

        while self.cycle() {}

        self.finish()
    }

    /// One wait cycle. Returns `false` once a stop has been observed.
    fn cycle(&mut self) -> bool {
        self.state = LoopState::Running;
        let signalled = self.queue.wait_for_ready(self.poll_interval);

        if self.shutdown.is_stop_requested() {
            tracing::info!("Stop observed by processing loop");
            return false;
        }

        if signalled {
            self.process_batch();
        }
        true
    }

    /// Drain the queue and decode every payload in order.
    pub fn process_batch(&mut self) -> BatchOutcome {
        self.state = LoopState::DrainingAndDecoding;
        let batch = self.queue.drain_all();
        let outcome = self.decode_batch(batch);
        self.state = LoopState::Running;
        outcome
    }

    fn decode_batch(&mut self, batch: Vec<RawPayload>) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            drained: batch.len(),
            ..BatchOutcome::default()
        };
        if batch.is_empty() {
            return outcome;
        }

        metrics::record_batch_size(batch.len());

        for payload in batch {
            match self.decoder.decode(&payload) {
                Ok(record) => {
                    tracing::info!(
                        symbol = record.symbol(),
                        close_price = record.close_price(),
                        event_time = record.event_time_secs(),
                        "Kline received"
                    );
                    self.accumulator.append(record);
                    outcome.decoded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        payload_bytes = payload.len(),
                        "Discarding undecodable payload"
                    );
                    outcome.rejected += 1;
                }
            }
        }

        metrics::record_records_decoded(outcome.decoded);
        metrics::record_decode_failures(outcome.rejected);

        self.totals.drained += outcome.drained;
        self.totals.decoded += outcome.decoded;
        self.totals.rejected += outcome.rejected;
        outcome
    }

    /// Terminal path: apply the stop policy, then flush once.
    ///
    /// Calling it again performs no further write and reports
    /// `FlushOutcome::AlreadyFlushed`.
    pub fn finish(&mut self) -> LoopReport {
        if self.flushed {
            return self.report(FlushOutcome::AlreadyFlushed);
        }

        match self.stop_policy {
            StopDrainPolicy::DrainPending => {
                let outcome = self.process_batch();
                if outcome.drained > 0 {
                    tracing::info!(
                        drained = outcome.drained,
                        decoded = outcome.decoded,
                        "Drained pending payloads before flush"
                    );
                }
            }
            StopDrainPolicy::Discard => {
                let dropped = self.queue.drain_all().len();
                if dropped > 0 {
                    tracing::warn!(dropped, "Discarding pending payloads at stop");
                }
                self.discarded += dropped;
            }
        }

        self.state = LoopState::Stopped;
        self.flushed = true;
        let flush = self.flush_accumulator();
        self.report(flush)
    }

    fn flush_accumulator(&mut self) -> FlushOutcome {
        let records = self.accumulator.records();
        let destination = self.sink.describe();

        match self.sink.flush(records) {
            Ok(rows) => {
                tracing::info!(rows, destination = %destination, "Records flushed");
                metrics::record_records_flushed(rows);
                FlushOutcome::Written { rows }
            }
            Err(e) => {
                log_sink_error(&e, &destination);
                metrics::record_flush_failure();
                FlushOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    const fn report(&self, flush: FlushOutcome) -> LoopReport {
        LoopReport {
            payloads_drained: self.totals.drained,
            records_decoded: self.totals.decoded,
            decode_failures: self.totals.rejected,
            payloads_discarded: self.discarded,
            flush,
        }
    }
}

fn log_sink_error(error: &SinkError, destination: &str) {
    match error {
        SinkError::Open { .. } => {
            tracing::error!(error = %error, destination, "Failed to open output, records lost");
        }
        SinkError::Write(_) => {
            tracing::error!(error = %error, destination, "Failed while writing output");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::application::ports::{DecodeError, MockEventDecoder, MockRecordSink};
    use crate::domain::kline::KlineRecord;

    fn pipeline() -> (Arc<IngestionQueue>, Arc<ShutdownController>) {
        let queue = Arc::new(IngestionQueue::new());
        let shutdown = Arc::new(ShutdownController::new(Arc::clone(&queue)));
        (queue, shutdown)
    }

    /// Decoder that accepts `SYMBOL:price` and rejects anything else.
    fn colon_decoder() -> MockEventDecoder {
        let mut decoder = MockEventDecoder::new();
        decoder.expect_decode().returning(|payload| {
            let (symbol, price) = payload
                .as_str()
                .split_once(':')
                .ok_or_else(|| DecodeError::Malformed("no colon".to_string()))?;
            let price = price.parse().map_err(|_| DecodeError::InvalidNumber {
                field: "price",
                value: price.to_string(),
            })?;
            Ok(KlineRecord::new(symbol.to_string(), price, 0))
        });
        decoder
    }

    fn counting_sink(times: usize) -> MockRecordSink {
        let mut sink = MockRecordSink::new();
        sink.expect_describe().return_const("memory".to_string());
        sink.expect_flush()
            .times(times)
            .returning(|records| Ok(records.len()));
        sink
    }

    #[test]
    fn batch_decodes_in_order_and_skips_failures() {
        let (queue, shutdown) = pipeline();
        let mut processing = ProcessingLoop::new(
            Arc::clone(&queue),
            shutdown,
            colon_decoder(),
            counting_sink(0),
        );

        queue.push("BTCUSDT:1.5".into());
        queue.push("garbage".into());
        queue.push("ETHUSDT:abc".into());
        queue.push("ETHUSDT:2.5".into());

        let outcome = processing.process_batch();
        assert_eq!(
            outcome,
            BatchOutcome {
                drained: 4,
                decoded: 2,
                rejected: 2
            }
        );

        let symbols: Vec<_> = processing
            .accumulator()
            .records()
            .iter()
            .map(KlineRecord::symbol)
            .collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(processing.state(), LoopState::Running);
    }

    #[test]
    fn finish_flushes_only_once() {
        let (queue, shutdown) = pipeline();
        let mut processing =
            ProcessingLoop::new(queue, shutdown, colon_decoder(), counting_sink(1));

        let first = processing.finish();
        assert_eq!(first.flush, FlushOutcome::Written { rows: 0 });
        assert_eq!(processing.state(), LoopState::Stopped);

        let second = processing.finish();
        assert_eq!(second.flush, FlushOutcome::AlreadyFlushed);
    }

    #[test]
    fn empty_accumulator_is_still_flushed() {
        let (queue, shutdown) = pipeline();
        let mut sink = MockRecordSink::new();
        sink.expect_describe().return_const("memory".to_string());
        sink.expect_flush()
            .withf(|records| records.is_empty())
            .times(1)
            .returning(|_| Ok(0));

        let mut processing =
            ProcessingLoop::new(queue, Arc::clone(&shutdown), colon_decoder(), sink);
        shutdown.request_stop();
        let report = processing.run();
        assert_eq!(report.flush, FlushOutcome::Written { rows: 0 });
    }

    #[test]
    fn drain_policy_processes_pending_payloads() {
        let (queue, shutdown) = pipeline();
        let mut processing = ProcessingLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shutdown),
            colon_decoder(),
            counting_sink(1),
        );

        queue.push("BTCUSDT:43250.55".into());
        shutdown.request_stop();

        let report = processing.run();
        assert_eq!(report.records_decoded, 1);
        assert_eq!(report.payloads_discarded, 0);
        assert_eq!(report.flush, FlushOutcome::Written { rows: 1 });
        assert_eq!(processing.accumulator().len(), 1);
    }

    #[test]
    fn discard_policy_drops_pending_payloads() {
        let (queue, shutdown) = pipeline();
        let mut processing = ProcessingLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shutdown),
            colon_decoder(),
            counting_sink(1),
        )
        .with_stop_policy(StopDrainPolicy::Discard);

        queue.push("BTCUSDT:1.0".into());
        queue.push("ETHUSDT:2.0".into());
        shutdown.request_stop();

        let report = processing.run();
        assert_eq!(report.records_decoded, 0);
        assert_eq!(report.payloads_discarded, 2);
        assert!(processing.accumulator().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn sink_failure_is_reported_not_fatal() {
        let (queue, shutdown) = pipeline();
        let mut sink = MockRecordSink::new();
        sink.expect_describe().return_const("/nope/out.csv".to_string());
        sink.expect_flush().times(1).returning(|_| {
            Err(SinkError::Open {
                path: "/nope/out.csv".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
            })
        });

        let mut processing =
            ProcessingLoop::new(queue, Arc::clone(&shutdown), colon_decoder(), sink);
        shutdown.request_stop();

        let report = processing.run();
        match report.flush {
            FlushOutcome::Failed { reason } => assert!(reason.contains("/nope/out.csv")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(processing.finish().flush, FlushOutcome::AlreadyFlushed);
    }

    #[test]
    fn loop_processes_pushes_from_another_thread_until_stopped() {
        let (queue, shutdown) = pipeline();
        let mut processing = ProcessingLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shutdown),
            colon_decoder(),
            counting_sink(1),
        )
        .with_poll_interval(Duration::from_millis(10));

        let consumer = thread::spawn(move || {
            let report = processing.run();
            (report, processing.accumulator().len())
        });

        for n in 0..50 {
            queue.push(format!("SYM{n}:{n}.5").into());
        }
        thread::sleep(Duration::from_millis(30));
        shutdown.request_stop();

        let (report, collected) = consumer.join().unwrap();
        assert_eq!(report.records_decoded, 50);
        assert_eq!(collected, 50);
        assert_eq!(report.flush, FlushOutcome::Written { rows: 50 });
    }

    #[test]
    fn interrupt_flag_alone_stops_the_loop_within_a_poll() {
        let (queue, shutdown) = pipeline();
        let flag = shutdown.interrupt_flag();
        let mut processing = ProcessingLoop::new(queue, shutdown, colon_decoder(), counting_sink(1))
            .with_poll_interval(Duration::from_millis(10));

        let consumer = thread::spawn(move || processing.run());
        thread::sleep(Duration::from_millis(20));
        flag.store(true, std::sync::atomic::Ordering::Release);

        let report = consumer.join().unwrap();
        assert_eq!(report.flush, FlushOutcome::Written { rows: 0 });
    }

    #[test]
    fn stop_policy_parsing() {
        assert_eq!(
            StopDrainPolicy::from_str_case_insensitive("DISCARD"),
            StopDrainPolicy::Discard
        );
        assert_eq!(
            StopDrainPolicy::from_str_case_insensitive("drain"),
            StopDrainPolicy::DrainPending
        );
        assert_eq!(
            StopDrainPolicy::from_str_case_insensitive("whatever"),
            StopDrainPolicy::DrainPending
        );
    }
}
