//! Ingestion Queue
//!
//! FIFO hand-off of raw payloads from the feed thread to the processing
//! thread. Queue contents, the ready signal and the stop predicate live
//! behind one mutex; a condition variable wakes the consumer.
//!
//! ```text
//! feed thread ── push ──► [ p1 p2 p3 ] ── drain_all ──► processing thread
//!                  │                          ▲
//!                  └──── notify_one ──────────┘ (wait_for_ready)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::domain::kline::RawPayload;
use crate::infrastructure::metrics;

#[derive(Debug, Default)]
struct QueueState {
    payloads: VecDeque<RawPayload>,
    ready: bool,
    stopping: bool,
}

impl QueueState {
    const fn ready_or_stopping(&self) -> bool {
        self.ready || self.stopping
    }
}

/// Thread-safe, unbounded FIFO of raw payloads with bounded-wait signaling.
#[derive(Debug, Default)]
pub struct IngestionQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl IngestionQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload and wake one waiting consumer.
    ///
    /// Never blocks beyond the critical section and never fails, so it is
    /// safe to call from the feed's delivery context. Payloads pushed after
    /// a stop are still queued but need not be processed.
    pub fn push(&self, payload: RawPayload) {
        {
            let mut state = self.state.lock();
            state.payloads.push_back(payload);
            state.ready = true;
            // Under the lock so depth updates land in queue order.
            metrics::set_queue_depth(state.payloads.len());
        }
        self.ready.notify_one();

        metrics::record_payload_received();
    }

    /// Block until the ready signal is asserted or `timeout` elapses.
    ///
    /// Returns `true` when woken by a push or a stop, `false` on timeout.
    /// Spurious wake-ups are absorbed by re-checking the predicate.
    pub fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.ready_or_stopping() {
            return true;
        }
        let result = self
            .ready
            .wait_while_for(&mut state, |s| !s.ready_or_stopping(), timeout);
        !result.timed_out()
    }

    /// Remove and return every queued payload in arrival order.
    ///
    /// Clears the ready signal. The stop predicate is left untouched.
    #[must_use]
    pub fn drain_all(&self) -> Vec<RawPayload> {
        let drained = {
            let mut state = self.state.lock();
            state.ready = false;
            metrics::set_queue_depth(0);
            std::mem::take(&mut state.payloads)
        };
        drained.into()
    }

    /// Assert the stop predicate and wake every waiter.
    ///
    /// Called by the shutdown controller; must not be used from a signal
    /// handler since it takes the lock.
    pub fn signal_stop(&self) {
        self.state.lock().stopping = true;
        self.ready.notify_all();
    }

    /// Number of payloads waiting to be drained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().payloads.len()
    }

    /// Whether no payload is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().payloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use proptest::prelude::*;

    use super::*;

    fn payload(n: usize) -> RawPayload {
        RawPayload::new(format!("payload-{n}"))
    }

    #[test]
    fn drain_returns_payloads_in_push_order() {
        let queue = IngestionQueue::new();
        for n in 0..5 {
            queue.push(payload(n));
        }

        let drained = queue.drain_all();
        assert_eq!(drained, (0..5).map(payload).collect::<Vec<_>>());
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn wait_times_out_without_signal() {
        let queue = IngestionQueue::new();
        let started = Instant::now();
        assert!(!queue.wait_for_ready(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_immediately_when_already_ready() {
        let queue = IngestionQueue::new();
        queue.push(payload(1));
        assert!(queue.wait_for_ready(Duration::from_secs(5)));
    }

    #[test]
    fn drain_clears_ready_signal() {
        let queue = IngestionQueue::new();
        queue.push(payload(1));
        let _ = queue.drain_all();
        assert!(!queue.wait_for_ready(Duration::from_millis(10)));
    }

    #[test]
    fn push_wakes_blocked_consumer() {
        let queue = Arc::new(IngestionQueue::new());
        let consumer_queue = Arc::clone(&queue);

        let consumer = thread::spawn(move || {
            let woken = consumer_queue.wait_for_ready(Duration::from_secs(5));
            (woken, consumer_queue.drain_all())
        });

        thread::sleep(Duration::from_millis(20));
        queue.push(payload(7));

        let (woken, drained) = consumer.join().unwrap();
        assert!(woken);
        assert_eq!(drained, vec![payload(7)]);
    }

    #[test]
    fn stop_wakes_every_waiter_and_stays_asserted() {
        let queue = Arc::new(IngestionQueue::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&queue);
                thread::spawn(move || q.wait_for_ready(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.signal_stop();

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }

        let _ = queue.drain_all();
        assert!(queue.wait_for_ready(Duration::from_secs(5)));
    }

    #[test]
    fn len_tracks_pending_payloads() {
        let queue = IngestionQueue::new();
        assert_eq!(queue.len(), 0);
        queue.push(payload(1));
        queue.push(payload(2));
        assert_eq!(queue.len(), 2);
    }

    fn rendered_depth(handle: &metrics_exporter_prometheus::PrometheusHandle) -> f64 {
        handle
            .render()
            .lines()
            .find_map(|line| line.strip_prefix("kline_recorder_queue_depth "))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    #[test]
    fn depth_gauge_follows_push_and_drain() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let queue = IngestionQueue::new();

        ::metrics::with_local_recorder(&recorder, || {
            queue.push(payload(1));
            queue.push(payload(2));
            queue.push(payload(3));
            assert_eq!(rendered_depth(&handle), 3.0);

            let _ = queue.drain_all();
            assert_eq!(rendered_depth(&handle), 0.0);

            queue.push(payload(4));
        });

        assert_eq!(rendered_depth(&handle), 1.0);
        assert_eq!(queue.len(), 1);
    }

    proptest! {
        #[test]
        fn fifo_preserved_across_interleaved_drains(
            count in 0usize..200,
            drain_every in 1usize..20,
        ) {
            let queue = IngestionQueue::new();
            let mut seen = Vec::with_capacity(count);

            for n in 0..count {
                queue.push(payload(n));
                if n % drain_every == 0 {
                    seen.extend(queue.drain_all());
                }
            }
            seen.extend(queue.drain_all());

            prop_assert_eq!(seen, (0..count).map(payload).collect::<Vec<_>>());
        }
    }

    #[test]
    fn fifo_preserved_with_concurrent_consumer() {
        const COUNT: usize = 2_000;
        let queue = Arc::new(IngestionQueue::new());
        let consumer_queue = Arc::clone(&queue);

        let consumer = thread::spawn(move || {
            let mut seen = Vec::with_capacity(COUNT);
            while seen.len() < COUNT {
                if consumer_queue.wait_for_ready(Duration::from_millis(50)) {
                    seen.extend(consumer_queue.drain_all());
                }
            }
            seen
        });

        for n in 0..COUNT {
            queue.push(payload(n));
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..COUNT).map(payload).collect::<Vec<_>>());
    }
}
