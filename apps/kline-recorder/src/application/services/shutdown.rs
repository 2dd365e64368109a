//! Shutdown Controller
//!
//! Cooperative cancellation for the recorder. Two flags are kept:
//!
//! - `interrupted`: written only by the OS signal handler. Lock-free and
//!   allocation-free, nothing else happens in signal context.
//! - `requested`: set by `request_stop`, which runs on an ordinary thread
//!   and is free to log, lock the queue and broadcast.
//!
//! `is_stop_requested` reports either flag, so the processing loop notices
//! an interrupt on its next poll even before the relay thread has
//! broadcast it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use super::queue::IngestionQueue;

/// Process-wide stop flag shared by the feed, the loop and the console.
#[derive(Debug)]
pub struct ShutdownController {
    requested: AtomicBool,
    interrupted: Arc<AtomicBool>,
    queue: Arc<IngestionQueue>,
    cancel: CancellationToken,
}

impl ShutdownController {
    /// Create a controller that wakes waiters on `queue` when stopping.
    #[must_use]
    pub fn new(queue: Arc<IngestionQueue>) -> Self {
        Self {
            requested: AtomicBool::new(false),
            interrupted: Arc::new(AtomicBool::new(false)),
            queue,
            cancel: CancellationToken::new(),
        }
    }

    /// Request a stop.
    ///
    /// Only the first call has an effect: it sets the flag, wakes every
    /// thread blocked on the queue and cancels the async side. Returns
    /// `true` for that first call and `false` afterwards.
    pub fn request_stop(&self) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            return false;
        }

        tracing::info!(
            pending_payloads = self.queue.len(),
            "Stop requested, waking processing loop"
        );
        self.queue.signal_stop();
        self.cancel.cancel();
        true
    }

    /// Whether a stop has been requested or an interrupt has arrived.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire) || self.interrupted.load(Ordering::Acquire)
    }

    /// Whether `request_stop` itself has run (the broadcast happened).
    #[must_use]
    pub fn is_stop_broadcast(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// The raw flag handed to the OS signal handler.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Token cancelled once a stop has been requested.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn controller() -> (Arc<IngestionQueue>, ShutdownController) {
        let queue = Arc::new(IngestionQueue::new());
        let shutdown = ShutdownController::new(Arc::clone(&queue));
        (queue, shutdown)
    }

    #[test]
    fn initially_running() {
        let (_queue, shutdown) = controller();
        assert!(!shutdown.is_stop_requested());
        assert!(!shutdown.is_stop_broadcast());
        assert!(!shutdown.cancellation_token().is_cancelled());
    }

    #[test]
    fn request_stop_is_idempotent() {
        let (_queue, shutdown) = controller();
        assert!(shutdown.request_stop());
        assert!(!shutdown.request_stop());
        assert!(shutdown.is_stop_requested());
        assert!(shutdown.cancellation_token().is_cancelled());
    }

    #[test]
    fn interrupt_flag_is_visible_before_broadcast() {
        let (_queue, shutdown) = controller();
        shutdown.interrupt_flag().store(true, Ordering::Release);

        assert!(shutdown.is_stop_requested());
        assert!(!shutdown.is_stop_broadcast());
        assert!(shutdown.request_stop());
    }

    #[test]
    fn stop_wakes_blocked_waiters() {
        let (queue, shutdown) = controller();
        let shutdown = Arc::new(shutdown);

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&queue);
                let s = Arc::clone(&shutdown);
                thread::spawn(move || {
                    let woken = q.wait_for_ready(Duration::from_secs(5));
                    (woken, s.is_stop_requested())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        shutdown.request_stop();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), (true, true));
        }
    }

    #[test]
    fn later_waiters_see_stop_immediately() {
        let (queue, shutdown) = controller();
        shutdown.request_stop();
        assert!(queue.wait_for_ready(Duration::from_secs(5)));
    }
}
