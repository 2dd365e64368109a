//! Loop Supervisor
//!
//! Owns the not-yet-started processing loop and the thread it runs on.
//! The loop can be started from anywhere (startup code, the operator
//! console) but runs at most once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::processing_loop::LoopReport;

/// Name of the consumer thread.
pub const PROCESSOR_THREAD_NAME: &str = "kline-processor";

type LoopTask = Box<dyn FnOnce() -> LoopReport + Send + 'static>;

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The loop thread was spawned by this call.
    Started,
    /// The loop had been started before.
    AlreadyStarted,
}

/// Supervisor errors.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The OS refused to spawn the thread.
    #[error("failed to spawn processing thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// `join` was called before `start`.
    #[error("processing loop was never started")]
    NotStarted,

    /// The loop has already been joined.
    #[error("processing loop already joined")]
    AlreadyJoined,

    /// The loop thread panicked.
    #[error("processing loop panicked")]
    Panicked,
}

/// Starts the processing loop once and joins it at shutdown.
pub struct LoopSupervisor {
    task: Mutex<Option<LoopTask>>,
    handle: Mutex<Option<JoinHandle<LoopReport>>>,
    started: AtomicBool,
}

impl LoopSupervisor {
    /// Wrap the closure that runs the loop to completion.
    #[must_use]
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce() -> LoopReport + Send + 'static,
    {
        Self {
            task: Mutex::new(Some(Box::new(task))),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the loop thread unless it has already been started.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Spawn` if the thread cannot be created. The
    /// loop is lost in that case and cannot be started again.
    pub fn start(&self) -> Result<StartOutcome, SupervisorError> {
        let Some(task) = self.task.lock().take() else {
            return Ok(StartOutcome::AlreadyStarted);
        };

        let handle = thread::Builder::new()
            .name(PROCESSOR_THREAD_NAME.to_string())
            .spawn(task)?;

        *self.handle.lock() = Some(handle);
        self.started.store(true, Ordering::Release);
        tracing::debug!(thread = PROCESSOR_THREAD_NAME, "Processing loop started");
        Ok(StartOutcome::Started)
    }

    /// Whether the loop thread has been spawned.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the loop thread has run to completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
    }

    /// Wait for the loop thread and return its report.
    ///
    /// Blocks until the loop observes a stop, so a stop must have been
    /// requested (or be requested by another thread).
    ///
    /// # Errors
    ///
    /// Returns an error if the loop was never started, was already joined,
    /// or panicked.
    pub fn join(&self) -> Result<LoopReport, SupervisorError> {
        if !self.is_started() {
            return Err(SupervisorError::NotStarted);
        }

        let handle = self
            .handle
            .lock()
            .take()
            .ok_or(SupervisorError::AlreadyJoined)?;

        handle.join().map_err(|_| SupervisorError::Panicked)
    }
}

impl std::fmt::Debug for LoopSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopSupervisor")
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
