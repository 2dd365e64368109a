//! Pipeline Context
//!
//! Owns everything the recorder's threads share: the ingestion queue, the
//! shutdown controller and the supervisor of the processing loop. One
//! instance is created at startup and handed around by `Arc`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::application::ports::{EventDecoder, RecordSink};
use crate::domain::kline::RawPayload;

use super::processing_loop::{DEFAULT_POLL_INTERVAL, LoopReport, ProcessingLoop, StopDrainPolicy};
use super::queue::IngestionQueue;
use super::shutdown::ShutdownController;
use super::supervisor::{LoopSupervisor, StartOutcome, SupervisorError};

/// Tunables for the processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Wait between cancellation checks.
    pub poll_interval: Duration,
    /// What to do with queued payloads at stop.
    pub stop_policy: StopDrainPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_policy: StopDrainPolicy::default(),
        }
    }
}

/// Coarse lifecycle of the processing loop as seen from outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    /// Not started yet.
    Idle,
    /// Thread spawned and collecting.
    Running,
    /// Thread has returned (records flushed or flush failed).
    Stopped,
}

impl LoopPhase {
    /// Phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Point-in-time snapshot for the console and the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// Payloads waiting to be drained.
    pub queue_depth: usize,
    /// Whether a stop has been requested or an interrupt received.
    pub stop_requested: bool,
    /// Processing loop lifecycle.
    pub loop_phase: LoopPhase,
}

/// Shared recorder context.
#[derive(Debug)]
pub struct Pipeline {
    queue: Arc<IngestionQueue>,
    shutdown: Arc<ShutdownController>,
    supervisor: LoopSupervisor,
}

impl Pipeline {
    /// Wire a queue, a shutdown controller and a not-yet-started loop.
    #[must_use]
    pub fn new<D, S>(decoder: D, sink: S, settings: PipelineSettings) -> Self
    where
        D: EventDecoder + 'static,
        S: RecordSink + 'static,
    {
        let queue = Arc::new(IngestionQueue::new());
        let shutdown = Arc::new(ShutdownController::new(Arc::clone(&queue)));

        let mut processing =
            ProcessingLoop::new(Arc::clone(&queue), Arc::clone(&shutdown), decoder, sink)
                .with_poll_interval(settings.poll_interval)
                .with_stop_policy(settings.stop_policy);
        let supervisor = LoopSupervisor::new(move || processing.run());

        Self {
            queue,
            shutdown,
            supervisor,
        }
    }

    /// The ingestion queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    /// The shutdown controller.
    #[must_use]
    pub const fn shutdown(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Hand one payload to the processing loop.
    pub fn push(&self, payload: impl Into<RawPayload>) {
        self.queue.push(payload.into());
    }

    /// Request a stop. Returns `true` for the first request only.
    pub fn request_stop(&self) -> bool {
        self.shutdown.request_stop()
    }

    /// Start the processing loop on its own thread.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Spawn` if the thread cannot be created.
    pub fn start(&self) -> Result<StartOutcome, SupervisorError> {
        self.supervisor.start()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        let loop_phase = if self.supervisor.is_finished() {
            LoopPhase::Stopped
        } else if self.supervisor.is_started() {
            LoopPhase::Running
        } else {
            LoopPhase::Idle
        };

        PipelineStatus {
            queue_depth: self.queue.len(),
            stop_requested: self.shutdown.is_stop_requested(),
            loop_phase,
        }
    }

    /// Request a stop and wait for the loop to flush.
    ///
    /// A loop that was never started is started first so it observes the
    /// stop, applies the drain policy and flushes exactly once. Blocks the
    /// calling thread for at most one poll interval plus the flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop thread cannot be spawned, panicked or
    /// was already joined.
    pub fn stop_and_join(&self) -> Result<LoopReport, SupervisorError> {
        self.request_stop();
        self.supervisor.start()?;
        self.supervisor.join()
    }
}
