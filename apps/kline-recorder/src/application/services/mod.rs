//! Application Services
//!
//! The ingestion-and-drain pipeline and its cooperative shutdown.
//!
//! - `IngestionQueue`: FIFO hand-off from the feed to the processing thread
//! - `ShutdownController`: write-once stop flag with broadcast
//! - `ProcessingLoop`: drains, decodes, accumulates, flushes once
//! - `LoopSupervisor`: runs the loop on a named thread, at most once
//! - `Pipeline`: the shared context tying the above together

/// Ingestion queue between producer and consumer threads.
pub mod queue;

/// Process-wide stop flag and broadcast.
pub mod shutdown;

/// Consumer state machine.
pub mod processing_loop;

/// Thread ownership for the processing loop.
pub mod supervisor;

/// Shared recorder context.
pub mod pipeline;

pub use pipeline::{LoopPhase, Pipeline, PipelineSettings, PipelineStatus};
pub use processing_loop::{
    BatchOutcome, DEFAULT_POLL_INTERVAL, FlushOutcome, LoopReport, LoopState, ProcessingLoop,
    StopDrainPolicy,
};
pub use queue::IngestionQueue;
pub use shutdown::ShutdownController;
pub use supervisor::{LoopSupervisor, PROCESSOR_THREAD_NAME, StartOutcome, SupervisorError};
