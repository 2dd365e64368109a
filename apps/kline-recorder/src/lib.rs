#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Kline Recorder - Market Data Capture
//!
//! Subscribes to Binance's combined kline WebSocket stream, hands every raw
//! frame to a single processing thread, and writes the collected close
//! prices to CSV exactly once when asked to stop.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types
//!   - `kline`: Raw payloads, decoded records, the accumulator
//!   - `subscription`: Kline topics and the combined-stream URL
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `EventDecoder` and `RecordSink`
//!   - `services`: Ingestion queue, shutdown controller, processing loop,
//!     loop supervisor, pipeline context
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket client and JSON decoder
//!   - `sink`: CSV writer
//!   - `console`: Operator command prompt
//!   - `signals`: SIGINT/SIGTERM relay
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──push──► IngestionQueue ──drain──► ProcessingLoop ──flush──► CSV
//!                           ▲                         ▲
//!      console / signal ────┴── ShutdownController ───┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core kline types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::kline::{Accumulator, KlineRecord, RawPayload};
pub use domain::subscription::{KlineTopic, StreamSubscription};

// Ports
pub use application::ports::{DecodeError, EventDecoder, RecordSink, SinkError};

// Pipeline
pub use application::services::{
    FlushOutcome, IngestionQueue, LoopPhase, LoopReport, Pipeline, PipelineSettings,
    PipelineStatus, ProcessingLoop, ShutdownController, StartOutcome, StopDrainPolicy,
    SupervisorError,
};

// Adapters
pub use infrastructure::binance::{
    FeedClientError, FeedStatus, KlineJsonDecoder, KlineStreamClient, KlineStreamClientConfig,
};
pub use infrastructure::console::{CommandConsole, CommandRegistry, CommandSpec, ConsoleExit};
pub use infrastructure::signals::InterruptRelay;
pub use infrastructure::sink::{CsvFileSink, format_local_timestamp, write_records};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedSettings, RecorderConfig, RuntimeSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
