//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process plumbing around them.

/// Binance combined-stream client and kline decoder.
pub mod binance;

/// CSV record sink.
pub mod sink;

/// Interactive operator console.
pub mod console;

/// OS signal to shutdown relay.
pub mod signals;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
