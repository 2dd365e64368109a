//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the concurrent pipeline and the port interfaces
//! through which it decodes payloads and persists records.

/// Port interfaces for decoding and persistence.
pub mod ports;

/// Queue, shutdown, processing loop and pipeline context.
pub mod services;
