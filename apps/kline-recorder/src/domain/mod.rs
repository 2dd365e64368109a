//! Domain Layer - Core capture types.
//!
//! This layer contains the record and subscription types with no
//! knowledge of threads, transports or storage.

/// Raw payloads, decoded kline records and the accumulator.
pub mod kline;

/// Kline topic naming and combined-stream multiplexing.
pub mod subscription;
