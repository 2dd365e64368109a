//! Binance WebSocket Adapters
//!
//! - **client**: combined kline stream transport, pushes raw frames
//! - **codec**: JSON frame to `KlineRecord` decoding
//! - **messages**: wire types for the combined-stream envelope

pub mod client;
pub mod codec;
pub mod messages;

pub use client::{
    FeedClientError, FeedStatus, FeedStatusSnapshot, KlineStreamClient, KlineStreamClientConfig,
};
pub use codec::KlineJsonDecoder;
pub use messages::{CombinedStreamEnvelope, KlineEvent, KlinePayload};
