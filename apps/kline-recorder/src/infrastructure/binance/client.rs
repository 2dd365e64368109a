//! Kline Stream Client
//!
//! Connects to Binance's combined-stream endpoint and pushes every text
//! frame, undecoded, into the ingestion queue. Decoding happens on the
//! processing thread; this task does nothing but transport.
//!
//! # Stream URL
//!
//! `wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1m/ethusdt@kline_1m`
//!
//! # Lifecycle
//!
//! One connection per process. When the connection ends (server close,
//! transport error) the task logs and returns; the rest of the recorder
//! keeps running until it is stopped. Cancelling the token closes the
//! socket and returns `Ok(())`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::services::IngestionQueue;
use crate::domain::kline::RawPayload;
use crate::domain::subscription::StreamSubscription;
use crate::infrastructure::metrics::{self, FeedErrorKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end the feed task.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// No stream to subscribe to.
    #[error("no kline streams configured")]
    NoStreams,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FeedClientError {
    const fn kind(&self) -> FeedErrorKind {
        match self {
            Self::NoStreams => FeedErrorKind::Connect,
            Self::WebSocket(_) => FeedErrorKind::Transport,
            Self::ConnectionClosed => FeedErrorKind::Closed,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the kline stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineStreamClientConfig {
    /// Full combined-stream URL, query included.
    pub url: String,
    /// Number of subscribed topics.
    pub topic_count: usize,
}

impl KlineStreamClientConfig {
    /// Build the combined-stream URL for a subscription.
    #[must_use]
    pub fn new(base_url: &str, subscription: &StreamSubscription) -> Self {
        Self {
            url: subscription.combined_stream_url(base_url),
            topic_count: subscription.topics().len(),
        }
    }
}

// =============================================================================
// Feed Status
// =============================================================================

/// Connection state shared with the health endpoint.
#[derive(Debug, Default)]
pub struct FeedStatus {
    connected: AtomicBool,
    messages_received: AtomicU64,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
}

/// Serializable view of `FeedStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatusSnapshot {
    /// Whether the WebSocket is open.
    pub connected: bool,
    /// Text frames received since startup.
    pub messages_received: u64,
    /// When the last frame arrived.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl FeedStatus {
    /// Create a disconnected status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection open or closed.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        metrics::set_feed_connected(connected);
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Count one received frame.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.write() = Some(Utc::now());
    }

    /// Frames received since startup.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            connected: self.is_connected(),
            messages_received: self.messages_received(),
            last_message_at: *self.last_message_at.read(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// WebSocket client for the combined kline stream.
pub struct KlineStreamClient {
    config: KlineStreamClientConfig,
    queue: Arc<IngestionQueue>,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl KlineStreamClient {
    /// Create a new client.
    #[must_use]
    pub const fn new(
        config: KlineStreamClientConfig,
        queue: Arc<IngestionQueue>,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            queue,
            status,
            cancel,
        }
    }

    /// Connect and forward frames until cancelled or disconnected.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError` if the connection cannot be established or
    /// ends for any reason other than cancellation. There is no reconnect.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        if self.cancel.is_cancelled() {
            tracing::info!("Kline stream client cancelled before connecting");
            return Ok(());
        }
        if self.config.topic_count == 0 {
            return Err(FeedClientError::NoStreams);
        }

        let result = self.connect_and_run().await;
        self.status.set_connected(false);

        match &result {
            Ok(()) => tracing::info!("Kline stream closed"),
            Err(e) => {
                metrics::record_feed_error(e.kind());
                tracing::warn!(error = %e, "Kline stream ended, not reconnecting");
            }
        }
        result
    }

    /// Connect to WebSocket and run until error or cancellation.
    async fn connect_and_run(&self) -> Result<(), FeedClientError> {
        tracing::info!(
            url = %self.config.url,
            topics = self.config.topic_count,
            "Connecting to kline stream"
        );

        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            connected = tokio_tungstenite::connect_async(self.config.url.as_str()) => connected?.0,
        };

        self.status.set_connected(true);
        tracing::info!("Kline stream connected");

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not sent");
                    }
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.status.record_message();
                            self.queue.push(RawPayload::new(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Pong and binary frames carry no klines
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for KlineStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlineStreamClient")
            .field("config", &self.config)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
