//! Binance Combined-Stream Message Types
//!
//! Wire format types for the combined kline stream. Every frame is wrapped
//! in an envelope naming the stream it came from:
//!
//! ```json
//! {
//!   "stream": "btcusdt@kline_1m",
//!   "data": {
//!     "e": "kline", "E": 1700000000123, "s": "BTCUSDT",
//!     "k": { "t": 1699999980000, "i": "1m", "c": "43250.55", "x": false }
//!   }
//! }
//! ```
//!
//! Required fields are modelled as `Option` so the decoder can name exactly
//! which one is missing instead of surfacing a generic serde error.
//!
//! # References
//!
//! - [Kline/Candlestick Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#klinecandlestick-streams)

use serde::Deserialize;

/// Outer envelope of a combined-stream frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CombinedStreamEnvelope {
    /// Stream name, e.g. `btcusdt@kline_1m`.
    #[serde(default)]
    pub stream: Option<String>,
    /// Event body.
    #[serde(default)]
    pub data: Option<KlineEvent>,
}

/// A kline update event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlineEvent {
    /// Event type, `kline` for this stream.
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    /// Event time in epoch milliseconds.
    #[serde(rename = "E", default)]
    pub event_time_ms: Option<i64>,
    /// Upper-case trading pair, e.g. `BTCUSDT`.
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    /// Candle body.
    #[serde(rename = "k", default)]
    pub kline: Option<KlinePayload>,
}

/// The candle inside a kline event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlinePayload {
    /// Candle open time in epoch milliseconds.
    #[serde(rename = "t", default)]
    pub open_time_ms: Option<i64>,
    /// Interval, e.g. `1m`.
    #[serde(rename = "i", default)]
    pub interval: Option<String>,
    /// Close price as a decimal string, e.g. `"43250.55"`.
    #[serde(rename = "c", default)]
    pub close: Option<String>,
    /// Whether the candle is final.
    #[serde(rename = "x", default)]
    pub is_closed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_envelope() {
        let json = r#"{
            "stream": "btcusdt@kline_1m",
            "data": {
                "e": "kline",
                "E": 1700000000123,
                "s": "BTCUSDT",
                "k": {"t": 1699999980000, "i": "1m", "c": "43250.55", "x": false, "o": "43200.00"}
            }
        }"#;

        let envelope: CombinedStreamEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.stream.as_deref(), Some("btcusdt@kline_1m"));

        let data = envelope.data.unwrap();
        assert_eq!(data.event_type.as_deref(), Some("kline"));
        assert_eq!(data.event_time_ms, Some(1_700_000_000_123));
        assert_eq!(data.symbol.as_deref(), Some("BTCUSDT"));

        let kline = data.kline.unwrap();
        assert_eq!(kline.interval.as_deref(), Some("1m"));
        assert_eq!(kline.close.as_deref(), Some("43250.55"));
        assert_eq!(kline.is_closed, Some(false));
    }

    #[test]
    fn missing_fields_become_none() {
        let envelope: CombinedStreamEnvelope =
            serde_json::from_str(r#"{"data": {"s": "ETHUSDT", "k": {}}}"#).unwrap();
        assert!(envelope.stream.is_none());

        let data = envelope.data.unwrap();
        assert!(data.event_time_ms.is_none());
        assert!(data.kline.unwrap().close.is_none());
    }

    #[test]
    fn numeric_close_does_not_deserialize() {
        assert!(serde_json::from_str::<KlinePayload>(r#"{"c": 1.25}"#).is_err());
    }
}
