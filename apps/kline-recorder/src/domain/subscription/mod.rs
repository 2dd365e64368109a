//! Stream Subscription Types
//!
//! Describes which kline topics the recorder listens to and how they are
//! multiplexed onto a single combined-stream endpoint.
//!
//! # Topic Format
//!
//! ```text
//! <lowercase symbol>@kline_<interval>      e.g. btcusdt@kline_1m
//! ```
//!
//! Several topics are joined with `/` into the `streams` query parameter of
//! the combined endpoint.

use std::fmt;

/// A single symbol + interval kline topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KlineTopic {
    symbol: String,
    interval: String,
}

impl KlineTopic {
    /// Create a topic. The symbol is normalised to lowercase.
    #[must_use]
    pub fn new(symbol: &str, interval: &str) -> Self {
        Self {
            symbol: symbol.trim().to_lowercase(),
            interval: interval.trim().to_string(),
        }
    }

    /// Lowercase symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Kline interval, e.g. `1m`.
    #[must_use]
    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// Stream name as used on the wire.
    #[must_use]
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.symbol, self.interval)
    }
}

impl fmt::Display for KlineTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@kline_{}", self.symbol, self.interval)
    }
}

/// The set of topics multiplexed onto one connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSubscription {
    topics: Vec<KlineTopic>,
}

impl StreamSubscription {
    /// Build a subscription for every symbol at the same interval.
    ///
    /// Blank symbols and duplicates are skipped; order is preserved.
    #[must_use]
    pub fn for_symbols<S: AsRef<str>>(symbols: &[S], interval: &str) -> Self {
        let mut topics: Vec<KlineTopic> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = symbol.as_ref();
            if symbol.trim().is_empty() {
                continue;
            }
            let topic = KlineTopic::new(symbol, interval);
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        Self { topics }
    }

    /// Subscribed topics in order.
    #[must_use]
    pub fn topics(&self) -> &[KlineTopic] {
        &self.topics
    }

    /// Whether no topic is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// The `streams` query value: topic names joined with `/`.
    #[must_use]
    pub fn streams_param(&self) -> String {
        self.topics
            .iter()
            .map(KlineTopic::stream_name)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Full combined-stream URL for the given base endpoint.
    #[must_use]
    pub fn combined_stream_url(&self, base_url: &str) -> String {
        format!(
            "{}/stream?streams={}",
            base_url.trim_end_matches('/'),
            self.streams_param()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_lowercased() {
        let topic = KlineTopic::new("BTCUSDT", "1m");
        assert_eq!(topic.stream_name(), "btcusdt@kline_1m");
        assert_eq!(topic.to_string(), "btcusdt@kline_1m");
    }

    #[test]
    fn streams_are_joined_with_slash() {
        let sub = StreamSubscription::for_symbols(&["btcusdt", "ethusdt", "bnbusdt"], "1m");
        assert_eq!(
            sub.streams_param(),
            "btcusdt@kline_1m/ethusdt@kline_1m/bnbusdt@kline_1m"
        );
    }

    #[test]
    fn combined_url_trims_trailing_slash() {
        let sub = StreamSubscription::for_symbols(&["btcusdt", "ethusdt"], "1m");
        assert_eq!(
            sub.combined_stream_url("wss://stream.binance.com:9443/"),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1m/ethusdt@kline_1m"
        );
    }

    #[test]
    fn blanks_and_duplicates_are_skipped() {
        let sub = StreamSubscription::for_symbols(&["btcusdt", " ", "BTCUSDT", "ethusdt"], "5m");
        assert_eq!(sub.topics().len(), 2);
        assert_eq!(sub.topics()[1].symbol(), "ethusdt");
        assert_eq!(sub.topics()[1].interval(), "5m");
    }

    #[test]
    fn empty_subscription() {
        let sub = StreamSubscription::for_symbols::<&str>(&[], "1m");
        assert!(sub.is_empty());
        assert_eq!(sub.streams_param(), "");
    }
}
