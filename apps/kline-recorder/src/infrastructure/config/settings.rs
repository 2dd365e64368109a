//! Recorder Configuration Settings
//!
//! Configuration types for the kline recorder, loaded from environment
//! variables. Unparseable values fall back to their defaults; only a
//! configuration that cannot work (no symbols, zero poll interval) is an
//! error.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{PipelineSettings, StopDrainPolicy};
use crate::domain::subscription::StreamSubscription;

/// Default combined-stream host.
pub const DEFAULT_BASE_URL: &str = "wss://stream.binance.com:9443";

/// Default trading pairs.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["btcusdt", "ethusdt", "bnbusdt", "xrpusdt", "ltcusdt"];

/// Default kline interval.
pub const DEFAULT_INTERVAL: &str = "1m";

/// Default CSV destination.
pub const DEFAULT_OUTPUT_PATH: &str = "kline_output.csv";

/// Kline feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// WebSocket host, without the `/stream` path.
    pub base_url: String,
    /// Lower-case trading pairs.
    pub symbols: Vec<String>,
    /// Kline interval, e.g. `1m`.
    pub interval: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
            interval: DEFAULT_INTERVAL.to_string(),
        }
    }
}

impl FeedSettings {
    /// Topics to subscribe to.
    #[must_use]
    pub fn subscription(&self) -> StreamSubscription {
        StreamSubscription::for_symbols(self.symbols.as_slice(), &self.interval)
    }

    /// Full combined-stream URL.
    #[must_use]
    pub fn stream_url(&self) -> String {
        self.subscription().combined_stream_url(&self.base_url)
    }
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Wait after starting the feed before starting the workers.
    pub connect_grace: Duration,
    /// Run the interactive console on stdin.
    pub console_enabled: bool,
    /// Start the processing loop without waiting for `start`.
    pub autostart: bool,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
    /// How often the interrupt relay checks the signal flag.
    pub interrupt_poll: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            connect_grace: Duration::from_secs(3),
            console_enabled: true,
            autostart: true,
            health_port: 8083,
            interrupt_poll: Duration::from_millis(50),
        }
    }
}

/// Complete recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Feed settings.
    pub feed: FeedSettings,
    /// Processing loop settings.
    pub pipeline: PipelineSettings,
    /// CSV destination.
    pub output_path: PathBuf,
    /// Process-level settings.
    pub runtime: RuntimeSettings,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            feed: FeedSettings::default(),
            pipeline: PipelineSettings::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl RecorderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty or the poll interval is
    /// zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RecorderConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);
        let defaults = Self::default();

        let symbols = match env.get("RECORDER_SYMBOLS") {
            Some(raw) => {
                let symbols = parse_symbols(&raw);
                if symbols.is_empty() {
                    return Err(ConfigError::EmptyValue("RECORDER_SYMBOLS".to_string()));
                }
                symbols
            }
            None => defaults.feed.symbols,
        };

        let feed = FeedSettings {
            base_url: env
                .get("BINANCE_STREAM_BASE_URL")
                .unwrap_or(defaults.feed.base_url),
            symbols,
            interval: env
                .get("RECORDER_INTERVAL")
                .unwrap_or(defaults.feed.interval),
        };

        let poll_interval =
            env.positive_millis("RECORDER_POLL_INTERVAL_MS", defaults.pipeline.poll_interval)?;

        let pipeline = PipelineSettings {
            poll_interval,
            stop_policy: env
                .get("RECORDER_STOP_POLICY")
                .map(|s| StopDrainPolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        let runtime = RuntimeSettings {
            connect_grace: env.duration_secs(
                "RECORDER_CONNECT_GRACE_SECS",
                defaults.runtime.connect_grace,
            ),
            console_enabled: env.bool("RECORDER_CONSOLE", defaults.runtime.console_enabled),
            autostart: env.bool("RECORDER_AUTOSTART", defaults.runtime.autostart),
            health_port: env.parse("RECORDER_HEALTH_PORT", defaults.runtime.health_port),
            interrupt_poll: env
                .positive_millis("RECORDER_INTERRUPT_POLL_MS", defaults.runtime.interrupt_poll)?,
        };

        Ok(Self {
            feed,
            pipeline,
            output_path: env
                .get("RECORDER_OUTPUT_PATH")
                .map_or(defaults.output_path, PathBuf::from),
            runtime,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable resolved to nothing usable.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A duration that must be positive was zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroDuration(String),
}

// =============================================================================
// Parsing helpers
// =============================================================================

struct EnvSource<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    /// Trimmed, non-empty value.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    /// Millisecond duration that must not be zero.
    fn positive_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let duration = self.duration_millis(key, default);
        if duration.is_zero() {
            return Err(ConfigError::ZeroDuration(key.to_string()));
        }
        Ok(duration)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
