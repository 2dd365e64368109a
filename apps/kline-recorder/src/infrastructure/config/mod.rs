//! Configuration Module
//!
//! Configuration loading for the recorder.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_BASE_URL, DEFAULT_INTERVAL, DEFAULT_OUTPUT_PATH, DEFAULT_SYMBOLS,
    FeedSettings, RecorderConfig, RuntimeSettings,
};
