//! Kline Recorder Binary
//!
//! Records Binance kline close prices until stopped, then writes them to CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kline-recorder
//! ```
//!
//! Stop with Ctrl+C, SIGTERM, or `stop` at the console prompt. Further
//! signals during shutdown are ignored until the CSV has been written.
//!
//! # Environment Variables
//!
//! - `BINANCE_STREAM_BASE_URL`: Stream host (default: `wss://stream.binance.com:9443`)
//! - `RECORDER_SYMBOLS`: Comma-separated pairs (default: btcusdt,ethusdt,bnbusdt,xrpusdt,ltcusdt)
//! - `RECORDER_INTERVAL`: Kline interval (default: 1m)
//! - `RECORDER_OUTPUT_PATH`: CSV destination (default: `kline_output.csv`)
//! - `RECORDER_POLL_INTERVAL_MS`: Processing loop poll interval (default: 100)
//! - `RECORDER_STOP_POLICY`: drain | discard (default: drain)
//! - `RECORDER_CONNECT_GRACE_SECS`: Wait before starting workers (default: 3)
//! - `RECORDER_CONSOLE`: Interactive console on stdin (default: true)
//! - `RECORDER_AUTOSTART`: Start the processing loop immediately (default: true)
//! - `RECORDER_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `RECORDER_INTERRUPT_POLL_MS`: Signal relay poll interval (default: 50)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use kline_recorder::infrastructure::telemetry;
use kline_recorder::{
    CommandConsole, CsvFileSink, FeedStatus, FlushOutcome, HealthServer, HealthServerState,
    InterruptRelay, KlineJsonDecoder, KlineStreamClient, KlineStreamClientConfig, LoopReport,
    Pipeline, RecorderConfig, StartOutcome, init_metrics,
};
use tokio_util::sync::CancellationToken;

/// How long to wait for the feed task to close its socket at shutdown.
const FEED_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Kline Recorder");
    if !provider_installed {
        tracing::debug!("rustls crypto provider already installed");
    }

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    let config = RecorderConfig::from_env()?;
    log_config(&config);

    let pipeline = Arc::new(Pipeline::new(
        KlineJsonDecoder::new(),
        CsvFileSink::new(&config.output_path),
        config.pipeline,
    ));
    let shutdown = Arc::clone(pipeline.shutdown());
    let shutdown_token = shutdown.cancellation_token();

    let _interrupt_relay = InterruptRelay::install(shutdown, config.runtime.interrupt_poll)?;

    // Spawn the feed client
    let feed_status = Arc::new(FeedStatus::new());
    let feed_client = Arc::new(KlineStreamClient::new(
        KlineStreamClientConfig::new(&config.feed.base_url, &config.feed.subscription()),
        Arc::clone(pipeline.queue()),
        Arc::clone(&feed_status),
        shutdown_token.clone(),
    ));
    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Kline stream client error");
        }
    });

    // Spawn health server
    if config.runtime.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&pipeline),
            Arc::clone(&feed_status),
        ));
        let health_server = HealthServer::new(
            config.runtime.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    await_connect_grace(&shutdown_token, config.runtime.connect_grace).await;

    if config.runtime.autostart {
        if pipeline.start()? == StartOutcome::Started {
            tracing::info!("Processing loop autostarted");
        }
    } else if !config.runtime.console_enabled {
        tracing::warn!("Autostart and console both disabled, records are decoded only at stop");
    }

    if config.runtime.console_enabled {
        CommandConsole::new(Arc::clone(&pipeline)).spawn()?;
    }

    tracing::info!("Kline recorder ready");

    shutdown_token.cancelled().await;

    let joiner = Arc::clone(&pipeline);
    let report = tokio::task::spawn_blocking(move || joiner.stop_and_join()).await??;
    log_report(&report);

    if tokio::time::timeout(FEED_CLOSE_TIMEOUT, feed_task).await.is_err() {
        tracing::warn!(
            timeout_secs = FEED_CLOSE_TIMEOUT.as_secs(),
            "Kline stream did not close in time"
        );
    }

    tracing::info!("Kline recorder stopped");
    Ok(())
}

/// Give the feed time to connect before the workers start.
async fn await_connect_grace(shutdown_token: &CancellationToken, grace: Duration) {
    if grace.is_zero() {
        return;
    }
    tracing::info!(grace_secs = grace.as_secs(), "Waiting for stream connection");
    tokio::select! {
        () = shutdown_token.cancelled() => {}
        () = tokio::time::sleep(grace) => {}
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RecorderConfig) {
    tracing::info!(
        symbols = ?config.feed.symbols,
        interval = %config.feed.interval,
        output = %config.output_path.display(),
        poll_interval_ms = config.pipeline.poll_interval.as_millis(),
        stop_policy = config.pipeline.stop_policy.as_str(),
        console = config.runtime.console_enabled,
        health_port = config.runtime.health_port,
        "Configuration loaded"
    );
    tracing::debug!(stream_url = %config.feed.stream_url(), "WebSocket endpoint");
}

/// Log the processing loop's final report.
fn log_report(report: &LoopReport) {
    tracing::info!(
        payloads_drained = report.payloads_drained,
        records_decoded = report.records_decoded,
        decode_failures = report.decode_failures,
        payloads_discarded = report.payloads_discarded,
        "Processing loop finished"
    );
    match &report.flush {
        FlushOutcome::Written { rows } => tracing::info!(rows, "CSV file written"),
        FlushOutcome::Failed { reason } => {
            tracing::error!(reason = %reason, "CSV file not written");
        }
        FlushOutcome::AlreadyFlushed => tracing::debug!("Records were already flushed"),
    }
}
