//! Interrupt Integration Test
//!
//! Raises real SIGTERMs against the test process and checks that the
//! recorder stops, survives repeated signals during teardown, and still
//! writes its CSV. Kept in its own binary so the installed handlers do not
//! leak into other tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kline_recorder::{
    CsvFileSink, FlushOutcome, InterruptRelay, KlineJsonDecoder, Pipeline, PipelineSettings,
    StopDrainPolicy,
};
use signal_hook::consts::SIGTERM;

const FRAME: &str = r#"{"stream":"ethusdt@kline_1m","data":{"e":"kline","E":1700000060000,"s":"ETHUSDT","k":{"t":1700000040000,"i":"1m","c":"2050.10","x":true}}}"#;

#[test]
fn sigterm_stops_and_repeated_sigterms_do_not_abort_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kline_output.csv");
    let pipeline = Arc::new(Pipeline::new(
        KlineJsonDecoder::new(),
        CsvFileSink::new(&path),
        PipelineSettings {
            poll_interval: Duration::from_millis(10),
            stop_policy: StopDrainPolicy::DrainPending,
        },
    ));
    let token = pipeline.shutdown().cancellation_token();
    let relay =
        InterruptRelay::install(Arc::clone(pipeline.shutdown()), Duration::from_millis(5)).unwrap();

    pipeline.start().unwrap();
    pipeline.push(FRAME);

    signal_hook::low_level::raise(SIGTERM).unwrap();

    let start = Instant::now();
    while !token.is_cancelled() && start.elapsed() < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(token.is_cancelled());
    assert!(pipeline.shutdown().is_stop_broadcast());

    // Operator keeps pressing Ctrl+C while the recorder winds down.
    let repeater = thread::spawn(|| {
        for _ in 0..5 {
            signal_hook::low_level::raise(SIGTERM).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
    });
    let report = pipeline.stop_and_join().unwrap();
    repeater.join().unwrap();
    signal_hook::low_level::raise(SIGTERM).unwrap();
    relay.uninstall();

    assert_eq!(report.flush, FlushOutcome::Written { rows: 1 });
    let csv = std::fs::read_to_string(&path).unwrap();
    assert!(csv.starts_with("timestamp,symbol,close_price\n"));
    assert!(csv.ends_with(",ETHUSDT,2050.1\n"));
}
