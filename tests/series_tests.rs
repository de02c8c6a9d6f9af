//! Launch series integration tests
//!
//! ```bash
//! cargo test --test series_tests
//! ```

mod common;

use common::{ProbeTestContext, bounded_launch};
use perf_probe::{
    ProbeError,
    config::SeriesConfig,
    host::SimulatedHost,
    model::{CompletionSignal, FailureKind},
};

fn series_config(iterations: usize) -> SeriesConfig {
    SeriesConfig {
        iterations,
        delay_ms: 1_000,
        fail_ratio: 0.2,
    }
}

/// Every iteration launches cold because the app is killed in between
#[tokio::test(start_paused = true)]
async fn test_cold_load_time_series() {
    let ctx = ProbeTestContext::with_host(SimulatedHost::new().with_reported_load(212.5));
    let series = ctx.series(bounded_launch(CompletionSignal::LoadTime), series_config(10));

    let summary = series.run("Gallery", ctx.sink.clone()).await.unwrap();

    let cold = &summary.metrics["cold_load_time"];
    assert_eq!(summary.metrics.len(), 1);
    assert_eq!(cold.count(), 10);
    assert_eq!(cold.median, 212.5);
    assert_eq!(ctx.sim.launches().len(), 10);
    assert_eq!(ctx.reports().len(), 10);
    assert!(ctx.reports().iter().all(|r| r.is_success()));
}

/// Failures are retried until the budget of floor(iterations * ratio) is spent
#[tokio::test(start_paused = true)]
async fn test_budget_allows_retries() {
    let ctx = ProbeTestContext::with_host(SimulatedHost::new().with_failing_launches(6));
    let series = ctx.series(bounded_launch(CompletionSignal::FirstPaint), series_config(30));

    let summary = series.run("Calculator", ctx.sink.clone()).await.unwrap();

    assert_eq!(summary.failures, 6);
    assert_eq!(summary.attempts, 36);
    assert_eq!(summary.metrics["time_to_paint"].count(), 30);
}

/// One failure over the budget aborts the series
#[tokio::test(start_paused = true)]
async fn test_budget_exceeded() {
    let ctx = ProbeTestContext::with_host(SimulatedHost::new().with_failing_launches(7));
    let series = ctx.series(bounded_launch(CompletionSignal::FirstPaint), series_config(30));

    let err = series.run("Calculator", ctx.sink.clone()).await.unwrap_err();

    assert!(matches!(
        err,
        ProbeError::SeriesAborted {
            failures: 7,
            budget: 6,
            ..
        }
    ));
    assert_eq!(
        ctx.failure_kinds(),
        vec![Some(FailureKind::HostCallbackError); 7]
    );
}

/// A silent host burns the budget with launch timeouts
#[tokio::test(start_paused = true)]
async fn test_silent_host_aborts_with_timeouts() {
    let ctx = ProbeTestContext::with_host(SimulatedHost::new().without_events());
    let series = ctx.series(bounded_launch(CompletionSignal::FirstPaint), series_config(5));

    let err = series.run("Clock", ctx.sink.clone()).await.unwrap_err();

    assert!(matches!(err, ProbeError::SeriesAborted { failures: 2, budget: 1, .. }));
    assert_eq!(ctx.failure_kinds(), vec![Some(FailureKind::LaunchTimeout); 2]);
}
