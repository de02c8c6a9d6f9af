//! Measurement probes
//!
//! - [`LaunchProbe`]: time from launch request to a completion signal
//! - [`FrameSampler`]: periodic timestamps reduced to a frame rate
//! - [`LaunchSeries`]: repeated launch probes with a failure budget
//!
//! Every probe invocation reports through its own [`FinishOnce`] guard, so
//! the harness sink sees exactly one result or failure per invocation.

use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;

use crate::{
    error::{ProbeError, ProbeOutcome},
    model::{ProbeResult, Report},
    report::FinishOnce,
};

pub mod fps;
pub mod launch;
pub mod series;
pub mod window;

pub use fps::FrameSampler;
pub use launch::LaunchProbe;
pub use series::{LaunchSeries, SeriesSummary};
pub use window::{MeasurementWindow, Sample, SealedWindow};

/// Runs `probe`, turning panics into [`ProbeError::HostCallbackError`]
pub(crate) async fn contain<T, F>(context: &str, probe: F) -> ProbeOutcome<T>
where
    F: Future<Output = ProbeOutcome<T>>,
{
    match AssertUnwindSafe(probe).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(ProbeError::host(context, panic_message(panic.as_ref()))),
    }
}

/// Hands the outcome to the guard and passes it through
pub(crate) fn report<T>(
    guard: &FinishOnce,
    app: &str,
    outcome: ProbeOutcome<T>,
    to_result: impl FnOnce(&T) -> ProbeResult,
) -> ProbeOutcome<T> {
    match &outcome {
        Ok(value) => guard.finish(Report::success(to_result(value))),
        Err(error) => guard.finish(Report::failure(error, Some(app))),
    };
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_contain_passes_outcome_through() {
        let outcome = contain("probe", async { Ok::<_, ProbeError>(7) }).await;
        assert_eq!(outcome.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_contain_converts_panic() {
        let exploded = true;
        let outcome: ProbeOutcome<()> = contain("tick", async move {
            if exploded {
                panic!("host exploded");
            }
            Ok(())
        })
        .await;
        match outcome {
            Err(ProbeError::HostCallbackError { context, reason }) => {
                assert_eq!(context, "tick");
                assert_eq!(reason, "host exploded");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
