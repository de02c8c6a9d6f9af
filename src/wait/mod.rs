//! Condition polling and event races
//!
//! - [`ConditionWaiter`]: polls an async predicate at a fixed interval until it
//!   holds or the wait times out
//! - [`EventRace`]: resolves on the first of a host event, a polled condition,
//!   or an already-satisfied precondition
//!
//! Both are plain futures: the caller's continuation is whatever follows the
//! `.await`, and dropping the future cancels its timer and listener.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeOutcome};

pub mod race;

pub use race::{EventRace, RaceOutcome, RaceState, RaceWinner};

/// Default poll interval, roughly one host tick
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on a wait
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Polling parameters for a [`ConditionWaiter`]
///
/// A timeout is set unless [`WaitSpec::unbounded`] is called explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    poll_interval: Duration,
    timeout:       Option<Duration>,
}

impl WaitSpec {
    /// Polls every `poll_interval`, bounded by [`DEFAULT_WAIT_TIMEOUT`]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
        }
    }

    /// Sets the bound on the whole wait
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes the bound; the wait may never finish
    pub fn unbounded(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Interval between predicate evaluations
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Bound on the wait, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Repeatedly evaluates a predicate until it holds
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionWaiter {
    spec: WaitSpec,
}

impl ConditionWaiter {
    /// Creates a waiter with the given polling parameters
    pub fn new(spec: WaitSpec) -> Self {
        Self { spec }
    }

    /// The waiter's polling parameters
    pub fn spec(&self) -> WaitSpec {
        self.spec
    }

    /// Evaluates `predicate` now and then once per poll interval.
    ///
    /// Returns the time spent waiting once the predicate yields `true`; the
    /// predicate is not evaluated again after that. Fails with
    /// [`ProbeError::WaitTimeout`] when the bound elapses, or with the
    /// predicate's own error. The poll timer is dropped on every exit path.
    pub async fn wait<F, Fut>(&self, mut predicate: F) -> ProbeOutcome<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProbeOutcome<bool>>,
    {
        let started = Instant::now();
        let mut ticker = interval(self.spec.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let polling = async {
            let mut polls = 0u64;
            loop {
                ticker.tick().await;
                polls += 1;
                if predicate().await? {
                    debug!("Condition satisfied after {} poll(s)", polls);
                    return Ok::<(), ProbeError>(());
                }
            }
        };

        match self.spec.timeout {
            Some(bound) => match timeout(bound, polling).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!("Condition not satisfied within {:?}", bound);
                    return Err(ProbeError::WaitTimeout {
                        waited_ms: bound.as_millis() as u64,
                    });
                }
            },
            None => {
                warn!("Waiting on a condition without a timeout");
                polling.await?;
            }
        }

        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting(
        calls: &Arc<AtomicUsize>,
        true_from: usize,
    ) -> impl FnMut() -> futures::future::Ready<ProbeOutcome<bool>> {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            futures::future::ready(Ok(n >= true_from))
        }
    }

    #[test]
    fn test_wait_spec_defaults_are_bounded() {
        let spec = WaitSpec::default();
        assert_eq!(spec.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(spec.timeout(), Some(DEFAULT_WAIT_TIMEOUT));
        assert_eq!(spec.unbounded().timeout(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediately_true_predicate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = ConditionWaiter::default();

        let waited = waiter.wait(counting(&calls, 1)).await.unwrap();
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_polling_after_satisfaction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = ConditionWaiter::new(WaitSpec::new(Duration::from_millis(100)));

        let waited = waiter.wait(counting(&calls, 3)).await.unwrap();
        assert_eq!(waited, Duration::from_millis(200));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = WaitSpec::new(Duration::from_millis(100)).with_timeout(Duration::from_millis(450));
        let waiter = ConditionWaiter::new(spec);

        let err = waiter.wait(counting(&calls, usize::MAX)).await.unwrap_err();
        assert!(matches!(err, ProbeError::WaitTimeout { waited_ms: 450 }));

        let evaluated = calls.load(Ordering::SeqCst);
        assert_eq!(evaluated, 5);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), evaluated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_propagates() {
        let waiter = ConditionWaiter::default();
        let err = waiter
            .wait(|| async { Err::<bool, _>(ProbeError::host("predicate", "registry gone")) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::HostCallbackError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_wait_still_resolves() {
        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = ConditionWaiter::new(WaitSpec::new(Duration::from_millis(10)).unbounded());

        let waited = waiter.wait(counting(&calls, 50)).await.unwrap();
        assert_eq!(waited, Duration::from_millis(490));
    }
}
