//! First-signal-wins race between a host event and a polled condition
//!
//! A race is armed before the host action it observes, so the listener is in
//! place when the action fires its event:
//!
//! ```text
//! arm() ──► Waiting ──resolve()/first signal──► Resolved
//!   └─ already satisfied ──────────────────────► Resolved
//! ```
//!
//! `resolve` consumes the race, so the only states a caller can observe
//! are the two above.
//!
//! Resolution drops the losing path: the listener is deregistered and the
//! poll timer released, so a second firing of the event is never observed.
//! An event dispatched before [`EventRace::arm`] is lost to the listener;
//! supplying a polling predicate covers that case.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::pending;
use tokio::time::timeout;
use tracing::debug;

use super::{ConditionWaiter, WaitSpec};
use crate::{
    error::{ProbeError, ProbeOutcome},
    host::{Clock, EventBus, EventListener},
    model::{EventKind, HostEvent},
};

/// Lifecycle of an [`EventRace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    /// Armed; listener registered, nothing observed yet
    Waiting,
    /// A winner was chosen; no listener or timer remains
    Resolved,
}

/// Which path resolved the race
#[derive(Debug, Clone, PartialEq)]
pub enum RaceWinner {
    /// Condition already held when the race was armed
    AlreadySatisfied,
    /// The awaited host event fired
    Event(HostEvent),
    /// The polled condition became true
    Condition,
}

/// Winner plus the time since the caller's start stamp
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    /// Winning path
    pub winner:  RaceWinner,
    /// `now - start`; zero for [`RaceWinner::AlreadySatisfied`]
    pub elapsed: Duration,
}

/// Waits for the first of several completion signals, resolving once
pub struct EventRace {
    state:    RaceState,
    kind:     Option<EventKind>,
    listener: Option<EventListener>,
    waiter:   ConditionWaiter,
    clock:    Arc<dyn Clock>,
}

impl EventRace {
    /// Arms a race.
    ///
    /// When `already_satisfied` is true the race is born resolved and no
    /// listener is registered. Otherwise exactly one listener for `kind`
    /// (restricted to `origin` when given) is registered on `events`.
    /// A `kind` of `None` races the polled condition alone.
    pub fn arm(
        already_satisfied: bool,
        events: &EventBus,
        kind: Option<EventKind>,
        origin: Option<&str>,
        spec: WaitSpec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, listener) = if already_satisfied {
            (RaceState::Resolved, None)
        } else {
            (RaceState::Waiting, kind.map(|kind| events.listen(kind, origin)))
        };
        debug!("Armed race for {:?} in state {:?}", kind, state);

        Self {
            state,
            kind,
            listener,
            waiter: ConditionWaiter::new(spec),
            clock,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RaceState {
        self.state
    }

    /// Whether a listener is currently registered
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Resolves on the event alone, bounded by the wait timeout
    pub async fn resolve(self, start: Duration) -> ProbeOutcome<RaceOutcome> {
        self.run(start, None::<fn() -> futures::future::Ready<ProbeOutcome<bool>>>)
            .await
    }

    /// Resolves on the event or on `predicate`, whichever comes first
    pub async fn resolve_or_poll<F, Fut>(self, start: Duration, predicate: F) -> ProbeOutcome<RaceOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProbeOutcome<bool>>,
    {
        self.run(start, Some(predicate)).await
    }

    async fn run<F, Fut>(mut self, start: Duration, predicate: Option<F>) -> ProbeOutcome<RaceOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProbeOutcome<bool>>,
    {
        if self.state == RaceState::Resolved {
            return Ok(RaceOutcome {
                winner:  RaceWinner::AlreadySatisfied,
                elapsed: Duration::ZERO,
            });
        }
        if self.listener.is_none() && predicate.is_none() {
            return Err(ProbeError::host(
                "race",
                "nothing to wait for: no event kind and no predicate",
            ));
        }

        let spec = self.waiter.spec();
        let listener = self.listener.take();
        let waiter = self.waiter;

        let event_path = async move {
            let next = async move {
                match listener {
                    Some(mut listener) => match listener.next().await {
                        Some(event) => event,
                        // Bus gone: leave the decision to the polling path or the bound.
                        None => pending().await,
                    },
                    None => pending().await,
                }
            };
            match spec.timeout() {
                Some(bound) => timeout(bound, next).await.map_err(|_| ProbeError::WaitTimeout {
                    waited_ms: bound.as_millis() as u64,
                }),
                None => Ok(next.await),
            }
        };

        let condition_path = async move {
            match predicate {
                Some(predicate) => waiter.wait(predicate).await.map(|_| ()),
                None => pending().await,
            }
        };

        let winner = tokio::select! {
            biased;
            event = event_path => RaceWinner::Event(event?),
            satisfied = condition_path => {
                satisfied?;
                RaceWinner::Condition
            }
        };

        let elapsed = self.clock.now().saturating_sub(start);
        debug!("Race for {:?} resolved by {:?} after {:?}", self.kind, winner, elapsed);
        Ok(RaceOutcome { winner, elapsed })
    }
}

impl std::fmt::Debug for EventRace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRace")
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("listening", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::time::sleep;

    use super::*;
    use crate::host::TokioClock;

    fn paint(origin: &str) -> HostEvent {
        HostEvent::FirstPaint {
            origin: origin.to_string(),
        }
    }

    fn spec() -> WaitSpec {
        WaitSpec::new(Duration::from_millis(100)).with_timeout(Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_satisfied_registers_nothing() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let race = EventRace::arm(true, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        assert_eq!(race.state(), RaceState::Resolved);
        assert!(!race.is_listening());
        assert_eq!(bus.listener_count(), 0);

        let outcome = race.resolve(Duration::ZERO).await.unwrap();
        assert_eq!(outcome.winner, RaceWinner::AlreadySatisfied);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_elapsed_from_start() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let start = clock.now();

        let race = EventRace::arm(false, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        assert_eq!(race.state(), RaceState::Waiting);
        assert_eq!(bus.listener_count(), 1);

        let emitter = bus.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(120)).await;
            emitter.emit(paint("app://calculator"));
        });

        let outcome = race.resolve(start).await.unwrap();
        assert_eq!(outcome.winner, RaceWinner::Event(paint("app://calculator")));
        assert_eq!(outcome.elapsed, Duration::from_millis(120));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_fire_resolves_once() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let race = EventRace::arm(false, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        assert_eq!(bus.emit(paint("app://a")), 1);

        let outcome = race.resolve(Duration::ZERO).await.unwrap();
        assert!(matches!(outcome.winner, RaceWinner::Event(_)));

        // Listener is gone, so the second firing reaches nobody.
        assert_eq!(bus.emit(paint("app://a")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_wins_when_event_never_fires() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let ready = Arc::new(AtomicBool::new(false));

        let flag = ready.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let race = EventRace::arm(false, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        let outcome = race
            .resolve_or_poll(Duration::ZERO, || {
                let ready = ready.clone();
                async move { Ok::<_, ProbeError>(ready.load(Ordering::SeqCst)) }
            })
            .await
            .unwrap();

        assert_eq!(outcome.winner, RaceWinner::Condition);
        assert_eq!(outcome.elapsed, Duration::from_millis(300));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_lost_before_arm_falls_back_to_polling() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        bus.emit(paint("app://a"));
        let race = EventRace::arm(false, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        let outcome = race
            .resolve_or_poll(Duration::ZERO, || async { Ok::<_, ProbeError>(true) })
            .await
            .unwrap();

        assert_eq!(outcome.winner, RaceWinner::Condition);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_only_race_times_out() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let race = EventRace::arm(false, &bus, Some(EventKind::FirstPaint), None, spec(), clock);
        let err = race.resolve(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ProbeError::WaitTimeout { waited_ms: 2000 }));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_wait_for_is_an_error() {
        let bus = EventBus::new();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let race = EventRace::arm(false, &bus, None, None, spec(), clock);
        assert!(race.resolve(Duration::ZERO).await.is_err());
    }
}
