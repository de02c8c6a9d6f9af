//! Launch latency probe
//!
//! A launch probe locates the target app, refuses (or short-circuits) when
//! it is already displayed, arms an [`EventRace`] for the configured
//! [`CompletionSignal`], records the start stamp, requests the launch and
//! waits for the first completion signal. The timing field of the result is
//! named after whichever signal won:
//!
//! | Winner                         | Field              | Value                 |
//! |--------------------------------|--------------------|-----------------------|
//! | `load-complete` (cold)         | `cold_load_time`   | host-measured         |
//! | `load-complete` (warm)         | `warm_load_time`   | host-measured         |
//! | `first-paint`                  | `time_to_paint`    | now - start           |
//! | presence in the running set    | `time_to_load_end` | now - start           |

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use super::{contain, report};
use crate::{
    config::LaunchConfig,
    error::{ProbeError, ProbeOutcome},
    host::{Host, duration_ms},
    model::{
        AlreadyRunningPolicy, App, AppWindow, CompletionSignal, HostEvent, LaunchResult,
        LaunchTiming, LoadType, ProbeResult,
    },
    report::{FinishOnce, ReportSink},
    wait::{ConditionWaiter, EventRace, RaceOutcome, RaceWinner},
};

/// Measures time from launch request to launch completion
#[derive(Debug, Clone)]
pub struct LaunchProbe {
    host:   Host,
    config: LaunchConfig,
}

impl LaunchProbe {
    /// Creates a probe over the given host capabilities
    pub fn new(host: Host, config: LaunchConfig) -> Self {
        Self { host, config }
    }

    /// The probe's configuration
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Launches `app_name` and reports the outcome to `sink` exactly once
    pub async fn run(
        &self,
        app_name: &str,
        sink: Arc<dyn ReportSink>,
    ) -> ProbeOutcome<LaunchResult> {
        let guard = FinishOnce::new(sink);
        let outcome = contain("launch", self.launch(app_name)).await;
        report(&guard, app_name, outcome, |result| ProbeResult::Launch(result.clone()))
    }

    /// Launches `app_name` and measures how long it takes to complete
    pub async fn launch(&self, app_name: &str) -> ProbeOutcome<LaunchResult> {
        let app = self
            .host
            .lookup
            .locate(app_name)
            .await?
            .ok_or_else(|| ProbeError::NotFound {
                app: app_name.to_string(),
            })?;

        let displayed = self.host.registry.displayed_origin().await?;
        let already_running = displayed.as_deref() == Some(app.origin.as_str());
        if already_running && self.config.already_running == AlreadyRunningPolicy::Fail {
            return Err(ProbeError::AlreadyRunning { origin: app.origin });
        }

        let race = EventRace::arm(
            already_running,
            &self.host.events,
            self.config.signal.event_kind(),
            Some(&app.origin),
            self.config.wait_spec(),
            self.host.clock.clone(),
        );

        let start = self.host.clock.now();
        if already_running {
            info!("{} is already displayed, reporting zero latency", app.name);
        } else {
            info!("Launching '{}' ({}) awaiting {:?}", app.name, app.origin, self.config.signal);
            self.host.launcher.launch(&app).await?;
        }

        let poll_presence =
            self.config.signal == CompletionSignal::Presence || self.config.poll_fallback;
        let outcome = if poll_presence {
            let registry = self.host.registry.clone();
            let origin = app.origin.clone();
            race.resolve_or_poll(start, move || {
                let registry = registry.clone();
                let origin = origin.clone();
                async move {
                    let running = registry.running_origins().await?;
                    Ok::<_, ProbeError>(running.contains(&origin))
                }
            })
            .await
        } else {
            race.resolve(start).await
        };
        let outcome = outcome.map_err(|e| self.launch_timeout(&app, e))?;

        let timing = self.timing(&outcome);
        debug!("'{}' completed via {:?}: {:?}", app.name, outcome.winner, timing);

        let window = self.window(&app, start).await?;
        Ok(LaunchResult {
            frame_identifier: window.frame_id,
            source_url:       window.src,
            name:             window.name,
            origin:           window.origin,
            timing,
        })
    }

    fn timing(&self, outcome: &RaceOutcome) -> LaunchTiming {
        let elapsed = duration_ms(outcome.elapsed);
        match &outcome.winner {
            RaceWinner::AlreadySatisfied => match self.config.signal {
                CompletionSignal::LoadTime => LaunchTiming::WarmLoadTime(0.0),
                CompletionSignal::FirstPaint => LaunchTiming::TimeToPaint(0.0),
                CompletionSignal::Presence => LaunchTiming::TimeToLoadEnd(0.0),
            },
            RaceWinner::Event(HostEvent::LoadComplete {
                load_type, time_ms, ..
            }) => match load_type {
                LoadType::Cold => LaunchTiming::ColdLoadTime(*time_ms),
                LoadType::Warm => LaunchTiming::WarmLoadTime(*time_ms),
            },
            RaceWinner::Event(HostEvent::FirstPaint { .. }) => LaunchTiming::TimeToPaint(elapsed),
            RaceWinner::Condition => LaunchTiming::TimeToLoadEnd(elapsed),
        }
    }

    /// Waits for the launched app's window to be registered, within what is
    /// left of the launch bound measured from `start`
    async fn window(&self, app: &App, start: Duration) -> ProbeOutcome<AppWindow> {
        if let Some(window) = self.host.registry.window(&app.origin).await? {
            return Ok(window);
        }

        let mut spec = self.config.wait_spec();
        if let Some(bound) = spec.timeout() {
            let spent = self.host.clock.now().saturating_sub(start);
            spec = spec.with_timeout(bound.saturating_sub(spent));
        }
        debug!("Waiting for window of {} (bound {:?})", app.origin, spec.timeout());

        let registry = self.host.registry.clone();
        let origin = app.origin.clone();
        ConditionWaiter::new(spec)
            .wait(move || {
                let registry = registry.clone();
                let origin = origin.clone();
                async move { Ok::<_, ProbeError>(registry.window(&origin).await?.is_some()) }
            })
            .await
            .map_err(|e| match e {
                ProbeError::WaitTimeout { .. } => ProbeError::LaunchTimeout {
                    app:       app.name.clone(),
                    waited_ms: self.config.timeout_ms.unwrap_or_default(),
                },
                other => other,
            })?;

        self.host
            .registry
            .window(&app.origin)
            .await?
            .ok_or_else(|| ProbeError::host("window", format!("window of {} vanished", app.origin)))
    }

    fn launch_timeout(&self, app: &App, error: ProbeError) -> ProbeError {
        match error {
            ProbeError::WaitTimeout { waited_ms } => ProbeError::LaunchTimeout {
                app: app.name.clone(),
                waited_ms,
            },
            other => other,
        }
    }
}
