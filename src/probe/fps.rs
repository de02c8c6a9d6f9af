//! Frame-rate sampler
//!
//! A [`FrameSampler`] is a three-state machine:
//!
//! ```text
//! Idle --start()--> Sampling --stop()--> Stopped
//!   \                                       ^
//!    `--start() on a missing app -----------'
//! ```
//!
//! While sampling, a single spawned tick task appends one [`Sample`] per tick
//! to the sampler's own [`MeasurementWindow`]. Ticks come from a fixed-rate
//! timer or from the host's screen refresh. A host error inside a tick ends
//! the task (and with it the tick source) before the failure is reported.
//! Dropping a sampler that is still sampling reports it as cancelled.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{Interval, MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, trace, warn};

use super::{
    contain, report,
    window::{MeasurementWindow, Sample},
};
use crate::{
    config::SamplerConfig,
    error::{ProbeError, ProbeOutcome},
    host::{FrameSource, Host},
    model::{App, FpsResult, ProbeResult, Report, SamplerState, TickMode},
    report::{FinishOnce, ReportSink},
};

/// Samples an app's frame timing between `start` and `stop`
pub struct FrameSampler {
    host:       Host,
    config:     SamplerConfig,
    app_name:   String,
    state:      SamplerState,
    target:     Option<App>,
    window:     Arc<Mutex<MeasurementWindow>>,
    ticker:     Option<JoinHandle<()>>,
    tick_error: Arc<Mutex<Option<ProbeError>>>,
    guard:      Arc<FinishOnce>,
}

impl FrameSampler {
    /// Creates an idle sampler for `app_name` reporting to `sink`
    pub fn new(
        host: Host,
        config: SamplerConfig,
        app_name: impl Into<String>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            host,
            config,
            app_name: app_name.into(),
            state: SamplerState::Idle,
            target: None,
            window: Arc::new(Mutex::new(MeasurementWindow::new())),
            ticker: None,
            tick_error: Arc::new(Mutex::new(None)),
            guard: Arc::new(FinishOnce::new(sink)),
        }
    }

    /// Current state
    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Samples collected so far
    pub fn sample_count(&self) -> usize {
        self.window.lock().len()
    }

    /// Whether a tick task is alive
    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Locates the target app and starts the tick source.
    ///
    /// A missing app or an unusable tick rate is terminal: the sampler moves
    /// to `Stopped` and the failure is reported.
    pub async fn start(&mut self) -> ProbeOutcome<()> {
        if self.state != SamplerState::Idle {
            return Err(ProbeError::InvalidState {
                operation: "start",
                state:     self.state,
            });
        }

        let (app, source) = match contain("start", self.prepare()).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.state = SamplerState::Stopped;
                self.guard.finish(Report::failure(&e, Some(&self.app_name)));
                return Err(e);
            }
        };

        info!("Sampling frames of '{}' ({:?} ticks)", app.name, self.config.tick);
        let task = TickTask {
            host:       self.host.clone(),
            counters:   self.config.counters,
            window:     self.window.clone(),
            tick_error: self.tick_error.clone(),
            guard:      self.guard.clone(),
            app_name:   app.name.clone(),
        };
        self.ticker = Some(tokio::spawn(task.run(source)));
        self.target = Some(app);
        self.state = SamplerState::Sampling;
        Ok(())
    }

    /// Cancels the tick source and reduces the collected samples.
    ///
    /// Returns `Ok(None)` when the sampler was already stopped. A tick failure
    /// that already ended sampling is returned here but not reported twice.
    pub async fn stop(&mut self) -> ProbeOutcome<Option<FpsResult>> {
        match self.state {
            SamplerState::Idle => {
                return Err(ProbeError::InvalidState {
                    operation: "stop",
                    state:     self.state,
                });
            }
            SamplerState::Stopped => {
                debug!("Sampler for '{}' already stopped", self.app_name);
                return Ok(None);
            }
            SamplerState::Sampling => {}
        }
        self.state = SamplerState::Stopped;

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            match ticker.await {
                Err(e) if !e.is_cancelled() => warn!("Tick task ended abnormally: {}", e),
                _ => {}
            }
        }

        if let Some(error) = self.tick_error.lock().take() {
            return Err(error);
        }

        let window = std::mem::take(&mut *self.window.lock()).seal();
        let outcome = match (&self.target, window.reduce()) {
            (Some(app), Ok(statistic)) => Ok(FpsResult {
                name: app.name.clone(),
                origin: app.origin.clone(),
                statistic,
                timestamps: self.config.include_timestamps.then(|| window.timestamps()),
            }),
            (None, _) => Err(ProbeError::host("stop", "sampler has no target")),
            (_, Err(e)) => Err(e),
        };
        if let Ok(result) = &outcome {
            info!(
                "'{}' rendered {} frames over {:.1}ms: {:.2} fps",
                result.name,
                result.statistic.frame_count,
                result.statistic.elapsed_ms,
                result.statistic.fps
            );
        }

        report(&self.guard, &self.app_name, outcome, |result| {
            ProbeResult::Frames(result.clone())
        })
        .map(Some)
    }

    /// Samples for `period`, then stops
    pub async fn sample_for(&mut self, period: Duration) -> ProbeOutcome<FpsResult> {
        self.start().await?;
        sleep(period).await;
        self.stop().await?.ok_or(ProbeError::InvalidState {
            operation: "sample_for",
            state:     SamplerState::Stopped,
        })
    }

    async fn prepare(&self) -> ProbeOutcome<(App, TickSource)> {
        let source = match self.config.tick {
            TickMode::Timer => {
                let mut timer = interval(self.config.tick_interval()?);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                TickSource::Timer(timer)
            }
            TickMode::Refresh => TickSource::Refresh(self.host.frames.clone()),
        };

        let app = self
            .host
            .lookup
            .locate(&self.app_name)
            .await?
            .ok_or_else(|| ProbeError::NotFound {
                app: self.app_name.clone(),
            })?;
        Ok((app, source))
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if self.state == SamplerState::Sampling && self.tick_error.lock().is_none() {
            let error = ProbeError::Cancelled {
                app: self.app_name.clone(),
            };
            self.guard.finish(Report::failure(&error, Some(&self.app_name)));
        }
    }
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler")
            .field("app_name", &self.app_name)
            .field("state", &self.state)
            .field("samples", &self.sample_count())
            .finish_non_exhaustive()
    }
}

enum TickSource {
    Timer(Interval),
    Refresh(Arc<dyn FrameSource>),
}

impl TickSource {
    async fn next(&mut self) -> ProbeOutcome<()> {
        match self {
            TickSource::Timer(timer) => {
                timer.tick().await;
                Ok(())
            }
            TickSource::Refresh(frames) => frames.next_refresh().await,
        }
    }
}

/// State moved into the spawned tick task
struct TickTask {
    host:       Host,
    counters:   bool,
    window:     Arc<Mutex<MeasurementWindow>>,
    tick_error: Arc<Mutex<Option<ProbeError>>>,
    guard:      Arc<FinishOnce>,
    app_name:   String,
}

impl TickTask {
    async fn run(self, source: TickSource) {
        let Err(error) = contain("tick", self.tick_loop(source)).await;
        // The tick source was dropped with the loop.
        self.guard.finish(Report::failure(&error, Some(&self.app_name)));
        *self.tick_error.lock() = Some(error);
    }

    async fn tick_loop(&self, mut source: TickSource) -> ProbeOutcome<std::convert::Infallible> {
        loop {
            source.next().await?;
            let timestamp_ms = self.host.now_ms();
            let counters = if self.counters {
                self.host.frames.counters().await?
            } else {
                None
            };
            trace!("tick at {:.3}ms", timestamp_ms);
            self.window.lock().push(Sample {
                timestamp_ms,
                counters,
            });
        }
    }
}
