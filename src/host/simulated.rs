//! Simulated host for testing
//!
//! `SimulatedHost` implements every collaborator trait in-process. Launches
//! are played back as a timeline on the tokio runtime: after
//! `appear_after` the app joins the running set and becomes the displayed
//! app, after `paint_after` a `first-paint` event is emitted, and after
//! `load_after` a `load-complete` event carries the configured load time.
//! Screen refreshes tick at `refresh_hz` aligned to the host clock.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use perf_probe::host::{AppLookup, SimulatedHost};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let host = SimulatedHost::new().with_delay(Duration::from_millis(5));
//!     let app = host.locate("Calculator").await.unwrap();
//!     assert!(app.is_some());
//! }
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use super::{AppLauncher, AppLookup, AppRegistry, Clock, EventBus, FrameSource, TokioClock};
use crate::{
    config::SimulationConfig,
    error::{ProbeError, ProbeOutcome},
    model::{App, AppWindow, CompositorCounters, HostEvent, LoadType},
};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_nanos(16_666_667);

/// Timeline of a simulated launch, relative to the launch request
#[derive(Debug, Clone, Copy)]
struct LaunchTimeline {
    appear_after:     Duration,
    paint_after:      Duration,
    load_after:       Duration,
    reported_load_ms: f64,
}

#[derive(Debug, Clone, Copy)]
enum Milestone {
    Appear,
    Paint,
    Load,
}

/// Mutable window-manager state
#[derive(Debug, Default)]
struct SimState {
    running:       HashMap<String, AppWindow>,
    displayed:     Option<String>,
    launches:      Vec<String>,
    kills:         usize,
    counter_reads: usize,
    next_frame_id: u64,
}

impl SimState {
    fn show(&mut self, app: &App) {
        if !self.running.contains_key(&app.origin) {
            self.next_frame_id += 1;
            let path = app.launch_path.as_deref().unwrap_or("/index.html");
            self.running.insert(
                app.origin.clone(),
                AppWindow {
                    frame_id: format!("frame-{}", self.next_frame_id),
                    src:      format!("{}{}", app.origin, path),
                    name:     app.name.clone(),
                    origin:   app.origin.clone(),
                },
            );
        }
        self.displayed = Some(app.origin.clone());
    }
}

/// In-process host implementing every collaborator trait
#[derive(Debug)]
pub struct SimulatedHost {
    apps:                Vec<App>,
    timeline:            LaunchTimeline,
    refresh_interval:    Duration,
    frames_per_tick:     u64,
    /// Optional delay applied to every collaborator call
    delay:               Option<Duration>,
    /// Optional failure returned by every collaborator call
    error_injection:     Option<String>,
    emit_events:         bool,
    duplicate_events:    bool,
    appears:             bool,
    counters_enabled:    bool,
    /// Counter reads that succeed before the host starts failing them
    counters_fail_after: Option<usize>,
    /// Launch requests rejected before launches start succeeding
    failing_launches:    usize,
    events:              EventBus,
    clock:               Arc<TokioClock>,
    state:               Arc<Mutex<SimState>>,
}

impl SimulatedHost {
    /// Creates a host from the default simulation settings
    pub fn new() -> Self {
        Self::from_config(&SimulationConfig::default())
    }

    /// Creates a host from explicit simulation settings
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            apps:                config
                .apps
                .iter()
                .map(|app| App::new(app.name.clone(), app.origin.clone()))
                .collect(),
            timeline:            LaunchTimeline {
                appear_after:     Duration::from_millis(config.appear_after_ms),
                paint_after:      Duration::from_millis(config.paint_after_ms),
                load_after:       Duration::from_millis(config.load_after_ms),
                reported_load_ms: config.reported_load_ms,
            },
            refresh_interval:    refresh_period(config),
            frames_per_tick:     config.frames_per_tick,
            delay:               None,
            error_injection:     None,
            emit_events:         true,
            duplicate_events:    false,
            appears:             true,
            counters_enabled:    true,
            counters_fail_after: None,
            failing_launches:    0,
            events:              EventBus::new(),
            clock:               Arc::new(TokioClock::new()),
            state:               Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Installs an additional app
    pub fn with_app(mut self, app: App) -> Self {
        self.apps.push(app);
        self
    }

    /// Sets the launch timeline in milliseconds after the launch request
    pub fn with_timeline(mut self, appear_ms: u64, paint_ms: u64, load_ms: u64) -> Self {
        self.timeline.appear_after = Duration::from_millis(appear_ms);
        self.timeline.paint_after = Duration::from_millis(paint_ms);
        self.timeline.load_after = Duration::from_millis(load_ms);
        self
    }

    /// Sets the load time carried by `load-complete`
    pub fn with_reported_load(mut self, load_ms: f64) -> Self {
        self.timeline.reported_load_ms = load_ms;
        self
    }

    /// Sets the screen refresh rate
    pub fn with_refresh_hz(mut self, hz: f64) -> Self {
        self.refresh_interval = refresh_period(&SimulationConfig {
            refresh_hz: hz,
            ..SimulationConfig::default()
        });
        self
    }

    /// Sets a delay applied to every collaborator call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every collaborator call fail with `reason`
    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error_injection = Some(reason.into());
        self
    }

    /// Launches never emit host events
    pub fn without_events(mut self) -> Self {
        self.emit_events = false;
        self
    }

    /// Every launch event is dispatched twice
    pub fn with_duplicate_events(mut self) -> Self {
        self.duplicate_events = true;
        self
    }

    /// Launched apps never join the running set
    pub fn without_presence(mut self) -> Self {
        self.appears = false;
        self
    }

    /// The compositor exposes no counters
    pub fn without_counters(mut self) -> Self {
        self.counters_enabled = false;
        self
    }

    /// Counter reads fail after `reads` successful ones
    pub fn with_counters_failing_after(mut self, reads: usize) -> Self {
        self.counters_fail_after = Some(reads);
        self
    }

    /// The first `launches` launch requests fail
    pub fn with_failing_launches(mut self, launches: usize) -> Self {
        self.failing_launches = launches;
        self
    }

    /// Marks an installed app as running and displayed
    pub fn with_displayed(self, name_or_origin: &str) -> Self {
        if let Some(app) = self.find(name_or_origin) {
            self.state.lock().show(&app);
        }
        self
    }

    /// The host's event bus
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// The host's clock
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Emits an arbitrary event on the host bus
    pub fn emit(&self, event: HostEvent) -> usize {
        self.events.emit(event)
    }

    /// Launch requests received so far, by origin
    pub fn launches(&self) -> Vec<String> {
        self.state.lock().launches.clone()
    }

    /// Kill requests received so far
    pub fn kill_count(&self) -> usize {
        self.state.lock().kills
    }

    /// Whether `origin` is in the running set
    pub fn is_running(&self, origin: &str) -> bool {
        self.state.lock().running.contains_key(origin)
    }

    fn find(&self, name_or_origin: &str) -> Option<App> {
        self.apps.iter().find(|app| app.matches(name_or_origin)).cloned()
    }

    /// Applies configured delay if set
    async fn apply_delay(&self) {
        if let Some(duration) = self.delay {
            sleep(duration).await;
        }
    }

    /// Checks if an error should be injected
    fn check_error_injection(&self, context: &str) -> ProbeOutcome<()> {
        match &self.error_injection {
            Some(reason) => Err(ProbeError::host(context, reason)),
            None => Ok(()),
        }
    }

    fn schedule(&self, app: App, warm: bool) {
        let mut milestones = Vec::new();
        if self.appears {
            milestones.push((self.timeline.appear_after, Milestone::Appear));
        }
        if self.emit_events {
            milestones.push((self.timeline.paint_after, Milestone::Paint));
            milestones.push((self.timeline.load_after, Milestone::Load));
        }
        milestones.sort_by_key(|(at, _)| *at);

        let state = self.state.clone();
        let events = self.events.clone();
        let repeats = if self.duplicate_events { 2 } else { 1 };
        let load_type = if warm { LoadType::Warm } else { LoadType::Cold };
        let reported_load_ms = self.timeline.reported_load_ms;
        let start = Instant::now();

        tokio::spawn(async move {
            for (at, milestone) in milestones {
                sleep_until(start + at).await;
                match milestone {
                    Milestone::Appear => {
                        debug!("Simulated app {} is now running", app.origin);
                        state.lock().show(&app);
                    }
                    Milestone::Paint => {
                        for _ in 0..repeats {
                            events.emit(HostEvent::FirstPaint {
                                origin: app.origin.clone(),
                            });
                        }
                    }
                    Milestone::Load => {
                        for _ in 0..repeats {
                            events.emit(HostEvent::LoadComplete {
                                origin: app.origin.clone(),
                                load_type,
                                time_ms: reported_load_ms,
                            });
                        }
                    }
                }
            }
        });
    }
}

/// Refresh period of `config`, falling back to 60 Hz for unusable rates
fn refresh_period(config: &SimulationConfig) -> Duration {
    config.refresh_interval().unwrap_or_else(|e| {
        warn!("{}, refreshing at 60 Hz instead", e);
        DEFAULT_REFRESH_INTERVAL
    })
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppLookup for SimulatedHost {
    async fn locate(&self, name_or_origin: &str) -> ProbeOutcome<Option<App>> {
        self.apply_delay().await;
        self.check_error_injection("locate")?;
        Ok(self.find(name_or_origin))
    }
}

#[async_trait]
impl AppRegistry for SimulatedHost {
    async fn running_origins(&self) -> ProbeOutcome<HashSet<String>> {
        self.apply_delay().await;
        self.check_error_injection("running_origins")?;
        Ok(self.state.lock().running.keys().cloned().collect())
    }

    async fn displayed_origin(&self) -> ProbeOutcome<Option<String>> {
        self.apply_delay().await;
        self.check_error_injection("displayed_origin")?;
        Ok(self.state.lock().displayed.clone())
    }

    async fn window(&self, origin: &str) -> ProbeOutcome<Option<AppWindow>> {
        self.apply_delay().await;
        self.check_error_injection("window")?;
        Ok(self.state.lock().running.get(origin).cloned())
    }
}

#[async_trait]
impl AppLauncher for SimulatedHost {
    async fn launch(&self, app: &App) -> ProbeOutcome<()> {
        self.apply_delay().await;
        self.check_error_injection("launch")?;

        let (attempt, warm) = {
            let mut state = self.state.lock();
            state.launches.push(app.origin.clone());
            (state.launches.len(), state.running.contains_key(&app.origin))
        };
        if attempt <= self.failing_launches {
            return Err(ProbeError::host("launch", format!("launch {attempt} rejected")));
        }
        debug!("Simulated launch of {} ({})", app.name, if warm { "warm" } else { "cold" });
        self.schedule(app.clone(), warm);
        Ok(())
    }

    async fn kill(&self, origin: &str) -> ProbeOutcome<()> {
        self.apply_delay().await;
        self.check_error_injection("kill")?;

        let mut state = self.state.lock();
        state.kills += 1;
        state.running.remove(origin);
        if state.displayed.as_deref() == Some(origin) {
            state.displayed = None;
        }
        Ok(())
    }

    async fn kill_all(&self) -> ProbeOutcome<()> {
        self.apply_delay().await;
        self.check_error_injection("kill_all")?;

        let mut state = self.state.lock();
        state.kills += state.running.len();
        state.running.clear();
        state.displayed = None;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for SimulatedHost {
    async fn next_refresh(&self) -> ProbeOutcome<()> {
        self.check_error_injection("next_refresh")?;
        let now = self.clock.now();
        let interval = self.refresh_interval.as_nanos();
        let next = (now.as_nanos() / interval + 1) * interval;
        let wait = Duration::from_nanos((next - now.as_nanos()) as u64);
        sleep(wait).await;
        Ok(())
    }

    async fn counters(&self) -> ProbeOutcome<Option<CompositorCounters>> {
        self.check_error_injection("counters")?;
        if !self.counters_enabled {
            return Ok(None);
        }

        let reads = {
            let mut state = self.state.lock();
            state.counter_reads += 1;
            state.counter_reads
        };
        if self.counters_fail_after.is_some_and(|limit| reads > limit) {
            return Err(ProbeError::host("counters", "compositor counters unavailable"));
        }

        let refreshes = (self.clock.now().as_nanos() / self.refresh_interval.as_nanos()) as u64;
        let hz = 1.0 / self.refresh_interval.as_secs_f64();
        let frames = refreshes * self.frames_per_tick;
        Ok(Some(CompositorCounters {
            composition_frames: frames,
            composition_fps:    hz * self.frames_per_tick as f64,
            transaction_frames: frames,
            transaction_fps:    hz * self.frames_per_tick as f64,
        }))
    }
}
