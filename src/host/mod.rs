//! Host collaborator interfaces
//!
//! Probes never reach into ambient host state. Everything they observe or
//! trigger goes through the capabilities defined here, bundled in a [`Host`]
//! and injected at construction:
//!
//! - [`AppLookup`]: resolve an app by name or origin
//! - [`AppRegistry`]: window-manager view of running and displayed apps
//! - [`AppLauncher`]: launch and kill apps
//! - [`FrameSource`]: screen-refresh callbacks and compositor counters
//! - [`EventBus`]: named host events (`load-complete`, `first-paint`)
//! - [`Clock`]: monotonic time source
//!
//! [`SimulatedHost`] implements every trait in-process for tests and the CLI.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    error::ProbeOutcome,
    model::{App, AppWindow, CompositorCounters},
};

pub mod clock;
pub mod events;
pub mod simulated;

pub use clock::{Clock, TokioClock};
pub use events::{EventBus, EventListener};
pub use simulated::SimulatedHost;

/// Capability: resolve installed applications.
#[async_trait]
pub trait AppLookup: Send + Sync {
    /// Finds an app by manifest name or origin; `Ok(None)` when absent.
    async fn locate(&self, name_or_origin: &str) -> ProbeOutcome<Option<App>>;
}

/// Capability: query the window manager.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// Origins of all running apps.
    async fn running_origins(&self) -> ProbeOutcome<HashSet<String>>;

    /// Origin of the foreground app, if any.
    async fn displayed_origin(&self) -> ProbeOutcome<Option<String>>;

    /// Window details of a running app.
    async fn window(&self, origin: &str) -> ProbeOutcome<Option<AppWindow>>;
}

/// Capability: start and stop applications.
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Requests a launch. Returns once the request is issued, not when the
    /// app has loaded.
    async fn launch(&self, app: &App) -> ProbeOutcome<()>;

    /// Kills one running app.
    async fn kill(&self, origin: &str) -> ProbeOutcome<()>;

    /// Kills every running app.
    async fn kill_all(&self) -> ProbeOutcome<()>;
}

/// Capability: frame timing from the compositor.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Resolves at the next screen refresh.
    async fn next_refresh(&self) -> ProbeOutcome<()>;

    /// Current compositor counters, `Ok(None)` if the host has none.
    async fn counters(&self) -> ProbeOutcome<Option<CompositorCounters>>;
}

/// Bundle of host capabilities injected into each probe
#[derive(Clone)]
pub struct Host {
    /// App lookup
    pub lookup:   Arc<dyn AppLookup>,
    /// Window manager
    pub registry: Arc<dyn AppRegistry>,
    /// Launcher
    pub launcher: Arc<dyn AppLauncher>,
    /// Compositor
    pub frames:   Arc<dyn FrameSource>,
    /// Event bus
    pub events:   EventBus,
    /// Time source
    pub clock:    Arc<dyn Clock>,
}

impl Host {
    /// Wires every capability from one simulated host
    pub fn simulated(sim: Arc<SimulatedHost>) -> Self {
        Self {
            lookup:   sim.clone(),
            registry: sim.clone(),
            launcher: sim.clone(),
            frames:   sim.clone(),
            events:   sim.events(),
            clock:    sim.clock(),
        }
    }

    /// Replaces the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current monotonic time in fractional milliseconds
    pub fn now_ms(&self) -> f64 {
        duration_ms(self.clock.now())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("events", &self.events).finish_non_exhaustive()
    }
}

/// Converts a duration to fractional milliseconds
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
