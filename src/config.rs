//! Harness configuration
//!
//! Configuration is a single JSON document with one section per concern.
//! Every field has a default, so an empty object (or no file at all) yields
//! a working configuration.
//!
//! ```json
//! {
//!   "launch":  { "signal": "first_paint", "timeout_ms": 10000 },
//!   "sampler": { "tick": "refresh", "counters": true },
//!   "series":  { "iterations": 30 }
//! }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ProbeError, ProbeOutcome},
    model::{AlreadyRunningPolicy, CompletionSignal, TickMode},
    wait::WaitSpec,
};

/// Environment variable naming a config file when `--config` is absent
pub const CONFIG_ENV_VAR: &str = "PERF_PROBE_CONFIG";

/// Default poll interval of the condition waiter (one host tick)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default upper bound on any launch wait
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 60_000;

/// Launch probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Observation accepted as launch completion
    pub signal:           CompletionSignal,
    /// Behaviour when the target is already displayed
    pub already_running:  AlreadyRunningPolicy,
    /// Condition polling interval
    pub poll_interval_ms: u64,
    /// Bound on the whole completion wait; `null` polls forever
    pub timeout_ms:       Option<u64>,
    /// Race a presence poll against the completion event
    pub poll_fallback:    bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            signal:           CompletionSignal::default(),
            already_running:  AlreadyRunningPolicy::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms:       Some(DEFAULT_LAUNCH_TIMEOUT_MS),
            poll_fallback:    false,
        }
    }
}

impl LaunchConfig {
    /// Wait parameters derived from this section
    pub fn wait_spec(&self) -> WaitSpec {
        let spec = WaitSpec::new(Duration::from_millis(self.poll_interval_ms));
        match self.timeout_ms {
            Some(ms) => spec.with_timeout(Duration::from_millis(ms)),
            None => spec.unbounded(),
        }
    }
}

/// Frame sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Timer or screen-refresh ticks
    pub tick:               TickMode,
    /// Timer rate; ignored in refresh mode
    pub sample_hz:          f64,
    /// Read compositor counters on every tick
    pub counters:           bool,
    /// Sampling period for bounded sampling
    pub period_ms:          u64,
    /// Attach raw timestamps to the result
    pub include_timestamps: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick:               TickMode::default(),
            sample_hz:          60.0,
            counters:           false,
            period_ms:          5_000,
            include_timestamps: false,
        }
    }
}

impl SamplerConfig {
    /// Period between timer ticks
    pub fn tick_interval(&self) -> ProbeOutcome<Duration> {
        period_from_hz("sampler.sample_hz", self.sample_hz)
    }
}

/// Launch series settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Successful launches to collect per app
    pub iterations: usize,
    /// Pause before each attempt
    pub delay_ms:   u64,
    /// Share of `iterations` allowed to fail
    pub fail_ratio: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            iterations: 30,
            delay_ms:   1_000,
            fail_ratio: 0.2,
        }
    }
}

impl SeriesConfig {
    /// Number of failed attempts tolerated per app
    pub fn failure_budget(&self) -> usize {
        (self.iterations as f64 * self.fail_ratio).floor() as usize
    }
}

/// One application known to the simulated host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedApp {
    /// Manifest name
    pub name:   String,
    /// Origin
    pub origin: String,
}

/// Behaviour of the in-process simulated host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Installed applications
    pub apps:              Vec<SimulatedApp>,
    /// Launch request to presence in the running set
    pub appear_after_ms:   u64,
    /// Launch request to first paint
    pub paint_after_ms:    u64,
    /// Launch request to load-complete
    pub load_after_ms:     u64,
    /// Load time reported inside the load-complete event
    pub reported_load_ms:  f64,
    /// Screen refresh rate for refresh-driven ticks
    pub refresh_hz:        f64,
    /// Composited frames added per refresh
    pub frames_per_tick:   u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            apps:             vec![
                SimulatedApp {
                    name:   "Calculator".to_string(),
                    origin: "app://calculator.gaiamobile.org".to_string(),
                },
                SimulatedApp {
                    name:   "Clock".to_string(),
                    origin: "app://clock.gaiamobile.org".to_string(),
                },
                SimulatedApp {
                    name:   "Gallery".to_string(),
                    origin: "app://gallery.gaiamobile.org".to_string(),
                },
            ],
            appear_after_ms:  40,
            paint_after_ms:   120,
            load_after_ms:    250,
            reported_load_ms: 230.0,
            refresh_hz:       60.0,
            frames_per_tick:  1,
        }
    }
}

impl SimulationConfig {
    /// Period between simulated screen refreshes
    pub fn refresh_interval(&self) -> ProbeOutcome<Duration> {
        period_from_hz("simulation.refresh_hz", self.refresh_hz)
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Launch probe
    pub launch:     LaunchConfig,
    /// Frame sampler
    pub sampler:    SamplerConfig,
    /// Launch series
    pub series:     SeriesConfig,
    /// Simulated host used by the CLI
    pub simulation: SimulationConfig,
}

impl HarnessConfig {
    /// Parses and validates a JSON document
    pub fn from_json(json: &str) -> ProbeOutcome<Self> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file
    pub fn from_file(path: &Path) -> ProbeOutcome<Self> {
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Loads from `path`, else from `$PERF_PROBE_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> ProbeOutcome<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(env_path) => Self::from_file(Path::new(&env_path)),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Rejects values that would stall or divide by zero
    pub fn validate(&self) -> ProbeOutcome<()> {
        if self.launch.poll_interval_ms == 0 {
            return Err(invalid("launch.poll_interval_ms", "must be greater than 0"));
        }
        if self.launch.timeout_ms == Some(0) {
            return Err(invalid("launch.timeout_ms", "must be greater than 0 or null"));
        }
        self.sampler.tick_interval()?;
        if self.series.iterations == 0 {
            return Err(invalid("series.iterations", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.series.fail_ratio) {
            return Err(invalid("series.fail_ratio", "must be between 0.0 and 1.0"));
        }
        self.simulation.refresh_interval()?;
        Ok(())
    }
}

/// Period of a rate given in hertz, rejecting rates that round to a zero period
pub fn period_from_hz(field: &str, hz: f64) -> ProbeOutcome<Duration> {
    if !(hz.is_finite() && hz > 0.0) {
        return Err(invalid(field, "must be a positive number"));
    }
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(invalid(field, "must give a period of at least one nanosecond")),
    }
}

fn invalid(field: &str, reason: &str) -> ProbeError {
    ProbeError::InvalidConfig {
        field:  field.to_string(),
        reason: reason.to_string(),
    }
}
