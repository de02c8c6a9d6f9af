//! Data models and type definitions for perf-probe
//!
//! This module defines the types shared between probes, host collaborators
//! and the report sink:
//! - Host-side descriptions of applications, windows and events
//! - Probe configuration selectors (completion signal, tick mode, policies)
//! - Result payloads and failure markers handed to the report sink
//!
//! The serialized shape of [`Report`] is the contract with the harness.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Host-side descriptions
// ============================================================================

/// An installed application as returned by the lookup collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct App {
    /// Manifest name (e.g. "Calculator")
    pub name:        String,
    /// Unique origin (e.g. "app://calculator.gaiamobile.org")
    pub origin:      String,
    /// Path appended to the origin for the launched document
    #[serde(default)]
    pub launch_path: Option<String>,
    /// Entry point for multi-entry applications
    #[serde(default)]
    pub entry_point: Option<String>,
}

impl App {
    /// Creates an app with no launch path or entry point
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            origin:      origin.into(),
            launch_path: None,
            entry_point: None,
        }
    }

    /// Whether `needle` names this app, by manifest name or origin
    pub fn matches(&self, needle: &str) -> bool {
        self.name == needle || self.origin == needle
    }
}

/// A running application's window as reported by the window manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AppWindow {
    /// Identifier of the frame hosting the app document
    pub frame_id: String,
    /// Source URL loaded into the frame
    pub src:      String,
    /// Display name
    pub name:     String,
    /// Origin of the running instance
    pub origin:   String,
}

/// Cold or warm start, as flagged by the host's load-time event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    /// Process was started for this launch
    Cold,
    /// Process was already alive and brought forward
    Warm,
}

impl LoadType {
    /// Parses the host's single-letter marker (`"w"` is warm, anything else cold)
    pub fn from_marker(marker: &str) -> Self {
        if marker == "w" { LoadType::Warm } else { LoadType::Cold }
    }
}

/// Names of host events a probe may listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Host-measured load time with cold/warm flag
    LoadComplete,
    /// First paint of the launched app
    FirstPaint,
}

impl EventKind {
    /// Returns the event name used on the host bus
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoadComplete => "load-complete",
            EventKind::FirstPaint => "first-paint",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event emitted on the host bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    /// `load-complete{type, time}`
    LoadComplete {
        /// Origin of the loaded app
        origin:    String,
        /// Cold or warm start
        load_type: LoadType,
        /// Duration measured by the host, in milliseconds
        time_ms:   f64,
    },
    /// `first-paint`
    FirstPaint {
        /// Origin of the painted app
        origin: String,
    },
}

impl HostEvent {
    /// Returns the event's kind
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::LoadComplete { .. } => EventKind::LoadComplete,
            HostEvent::FirstPaint { .. } => EventKind::FirstPaint,
        }
    }

    /// Returns the origin the event concerns
    pub fn origin(&self) -> &str {
        match self {
            HostEvent::LoadComplete { origin, .. } | HostEvent::FirstPaint { origin } => origin,
        }
    }
}

/// Monotonic compositor counters read once per tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompositorCounters {
    /// Total composited frames
    pub composition_frames: u64,
    /// Host's instantaneous composition fps estimate
    pub composition_fps:    f64,
    /// Total layer transactions
    pub transaction_frames: u64,
    /// Host's instantaneous transaction fps estimate
    pub transaction_fps:    f64,
}

// ============================================================================
// Probe selectors
// ============================================================================

/// Which observation a launch probe accepts as proof of completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSignal {
    /// `load-complete` event; timing comes from the host
    #[default]
    LoadTime,
    /// `first-paint` event; timing measured against the local start stamp
    FirstPaint,
    /// App origin appears in the running set; no event involved
    Presence,
}

impl CompletionSignal {
    /// Host event this signal listens for, if any
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            CompletionSignal::LoadTime => Some(EventKind::LoadComplete),
            CompletionSignal::FirstPaint => Some(EventKind::FirstPaint),
            CompletionSignal::Presence => None,
        }
    }
}

/// What to do when launch is requested for the displayed app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlreadyRunningPolicy {
    /// Fail with `AlreadyRunning` without launching
    #[default]
    Fail,
    /// Report a zero-latency result without launching
    ZeroLatency,
}

/// Source of sampling ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// Fixed-rate timer at `sample_hz`
    #[default]
    Timer,
    /// Host screen-refresh callback
    Refresh,
}

/// Frame sampler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SamplerState {
    /// Created, not yet started
    Idle,
    /// Tick source active
    Sampling,
    /// Tick source cancelled, window sealed
    Stopped,
}

impl SamplerState {
    /// Returns the state as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerState::Idle => "idle",
            SamplerState::Sampling => "sampling",
            SamplerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SamplerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Results
// ============================================================================

/// The single timing field of a launch result, named after its signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LaunchTiming {
    /// Host-measured cold start, ms
    ColdLoadTime(f64),
    /// Host-measured warm start, ms
    WarmLoadTime(f64),
    /// Launch request to first paint, ms
    TimeToPaint(f64),
    /// Launch request to presence in the running set, ms
    TimeToLoadEnd(f64),
}

impl LaunchTiming {
    /// Field name this timing serializes under
    pub fn metric(&self) -> &'static str {
        match self {
            LaunchTiming::ColdLoadTime(_) => "cold_load_time",
            LaunchTiming::WarmLoadTime(_) => "warm_load_time",
            LaunchTiming::TimeToPaint(_) => "time_to_paint",
            LaunchTiming::TimeToLoadEnd(_) => "time_to_load_end",
        }
    }

    /// Duration in milliseconds
    pub fn value_ms(&self) -> f64 {
        match *self {
            LaunchTiming::ColdLoadTime(v)
            | LaunchTiming::WarmLoadTime(v)
            | LaunchTiming::TimeToPaint(v)
            | LaunchTiming::TimeToLoadEnd(v) => v,
        }
    }
}

/// Outcome of a successful launch probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchResult {
    /// Frame hosting the launched document
    pub frame_identifier: String,
    /// URL loaded into that frame
    pub source_url:       String,
    /// App name
    pub name:             String,
    /// App origin
    pub origin:           String,
    /// Exactly one timing field
    #[serde(flatten)]
    pub timing:           LaunchTiming,
}

/// Compositor-counter enrichment of a frame statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositorStatistic {
    /// Composition rate over the window
    pub composition_fps:     f64,
    /// Transaction rate over the window
    pub transaction_fps:     f64,
    /// Composited frames between first and last tick
    pub composition_frames:  u64,
    /// Transactions between first and last tick
    pub transaction_frames:  u64,
    /// Per-tick instantaneous composition fps
    pub composition_fps_all: Vec<f64>,
    /// Per-tick instantaneous transaction fps
    pub transaction_fps_all: Vec<f64>,
}

/// Frame-rate statistic reduced from a sealed measurement window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameStatistic {
    /// Last timestamp minus first timestamp, ms
    pub elapsed_ms:  f64,
    /// Number of samples in the window
    pub frame_count: usize,
    /// `frame_count / (elapsed_ms / 1000)`
    pub fps:         f64,
    /// Present when every tick carried compositor counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compositor:  Option<CompositorStatistic>,
}

/// Outcome of a successful frame-sampling probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FpsResult {
    /// App name the sampler was bound to
    pub name:       String,
    /// Origin of the running instance
    pub origin:     String,
    /// Reduced statistic
    #[serde(flatten)]
    pub statistic:  FrameStatistic,
    /// Raw tick timestamps, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<f64>>,
}

/// Payload of a successful probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum ProbeResult {
    /// Launch latency
    Launch(LaunchResult),
    /// Frame rate
    Frames(FpsResult),
}

/// Failure categories reported to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target app absent
    NotFound,
    /// Launch requested on the displayed app
    AlreadyRunning,
    /// Completion signal never observed
    LaunchTimeout,
    /// Raw polling timeout
    Timeout,
    /// Fewer than two usable ticks
    InsufficientSamples,
    /// Host callback raised an error
    HostCallbackError,
    /// Launch series exceeded its failure budget
    SeriesAborted,
    /// Sampler dropped before it was stopped
    Cancelled,
    /// Harness misuse or configuration problem
    Harness,
}

/// Explicit failure value handed to the sink in place of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureMarker {
    /// Failure category
    pub kind:    FailureKind,
    /// Human-readable description
    pub message: String,
    /// App the probe targeted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app:     Option<String>,
}

/// Success or failure body of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportBody {
    /// Well-formed result
    Result(ProbeResult),
    /// Explicit failure marker
    Failure(FailureMarker),
}

/// The single value a probe hands to the report sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    /// Wall-clock time the probe finished
    pub finished_at: DateTime<Utc>,
    /// Result or failure
    #[serde(flatten)]
    pub body:        ReportBody,
}

impl Report {
    /// Wraps a successful result
    pub fn success(result: ProbeResult) -> Self {
        Self {
            finished_at: Utc::now(),
            body:        ReportBody::Result(result),
        }
    }

    /// Wraps a failure
    pub fn failure(error: &crate::error::ProbeError, app: Option<&str>) -> Self {
        Self {
            finished_at: Utc::now(),
            body:        ReportBody::Failure(FailureMarker {
                kind:    error.kind(),
                message: error.to_string(),
                app:     app.map(str::to_string),
            }),
        }
    }

    /// Whether this report carries a result
    pub fn is_success(&self) -> bool {
        matches!(self.body, ReportBody::Result(_))
    }

    /// Failure category, if this is a failure report
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.body {
            ReportBody::Failure(marker) => Some(marker.kind),
            ReportBody::Result(_) => None,
        }
    }
}
