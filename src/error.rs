//! Error types for measurement probes
//!
//! Every probe terminates with either a result or exactly one of these
//! errors. Each variant maps to a serializable [`FailureKind`] that is handed
//! to the report sink, and provides a remediation hint for the operator
//! running the harness.

use crate::model::{FailureKind, SamplerState};

/// Result type alias for probe operations
pub type ProbeOutcome<T> = Result<T, ProbeError>;

/// Error type for launch and frame-rate probes
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Target application could not be located by name or origin
    #[error("Application not found: '{app}'")]
    NotFound {
        /// Name or origin that failed to resolve
        app: String,
    },

    /// Launch was requested for the application currently displayed
    #[error("Application with origin '{origin}' is already running")]
    AlreadyRunning {
        /// Origin of the displayed application
        origin: String,
    },

    /// No completion signal was observed before the launch deadline
    #[error("Launch of '{app}' did not complete within {waited_ms}ms")]
    LaunchTimeout {
        /// Application being launched
        app:       String,
        /// How long the probe waited
        waited_ms: u64,
    },

    /// A polled condition never became true within its bound
    #[error("Condition not satisfied within {waited_ms}ms")]
    WaitTimeout {
        /// How long the waiter polled
        waited_ms: u64,
    },

    /// Too few samples were collected to derive a frame rate
    #[error("Insufficient samples: {collected} collected over {elapsed_ms:.3}ms")]
    InsufficientSamples {
        /// Number of samples in the sealed window
        collected:  usize,
        /// Span between first and last sample
        elapsed_ms: f64,
    },

    /// A host callback (tick, listener, predicate) raised an error
    #[error("Host callback failed during {context}: {reason}")]
    HostCallbackError {
        /// Where the failure happened (e.g. "tick", "predicate")
        context: String,
        /// Host-provided reason
        reason:  String,
    },

    /// Operation not permitted in the sampler's current state
    #[error("Cannot {operation} while sampler is {state}")]
    InvalidState {
        /// Attempted transition
        operation: &'static str,
        /// State the sampler was in
        state:     SamplerState,
    },

    /// Sampler was dropped while still sampling
    #[error("Sampling of '{app}' was cancelled before stop")]
    Cancelled {
        /// Application being sampled
        app: String,
    },

    /// Configuration value rejected by validation
    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig {
        /// Offending field path
        field:  String,
        /// Why it was rejected
        reason: String,
    },

    /// A launch series exhausted its failure budget
    #[error("Launch series for '{app}' aborted after {failures} failures (budget {budget})")]
    SeriesAborted {
        /// Application under measurement
        app:      String,
        /// Failures observed
        failures: usize,
        /// Failures allowed
        budget:   usize,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ProbeError {
    /// Shorthand for a [`ProbeError::HostCallbackError`]
    pub fn host(context: impl Into<String>, reason: impl ToString) -> Self {
        ProbeError::HostCallbackError {
            context: context.into(),
            reason:  reason.to_string(),
        }
    }

    /// Returns the failure marker category reported to the sink
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::NotFound { .. } => FailureKind::NotFound,
            ProbeError::AlreadyRunning { .. } => FailureKind::AlreadyRunning,
            ProbeError::LaunchTimeout { .. } => FailureKind::LaunchTimeout,
            ProbeError::WaitTimeout { .. } => FailureKind::Timeout,
            ProbeError::InsufficientSamples { .. } => FailureKind::InsufficientSamples,
            ProbeError::HostCallbackError { .. } => FailureKind::HostCallbackError,
            ProbeError::SeriesAborted { .. } => FailureKind::SeriesAborted,
            ProbeError::Cancelled { .. } => FailureKind::Cancelled,
            ProbeError::InvalidState { .. }
            | ProbeError::InvalidConfig { .. }
            | ProbeError::IoError(_)
            | ProbeError::JsonError(_) => FailureKind::Harness,
        }
    }

    /// Returns an actionable remediation hint for this error
    ///
    /// # Examples
    ///
    /// ```
    /// use perf_probe::error::ProbeError;
    ///
    /// let error = ProbeError::NotFound {
    ///     app: "Calculator".to_string(),
    /// };
    ///
    /// assert!(error.remediation_hint().contains("installed"));
    /// ```
    pub fn remediation_hint(&self) -> &str {
        match self {
            ProbeError::NotFound { .. } => {
                "Check that the application is installed and that the name matches its manifest \
                 name exactly. Origins may be used instead of names."
            }
            ProbeError::AlreadyRunning { .. } => {
                "Kill the application or return to the home screen before measuring launch \
                 latency, or set launch.already_running = \"zero_latency\"."
            }
            ProbeError::LaunchTimeout { .. } => {
                "The completion signal never fired. Try a different launch.signal, enable \
                 launch.poll_fallback, or raise launch.timeout_ms."
            }
            ProbeError::WaitTimeout { .. } => {
                "The polled condition never became true. Raise the timeout or check that the \
                 host updates its running-app registry."
            }
            ProbeError::InsufficientSamples { .. } => {
                "At least two ticks with distinct timestamps are needed. Sample for longer or \
                 raise sampler.sample_hz."
            }
            ProbeError::HostCallbackError { .. } => {
                "The host raised an error inside a callback. Inspect host logs; the probe was \
                 cancelled and its timers released."
            }
            ProbeError::InvalidState { .. } => {
                "Sampler transitions are Idle -> Sampling -> Stopped. Create a new sampler for \
                 each measurement."
            }
            ProbeError::Cancelled { .. } => {
                "The sampler was dropped mid-measurement. Call stop() to obtain a frame rate."
            }
            ProbeError::InvalidConfig { .. } => {
                "Fix the configuration value. Intervals, rates and iteration counts must be \
                 positive."
            }
            ProbeError::SeriesAborted { .. } => {
                "Too many launch attempts failed. Check device stability and consider raising \
                 series.fail_ratio."
            }
            ProbeError::IoError(_) => {
                "An I/O error occurred. Check file paths and permissions."
            }
            ProbeError::JsonError(_) => {
                "The JSON document is malformed or has unexpected fields. Run `perf-probe config` \
                 to see the expected layout."
            }
        }
    }
}
