//! Monotonic time source

use std::time::Duration;

use tokio::time::Instant;

/// Monotonic clock; `now()` is the time since an arbitrary fixed origin.
pub trait Clock: Send + Sync {
    /// Elapsed time since the clock's origin
    fn now(&self) -> Duration;
}

/// Clock backed by `tokio::time::Instant`
///
/// Follows the runtime's notion of time, so paused test runtimes observe
/// virtual time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    /// Creates a clock whose origin is the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
