//! Sample arena and frame-rate reduction
//!
//! Each sampler owns one [`MeasurementWindow`]. It is appended to while
//! sampling, sealed into a read-only [`SealedWindow`] on stop, and reduced to
//! a [`FrameStatistic`] exactly once.

use crate::{
    error::{ProbeError, ProbeOutcome},
    model::{CompositorCounters, CompositorStatistic, FrameStatistic},
};

/// One tick's observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Compositor counters read during the tick
    pub counters:     Option<CompositorCounters>,
}

impl Sample {
    /// A sample without counters
    pub fn at(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            counters: None,
        }
    }
}

/// Append-only sample buffer for one sampling session
#[derive(Debug, Default)]
pub struct MeasurementWindow {
    samples: Vec<Sample>,
}

impl MeasurementWindow {
    /// Creates an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one tick's sample
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples collected
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was collected
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Ends collection
    pub fn seal(self) -> SealedWindow {
        SealedWindow {
            samples: self.samples,
        }
    }
}

/// Read-only samples of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SealedWindow {
    samples: Vec<Sample>,
}

impl SealedWindow {
    /// Chronological samples
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Timestamps only
    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp_ms).collect()
    }

    /// Derives the frame statistic.
    ///
    /// `fps = frame_count / (elapsed_ms / 1000)` with `frame_count` the
    /// number of samples and `elapsed_ms` the span from first to last. Fewer
    /// than two samples, or a span that is not strictly positive, is
    /// [`ProbeError::InsufficientSamples`]. When every sample carries
    /// counters the statistic gains a [`CompositorStatistic`].
    pub fn reduce(&self) -> ProbeOutcome<FrameStatistic> {
        let (first, last) = match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => {
                return Err(ProbeError::InsufficientSamples {
                    collected:  self.samples.len(),
                    elapsed_ms: 0.0,
                });
            }
        };

        let elapsed_ms = last.timestamp_ms - first.timestamp_ms;
        if !(elapsed_ms.is_finite() && elapsed_ms > 0.0) {
            return Err(ProbeError::InsufficientSamples {
                collected: self.samples.len(),
                elapsed_ms,
            });
        }

        let frame_count = self.samples.len();
        let fps = frame_count as f64 / (elapsed_ms / 1000.0);
        let compositor = self.reduce_counters(elapsed_ms)?;

        Ok(FrameStatistic {
            elapsed_ms,
            frame_count,
            fps,
            compositor,
        })
    }

    fn reduce_counters(&self, elapsed_ms: f64) -> ProbeOutcome<Option<CompositorStatistic>> {
        let counters: Option<Vec<CompositorCounters>> =
            self.samples.iter().map(|s| s.counters).collect();
        let Some(counters) = counters else {
            return Ok(None);
        };
        let (Some(first), Some(last)) = (counters.first(), counters.last()) else {
            return Ok(None);
        };

        let composition_frames = last
            .composition_frames
            .checked_sub(first.composition_frames)
            .ok_or_else(|| ProbeError::host("reduce", "composition counter went backwards"))?;
        let transaction_frames = last
            .transaction_frames
            .checked_sub(first.transaction_frames)
            .ok_or_else(|| ProbeError::host("reduce", "transaction counter went backwards"))?;

        // The first counted frame straddles the window start.
        let seconds = elapsed_ms / 1000.0;
        Ok(Some(CompositorStatistic {
            composition_fps: composition_frames.saturating_sub(1) as f64 / seconds,
            transaction_fps: transaction_frames.saturating_sub(1) as f64 / seconds,
            composition_frames,
            transaction_frames,
            composition_fps_all: counters.iter().map(|c| c.composition_fps).collect(),
            transaction_fps_all: counters.iter().map(|c| c.transaction_fps).collect(),
        }))
    }
}
