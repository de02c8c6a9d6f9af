//! Report sinks
//!
//! A probe hands exactly one [`Report`] to the harness. [`FinishOnce`] wraps
//! the harness's sink and enforces that: the first `finish` is forwarded,
//! any later call is dropped and logged.

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::model::{Report, ReportBody};

/// Destination of probe reports
pub trait ReportSink: Send + Sync {
    /// Receives one finished probe's report
    fn finish(&self, report: Report);
}

/// Write-once guard around a shared sink, one per probe invocation
pub struct FinishOnce {
    sink:     Arc<dyn ReportSink>,
    finished: AtomicBool,
}

impl FinishOnce {
    /// Guards `sink` for a single probe invocation
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            finished: AtomicBool::new(false),
        }
    }

    /// Forwards `report` if nothing was reported yet; returns whether it was
    pub fn finish(&self, report: Report) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            warn!("Suppressed duplicate report: {:?}", report.body);
            return false;
        }
        match &report.body {
            ReportBody::Result(_) => info!("Probe finished successfully"),
            ReportBody::Failure(marker) => error!("Probe failed: {}", marker.message),
        }
        self.sink.finish(report);
        true
    }

    /// Whether a report has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FinishOnce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishOnce").field("finished", &self.is_finished()).finish()
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Report>>,
}

impl CollectingSink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports received so far
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Number of reports received
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether no report was received
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Removes and returns all reports
    pub fn drain(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock())
    }
}

impl ReportSink for CollectingSink {
    fn finish(&self, report: Report) {
        self.reports.lock().push(report);
    }
}

/// Writes each report as one JSON line
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the inner writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn finish(&self, report: Report) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, &report)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(writer))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            error!("Failed to write report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProbeError,
        model::{FailureKind, LaunchResult, LaunchTiming, ProbeResult},
    };

    fn success() -> Report {
        Report::success(ProbeResult::Launch(LaunchResult {
            frame_identifier: "frame-1".to_string(),
            source_url:       "app://clock/index.html".to_string(),
            name:             "Clock".to_string(),
            origin:           "app://clock".to_string(),
            timing:           LaunchTiming::ColdLoadTime(230.0),
        }))
    }

    #[test]
    fn test_finish_once_forwards_first_only() {
        let sink = Arc::new(CollectingSink::new());
        let guard = FinishOnce::new(sink.clone());

        assert!(!guard.is_finished());
        assert!(guard.finish(success()));
        assert!(guard.is_finished());

        let failure = Report::failure(&ProbeError::WaitTimeout { waited_ms: 1 }, None);
        assert!(!guard.finish(failure));

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_success());
    }

    #[test]
    fn test_guards_are_per_invocation() {
        let sink = Arc::new(CollectingSink::new());
        let first = FinishOnce::new(sink.clone());
        let second = FinishOnce::new(sink.clone());

        assert!(first.finish(success()));
        assert!(second.finish(Report::failure(
            &ProbeError::NotFound {
                app: "Nope".to_string(),
            },
            Some("Nope"),
        )));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.drain()[1].failure_kind(), Some(FailureKind::NotFound));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_json_lines_sink() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.finish(success());
        sink.finish(success());

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["result"]["probe"], "launch");
        assert_eq!(value["result"]["cold_load_time"], 230.0);
    }
}
