//! Shared test utilities for probe integration tests

#![allow(dead_code)]

use std::sync::Arc;

use perf_probe::{
    config::{LaunchConfig, SamplerConfig, SeriesConfig},
    host::{Host, SimulatedHost},
    model::{FailureKind, Report},
    probe::{FrameSampler, LaunchProbe, LaunchSeries},
    report::CollectingSink,
};

/// A simulated host wired to a collecting sink
pub struct ProbeTestContext {
    pub sim:  Arc<SimulatedHost>,
    pub host: Host,
    pub sink: Arc<CollectingSink>,
}

impl ProbeTestContext {
    /// Context over the default simulated host
    pub fn new() -> Self {
        Self::with_host(SimulatedHost::new())
    }

    /// Context over a customized simulated host
    pub fn with_host(sim: SimulatedHost) -> Self {
        let sim = Arc::new(sim);
        Self {
            host: Host::simulated(sim.clone()),
            sim,
            sink: Arc::new(CollectingSink::new()),
        }
    }

    pub fn launch_probe(&self, config: LaunchConfig) -> LaunchProbe {
        LaunchProbe::new(self.host.clone(), config)
    }

    pub fn sampler(&self, config: SamplerConfig, app: &str) -> FrameSampler {
        FrameSampler::new(self.host.clone(), config, app, self.sink.clone())
    }

    pub fn series(&self, launch: LaunchConfig, config: SeriesConfig) -> LaunchSeries {
        LaunchSeries::new(self.host.clone(), launch, config)
    }

    /// Every report the sink received
    pub fn reports(&self) -> Vec<Report> {
        self.sink.reports()
    }

    /// The single report the sink received
    pub fn only_report(&self) -> Report {
        let reports = self.sink.reports();
        assert_eq!(reports.len(), 1, "expected exactly one report, got {reports:?}");
        reports.into_iter().next().expect("one report")
    }

    /// Failure kinds in report order, `None` for successes
    pub fn failure_kinds(&self) -> Vec<Option<FailureKind>> {
        self.sink.reports().iter().map(Report::failure_kind).collect()
    }
}

/// Launch config with a bounded two second wait
pub fn bounded_launch(signal: perf_probe::model::CompletionSignal) -> LaunchConfig {
    LaunchConfig {
        signal,
        timeout_ms: Some(2_000),
        ..LaunchConfig::default()
    }
}
