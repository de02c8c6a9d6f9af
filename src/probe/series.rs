//! Repeated launch measurements
//!
//! A [`LaunchSeries`] collects `iterations` successful launches per app. Every
//! attempt is preceded by the configured delay. After a success the launched
//! app is killed so the next attempt starts cold; after a failure every app is
//! killed. Failures beyond the series' budget abort that app's series.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::LaunchProbe;
use crate::{
    config::{LaunchConfig, SeriesConfig},
    error::{ProbeError, ProbeOutcome},
    host::Host,
    model::LaunchResult,
    perf::{MetricSummary, timed},
    report::ReportSink,
};

/// Per-app outcome of a completed series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesSummary {
    /// App under measurement
    pub app:      String,
    /// Launch attempts made
    pub attempts: usize,
    /// Attempts that failed
    pub failures: usize,
    /// Summaries keyed by timing field name
    pub metrics:  BTreeMap<String, MetricSummary>,
}

/// Runs launch probes back to back with a failure budget
#[derive(Debug, Clone)]
pub struct LaunchSeries {
    host:   Host,
    probe:  LaunchProbe,
    config: SeriesConfig,
}

impl LaunchSeries {
    /// Creates a series runner
    pub fn new(host: Host, launch: LaunchConfig, config: SeriesConfig) -> Self {
        Self {
            probe: LaunchProbe::new(host.clone(), launch),
            host,
            config,
        }
    }

    /// Measures `app` until `iterations` launches succeeded.
    ///
    /// Each attempt reports to `sink` on its own. Returns
    /// [`ProbeError::SeriesAborted`] once more than
    /// [`SeriesConfig::failure_budget`] attempts failed.
    pub async fn run(&self, app: &str, sink: Arc<dyn ReportSink>) -> ProbeOutcome<SeriesSummary> {
        let budget = self.config.failure_budget();
        let delay = Duration::from_millis(self.config.delay_ms);
        info!(
            "Measuring '{}': {} iterations, {} failures allowed",
            app, self.config.iterations, budget
        );

        self.host.launcher.kill_all().await?;

        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut successes = 0;
        let mut failures = 0;
        let mut attempts = 0;

        while successes < self.config.iterations {
            attempts += 1;
            sleep(delay).await;

            let (outcome, took) = timed(self.attempt(app, sink.clone())).await;
            match outcome {
                Ok(result) => {
                    successes += 1;
                    debug!(
                        "'{}' {}/{}: {} = {:.1}ms (attempt took {:?})",
                        app,
                        successes,
                        self.config.iterations,
                        result.timing.metric(),
                        result.timing.value_ms(),
                        took
                    );
                    values
                        .entry(result.timing.metric().to_string())
                        .or_default()
                        .push(result.timing.value_ms());
                }
                Err(e) => {
                    failures += 1;
                    warn!("'{}' attempt {} failed: {}", app, attempts, e);
                    if let Err(kill_error) = self.host.launcher.kill_all().await {
                        warn!("Failed to kill apps after failed attempt: {}", kill_error);
                    }
                    if failures > budget {
                        return Err(ProbeError::SeriesAborted {
                            app: app.to_string(),
                            failures,
                            budget,
                        });
                    }
                }
            }
        }

        let metrics = values
            .into_iter()
            .filter_map(|(metric, values)| {
                MetricSummary::from_values(values).map(|summary| (metric, summary))
            })
            .collect();

        info!("'{}' series finished after {} attempts", app, attempts);
        Ok(SeriesSummary {
            app: app.to_string(),
            attempts,
            failures,
            metrics,
        })
    }

    /// Runs a series per app; an aborted app does not stop the others
    pub async fn run_all(
        &self,
        apps: &[String],
        sink: Arc<dyn ReportSink>,
    ) -> Vec<(String, ProbeOutcome<SeriesSummary>)> {
        let mut outcomes = Vec::with_capacity(apps.len());
        for app in apps {
            let outcome = self.run(app, sink.clone()).await;
            outcomes.push((app.clone(), outcome));
        }
        outcomes
    }

    /// One launch followed by killing the launched app.
    ///
    /// The launch has already been reported once `probe.run` returns, so a
    /// failed kill is logged and does not turn the attempt into a failure.
    async fn attempt(&self, app: &str, sink: Arc<dyn ReportSink>) -> ProbeOutcome<LaunchResult> {
        let result = self.probe.run(app, sink).await?;
        if let Err(e) = self.host.launcher.kill(&result.origin).await {
            warn!("Failed to kill {} after a measured launch: {}", result.origin, e);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        host::{AppLauncher, SimulatedHost},
        model::{App, CompletionSignal, FailureKind},
        report::CollectingSink,
    };

    /// Launches through the simulated host but refuses to kill single apps
    struct StubbornKill(Arc<SimulatedHost>);

    #[async_trait]
    impl AppLauncher for StubbornKill {
        async fn launch(&self, app: &App) -> ProbeOutcome<()> {
            self.0.launch(app).await
        }

        async fn kill(&self, _origin: &str) -> ProbeOutcome<()> {
            Err(ProbeError::host("kill", "process refused to die"))
        }

        async fn kill_all(&self) -> ProbeOutcome<()> {
            self.0.kill_all().await
        }
    }

    fn series(sim: SimulatedHost, iterations: usize) -> (LaunchSeries, Arc<SimulatedHost>) {
        let sim = Arc::new(sim);
        let launch = LaunchConfig {
            signal: CompletionSignal::FirstPaint,
            timeout_ms: Some(1_000),
            ..LaunchConfig::default()
        };
        let config = SeriesConfig {
            iterations,
            delay_ms: 500,
            fail_ratio: 0.2,
        };
        (LaunchSeries::new(Host::simulated(sim.clone()), launch, config), sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_every_iteration() {
        let (series, sim) = series(SimulatedHost::new(), 5);
        let sink = Arc::new(CollectingSink::new());

        let summary = series.run("Calculator", sink.clone()).await.unwrap();
        assert_eq!(summary.attempts, 5);
        assert_eq!(summary.failures, 0);

        let paint = &summary.metrics["time_to_paint"];
        assert_eq!(paint.count(), 5);
        assert_eq!(paint.min, 120.0);
        assert_eq!(paint.p95, 120.0);

        assert_eq!(sink.len(), 5);
        assert_eq!(sim.launches().len(), 5);
        assert!(!sim.is_running("app://calculator.gaiamobile.org"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_within_budget_are_retried() {
        let (series, _sim) = series(SimulatedHost::new().with_failing_launches(2), 10);
        let sink = Arc::new(CollectingSink::new());

        let summary = series.run("Clock", sink.clone()).await.unwrap();
        assert_eq!(summary.attempts, 12);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.metrics["time_to_paint"].count(), 10);

        let failed = sink.reports().iter().filter(|r| !r.is_success()).count();
        assert_eq!(failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exceeding_budget_aborts() {
        let (series, _sim) = series(SimulatedHost::new().with_failing_launches(3), 10);
        let sink = Arc::new(CollectingSink::new());

        let err = series.run("Clock", sink.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            ProbeError::SeriesAborted {
                failures: 3,
                budget: 2,
                ..
            }
        ));
        assert_eq!(err.kind(), FailureKind::SeriesAborted);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_kill_keeps_reported_success() {
        let sim = Arc::new(SimulatedHost::new());
        let mut host = Host::simulated(sim.clone());
        host.launcher = Arc::new(StubbornKill(sim.clone()));
        let launch = LaunchConfig {
            signal: CompletionSignal::FirstPaint,
            timeout_ms: Some(1_000),
            ..LaunchConfig::default()
        };
        let config = SeriesConfig {
            iterations: 1,
            delay_ms: 500,
            fail_ratio: 0.0,
        };
        let series = LaunchSeries::new(host, launch, config);
        let sink = Arc::new(CollectingSink::new());

        let summary = series.run("Calculator", sink.clone()).await.unwrap();
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.attempts, 1);
        assert_eq!(sink.len(), 1);
        assert!(sink.reports()[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_continues_after_abort() {
        let (series, _sim) = series(SimulatedHost::new(), 2);
        let sink = Arc::new(CollectingSink::new());
        let apps = vec!["Nope".to_string(), "Gallery".to_string()];

        let outcomes = series.run_all(&apps, sink).await;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].1, Err(ProbeError::SeriesAborted { .. })));
        assert_eq!(outcomes[1].1.as_ref().unwrap().metrics["time_to_paint"].count(), 2);
    }
}
