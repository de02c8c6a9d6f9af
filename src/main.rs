//! perf-probe: launch latency and frame-rate probes against a simulated host
//!
//! Reports are written to stdout as JSON lines; logs go to stderr.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use perf_probe::{
    config::HarnessConfig,
    host::{Host, SimulatedHost},
    model::Report,
    probe::{FrameSampler, LaunchProbe, LaunchSeries},
    report::{CollectingSink, JsonLinesSink, ReportSink},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "perf-probe", version, about = "Measure app launch latency and frame rate")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "PERF_PROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch an app once and report its launch latency
    Launch {
        /// App name or origin
        app: String,
    },
    /// Launch each app repeatedly and summarize the timings
    Series {
        /// App names or origins
        #[arg(required = true)]
        apps: Vec<String>,
    },
    /// Sample an app's frame rate for a fixed period
    Fps {
        /// App name or origin
        app:       String,
        /// Sampling period, overriding sampler.period_ms
        #[arg(long)]
        period_ms: Option<u64>,
    },
    /// Print the effective configuration
    Config,
    /// Print the JSON schema of report lines
    Schema,
}

fn init_logging(json: bool) {
    // Respects RUST_LOG, default level: info
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("perf_probe=info"));
    if json {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config =
        HarnessConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let host = Host::simulated(Arc::new(SimulatedHost::from_config(&config.simulation)));
    let sink: Arc<dyn ReportSink> = Arc::new(JsonLinesSink::stdout());

    let succeeded = match cli.command {
        Command::Launch { app } => {
            let probe = LaunchProbe::new(host, config.launch);
            probe.run(&app, sink).await.is_ok()
        }
        Command::Series { apps } => {
            let series = LaunchSeries::new(host, config.launch, config.series);
            let attempts = Arc::new(CollectingSink::new());
            let mut all_ok = true;
            for (app, outcome) in series.run_all(&apps, attempts.clone()).await {
                match outcome {
                    Ok(summary) => println!("{}", serde_json::to_string(&summary)?),
                    Err(e) => {
                        all_ok = false;
                        sink.finish(Report::failure(&e, Some(&app)));
                    }
                }
            }
            info!("Series finished with {} launch attempts", attempts.len());
            all_ok
        }
        Command::Fps { app, period_ms } => {
            let period = Duration::from_millis(period_ms.unwrap_or(config.sampler.period_ms));
            let mut sampler = FrameSampler::new(host, config.sampler, app, sink);
            sampler.sample_for(period).await.is_ok()
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            true
        }
        Command::Schema => {
            let schema = schemars::schema_for!(Report);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            true
        }
    };

    if succeeded {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("One or more probes failed");
        Ok(ExitCode::FAILURE)
    }
}
