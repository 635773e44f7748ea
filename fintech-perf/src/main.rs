use anyhow::Context;
use clap::{Parser, ValueEnum};
use fintech_perf::core::{ConfigError, Properties, RuntimeConfig, SimulationKind};
use fintech_perf::{RunReport, Simulation};
#[cfg(feature = "metrics")]
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "fintech_perf=info";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SimulationArg {
    Auth,
    Funding,
    Payment,
    All,
}

impl SimulationArg {
    fn kinds(self) -> Vec<SimulationKind> {
        match self {
            SimulationArg::Auth => vec![SimulationKind::Auth],
            SimulationArg::Funding => vec![SimulationKind::Funding],
            SimulationArg::Payment => vec![SimulationKind::Payment],
            SimulationArg::All => SimulationKind::ALL.to_vec(),
        }
    }
}

/// Load and consistency tests against the financial API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Simulation to run.
    #[arg(short, long, value_enum, default_value_t = SimulationArg::All)]
    simulation: SimulationArg,

    /// Property override, highest precedence (e.g. `-D perf.profile=baseline`).
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_override)]
    properties: Vec<(String, String)>,

    /// Print reports as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Expose request metrics on a Prometheus endpoint at this address.
    #[cfg(feature = "metrics")]
    #[arg(long, value_name = "ADDR")]
    prometheus: Option<SocketAddr>,
}

fn parse_override(arg: &str) -> Result<(String, String), ConfigError> {
    Properties::parse_override(arg)
}

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let config = match RuntimeConfig::load(cli.properties.iter().cloned().collect()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };
    info!("Resolved configuration: {config}");

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.prometheus {
        if let Err(err) = install_exporter(addr) {
            error!("{err:#}");
            return ExitCode::from(2);
        }
    }

    let mut passed = true;
    for kind in cli.simulation.kinds() {
        let report = match Simulation::from_config(kind, &config).await {
            Ok(report) => report,
            Err(err) => {
                error!("{err}");
                return ExitCode::from(2);
            }
        };

        if let Err(err) = print_report(&report, cli.json) {
            error!("{err:#}");
            return ExitCode::from(2);
        }
        passed &= report.passed();
    }

    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("Serializing run report")?;
        println!("{text}");
    } else {
        println!("{report}");
    }
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Installing Prometheus exporter on {addr}"))
}
