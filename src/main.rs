use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use log_relay::config::validation::validate_config;
use log_relay::config::{load_config, ConfigError, RelayConfig};
use log_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "log-relay")]
#[command(about = "Per-service and per-request log sinks with live tails", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path),
        None => {
            let config = RelayConfig::default();
            validate_config(&config)
                .map(|()| config)
                .map_err(ConfigError::Validation)
        }
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("log-relay: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "log-relay starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = match log_relay::start(config).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    relay.run_until_signal().await;
    ExitCode::SUCCESS
}
