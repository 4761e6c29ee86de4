use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use stampede_client::engine::supervisor::Supervisor;
use stampede_client::metrics::Counters;
use stampede_client::reporter::Reporter;
use stampede_common::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// WebSocket connection-flood load generator.
#[derive(Parser, Debug)]
#[command(name = "stampede-client")]
struct Args {
    /// Path to a YAML config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket endpoint to flood, e.g. ws://127.0.0.1:8080/ws.
    #[arg(long)]
    url: Option<String>,

    /// New connections spawned per ramp tick.
    #[arg(long)]
    connections_per_tick: Option<usize>,

    /// Total connection ceiling.
    #[arg(long)]
    max_connections: Option<usize>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_yaml::from_str(&fs::read_to_string(path)?)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &args.url {
        config.target.url = url.clone();
    }
    if let Some(n) = args.connections_per_tick {
        config.ramp.connections_per_tick = n;
    }
    if let Some(n) = args.max_connections {
        config.ramp.max_connections = n;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args = Args::parse();
    let config = load_config(&args)?;

    let counters = Counters::new();
    let shutdown = CancellationToken::new();

    let reporter = Reporter::create(
        &config.reporter.path,
        counters.clone(),
        Duration::from_secs(config.reporter.interval_secs),
    )
    .await?;
    tokio::spawn(reporter.run());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    info!(
        url = %config.target.url,
        max_connections = config.ramp.max_connections,
        "stampede-client started"
    );

    Supervisor::new(&config, counters.clone(), shutdown)
        .run()
        .await;

    let last = counters.snapshot();
    info!(issued = last.issued, failed = last.failed, "all workers drained");
    Ok(())
}
