use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use stampede_common::HubConfig;
use stampede_hub::hub::Hub;
use stampede_hub::{metrics, server};
use tokio::net::TcpListener;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Broadcast hub for WebSocket connection-flood benching.
#[derive(Parser, Debug)]
#[command(name = "stampede-hub")]
struct Args {
    /// Path to a YAML config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override, e.g. 0.0.0.0:8080.
    #[arg(long)]
    listen: Option<String>,
}

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Production structured logging initialized (JSON)");
}

async fn metrics_handler(req: Request<Body>, hub: Hub) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(metrics::render_metrics(
            hub.connected_peers(),
        )))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn run_metrics_server(port: u16, hub: Hub) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics::register_metrics();

    let make_svc = make_service_fn(move |_conn| {
        let hub = hub.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| metrics_handler(req, hub.clone())))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

/// Logs uptime and population on a fixed interval, mirroring what the
/// load-generating side writes to its stats file.
async fn run_stats_monitor(hub: Hub, period: Duration) {
    let started = Instant::now();
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        info!(
            uptime_secs = started.elapsed().as_secs_f64(),
            connected = hub.connected_peers(),
            "hub stats"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let args = Args::parse();
    let mut config: HubConfig = match &args.config {
        Some(path) => serde_yaml::from_str(&fs::read_to_string(path)?)?,
        None => HubConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }

    let hub = Hub::spawn();
    let master_token = CancellationToken::new();

    if config.metrics.enabled {
        let port = config.metrics.port;
        let metrics_hub = hub.clone();
        tokio::spawn(async move {
            run_metrics_server(port, metrics_hub).await;
        });
    }

    let stats_hub = hub.clone();
    let stats_token = master_token.clone();
    let stats_period = Duration::from_secs(config.stats.interval_secs);
    tokio::spawn(async move {
        tokio::select! {
            _ = run_stats_monitor(stats_hub, stats_period) => {},
            _ = stats_token.cancelled() => {
                info!("Stats monitor shutting down");
            }
        }
    });

    let listener = TcpListener::bind(&config.server.listen_address).await?;
    info!(listen_addr = %config.server.listen_address, "stampede-hub started");

    let signal_token = master_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    server::serve(listener, hub, config.peer.send_queue_depth, master_token).await;
    Ok(())
}
