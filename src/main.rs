//! API gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ pipeline
//!                                      ├─ exception containment
//!                                      ├─ request logging
//!                                      └─ forward ──▶ routing ──▶ invoker ──▶ Upstream
//!                                                                 (breaker + retries)
//!     Client Response
//!     ◀────────────── upstream response, or 404/413/502/503/504/500
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::loader::load_config;
use api_gateway::config::GatewayConfig;
use api_gateway::lifecycle::signals::shutdown_on_signal;
use api_gateway::observability::{logging, metrics};
use api_gateway::{GatewayError, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "HTTP API gateway with per-upstream resilience")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        upstreams = config.upstreams.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    serve(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<GatewayConfig, GatewayError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    Ok(config)
}

async fn serve(config: GatewayConfig) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    tokio::spawn(shutdown_on_signal(server.shutdown_handle()));
    server.run(listener).await
}
