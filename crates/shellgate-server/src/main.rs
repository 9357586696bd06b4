// ABOUTME: CLI entry point for the shellgate HTTP server binary
// ABOUTME: Parses arguments, loads the service file, and starts the axum HTTP server
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use shellgate::GatewayError;

use shellgate_server::config::ServiceConfig;
use shellgate_server::router;
use shellgate_server::state::ServerState;

/// shellgate-server: command-line handlers as streaming HTTP endpoints
#[derive(Parser)]
#[command(name = "shellgate-server", version, about)]
struct Cli {
    /// Service file (TOML)
    #[arg(long, short = 'c', default_value = "shellgate.toml")]
    config: PathBuf,

    /// Override the listen port from the service file
    #[arg(long)]
    port: Option<u16>,

    /// Override the listen host from the service file
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.service.port = port;
    }
    if let Some(host) = cli.host {
        config.service.host = host;
    }

    let addr = format!("{}:{}", config.service.host, config.service.port);
    let app_name = config.service.app_name.clone();
    let endpoints = config.endpoints.len();

    let state = Arc::new(ServerState::new(config)?);
    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(
        address = %addr,
        service = %app_name,
        endpoints,
        "Starting shellgate server"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| GatewayError::internal(format!("Server error: {e}")))?;

    Ok(())
}
