// ABOUTME: Server binary - loads configuration, wires resources, and serves the HTTP API
// ABOUTME: Flags override environment defaults for port and database URL
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! GoFast Garmin integration server.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gofast_garmin::cache;
use gofast_garmin::config::ServerConfig;
use gofast_garmin::context::ServerResources;
use gofast_garmin::database::Database;
use gofast_garmin::logging::LoggingConfig;
use gofast_garmin::routes::create_router;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "gofast-garmin-server",
    about = "GoFast Garmin integration service",
    version
)]
struct Args {
    /// HTTP port to bind (overrides HTTP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    LoggingConfig::from_env().init();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    let database = Database::new(&config.database_url).await?;
    let verifiers = cache::factory::build(&cache::factory::config_from_env()).await?;
    let config = Arc::new(config);
    let resources = Arc::new(ServerResources::new(database, verifiers, config.clone()));

    let app = create_router(resources);
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
