//! HTTP server hosting the Parley agent
//!
//! Loads the YAML configuration, builds the shared services once and serves
//! the chat and ingestion endpoints until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use parley_core::config::ConfigLoader;
use parley_server::{build_router, shutdown_signal, AppState, Services};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Parley Server - retrieval-augmented chat and interview booking")]
struct Cli {
    #[clap(long, short, default_value = "parley.yaml", help = "Path to the YAML configuration file")]
    config: String,

    #[clap(long, help = "Address to listen on (overrides server.bind_addr)")]
    bind_addr: Option<String>,

    #[clap(long, short, help = "Log level (overrides logging.level)")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(LevelFilter::Info))
        .init();
    log::info!("Configuration loaded for agent: {}", config.agent.name);

    let bind_addr = cli.bind_addr.unwrap_or_else(|| config.server.bind_addr.clone());
    let bind_socket_addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind_addr, e))?;

    let services = Services::from_config(&config).await?;
    let state = AppState::build(&config, services)?;
    let router = build_router(state, config.server.max_upload_bytes);

    let listener = TcpListener::bind(bind_socket_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_socket_addr))?;
    log::info!("Parley server listening on {}", bind_socket_addr);
    log::info!("Health check: http://{}/health", bind_socket_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Parley server shut down gracefully.");
    Ok(())
}
