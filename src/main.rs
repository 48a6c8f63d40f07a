//! formatter-relay HTTP server
//!
//! Resolves the tool cascades from configuration and the environment, then
//! serves the tool endpoints with Axum.

use clap::Parser;
use formatter_relay::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Configuration template written to {path}");
            }
            None => print!("{template}"),
        }
        return Ok(());
    }

    let (config, source) = if Path::new(&cli.config).exists() {
        (Config::from_file(&cli.config)?, cli.config.as_str())
    } else {
        (Config::builtin()?, "built-in")
    };

    telemetry::init(&config.observability.log_level);
    tracing::info!(config = source, "Configuration loaded");

    let host: IpAddr = config.server.host.parse().map_err(|e| {
        format!("invalid server.host '{}': {e}", config.server.host)
    })?;
    let addr = SocketAddr::from((host, config.server.port));

    let state = AppState::new(Arc::new(config))?;
    let app = handlers::router(state);

    tracing::info!(%addr, "Starting formatter-relay");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
