//! Zonesync Server - Standalone headless server for Zonesync.
//!
//! Hosts the zone registry, accepts now-playing pushes from external
//! sources, and serves the display WebSocket.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use zonesync_core::{bootstrap_services, start_server, AppState, LoggingEventEmitter};

use crate::config::ServerConfig;

/// Zonesync Server - Keeps wall displays in step with listening zones.
#[derive(Parser, Debug)]
#[command(name = "zonesync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ZONESYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "ZONESYNC_BIND_PORT")]
    port: Option<u16>,

    /// Base URL for artwork pass-through (overrides config file).
    #[arg(long, value_name = "URL")]
    artwork_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Zonesync Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.artwork_base_url {
        config.artwork_base_url = Some(url);
    }

    log::info!(
        "Configuration: bind_port={}, external_timeout={}s, sweep_interval={}s",
        config.bind_port,
        config.external_timeout_secs,
        config.sweep_interval_secs
    );

    let core_config = config.to_core_config();
    let handle = tokio::runtime::Handle::current();
    let services =
        bootstrap_services(&core_config, handle).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    if args.log_level >= log::LevelFilter::Debug {
        services
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    services.start_background_tasks();

    log::info!("Background tasks started");

    let app_state = AppState::new(&services);
    let server_shutdown = CancellationToken::new();
    let server_token = server_shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let result = start_server(app_state, server_token.clone()).await;
        if let Err(e) = &result {
            log::error!("Server error: {}", e);
        }
        server_token.cancel();
        result
    });

    // Wait for shutdown signal, or for the server to die on its own
    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        _ = server_shutdown.cancelled() => {}
    }

    // Close displays first so graceful shutdown is not held open by them
    services.shutdown().await;
    server_shutdown.cancel();

    let server_result = server_handle.await.context("Server task failed")?;

    log::info!("Shutdown complete");
    server_result.context("HTTP server exited with an error")
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
