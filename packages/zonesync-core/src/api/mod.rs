//! HTTP/WebSocket API layer.
//!
//! Handlers are thin and delegate to services. This module provides the
//! shared handler state and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::artwork::ArtworkResolver;
use crate::bootstrap::BootstrappedServices;
use crate::services::{ExternalSourceAdapter, SubscriptionBroadcaster, UpstreamStatus};
use crate::state::Config;
use crate::zones::ZoneRegistry;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ZoneRegistry>,
    pub external_source: Arc<ExternalSourceAdapter>,
    pub broadcaster: Arc<SubscriptionBroadcaster>,
    pub upstream: Arc<UpstreamStatus>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub artwork: Arc<dyn ArtworkResolver>,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(services: &BootstrappedServices) -> Self {
        Self {
            registry: Arc::clone(&services.registry),
            external_source: Arc::clone(&services.external_source),
            broadcaster: Arc::clone(&services.broadcaster),
            upstream: Arc::clone(&services.upstream),
            ws_manager: Arc::clone(&services.ws_manager),
            artwork: Arc::clone(&services.artwork),
            config: Arc::clone(&services.config),
        }
    }
}

/// Binds the configured port and serves until `shutdown` is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let port = state.config.read().bind_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server listening on http://{}", listener.local_addr()?);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
