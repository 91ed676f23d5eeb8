//! Application bootstrap and dependency wiring.
//!
//! This is the composition root: every service is created and wired here,
//! so all dependency relationships are visible in one place.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::artwork::{ArtworkResolver, HttpArtworkResolver, NoArtwork};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{
    ExternalSourceAdapter, PrimarySourceProcessor, SourceEvent, SubscriptionBroadcaster,
    UpstreamStatus,
};
use crate::state::Config;
use crate::zones::ZoneRegistry;

/// Capacity of the primary-driver event channel.
const SOURCE_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub registry: Arc<ZoneRegistry>,
    /// Per-connection fan-out to displays.
    pub broadcaster: Arc<SubscriptionBroadcaster>,
    /// Emitter handed to every source; forwards to the broadcaster.
    pub event_bridge: Arc<EventBridge>,
    pub external_source: Arc<ExternalSourceAdapter>,
    pub primary_source: Arc<PrimarySourceProcessor>,
    /// Driver side of the primary-source channel.
    pub primary_events: mpsc::Sender<SourceEvent>,
    pub upstream: Arc<UpstreamStatus>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub artwork: Arc<dyn ArtworkResolver>,
    pub config: Arc<RwLock<Config>>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the liveness sweep and the primary-source forwarder.
    pub fn start_background_tasks(&self) {
        self.external_source
            .start_sweep_task(self.cancel_token.child_token());
        self.primary_source
            .start_event_forwarder(self.cancel_token.child_token());
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let closed = self.ws_manager.close_all();
        if closed > 0 {
            log::info!("[Bootstrap] Closed {} display connection(s)", closed);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

fn create_artwork_resolver(config: &Config) -> SyncResult<Arc<dyn ArtworkResolver>> {
    let Some(base_url) = config.artwork_base_url.as_deref() else {
        return Ok(Arc::new(NoArtwork));
    };
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| SyncError::Configuration(format!("HTTP client: {}", e)))?;
    log::info!("[Bootstrap] Artwork resolved via {}", base_url);
    Ok(Arc::new(HttpArtworkResolver::new(client, base_url)))
}

/// Creates and wires all services.
///
/// Background tasks are not started; call
/// [`BootstrappedServices::start_background_tasks`] once the caller is ready.
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] if the configuration is invalid.
pub fn bootstrap_services(
    config: &Config,
    handle: tokio::runtime::Handle,
) -> SyncResult<BootstrappedServices> {
    config.validate().map_err(SyncError::Configuration)?;

    let spawner = TokioSpawner::new(handle);
    let cancel_token = CancellationToken::new();

    let registry = Arc::new(ZoneRegistry::new());
    let upstream = Arc::new(UpstreamStatus::new(false));

    let broadcaster = Arc::new(SubscriptionBroadcaster::new(
        Arc::clone(&registry),
        Arc::clone(&upstream),
        config.outbound_queue_capacity,
    ));
    let event_bridge = Arc::new(EventBridge::new(
        Arc::clone(&broadcaster) as Arc<dyn EventEmitter>
    ));
    let emitter: Arc<dyn EventEmitter> = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    let external_source = Arc::new(ExternalSourceAdapter::new(
        Arc::clone(&registry),
        Arc::clone(&emitter),
        config.external_timeout(),
        config.sweep_interval(),
        spawner.clone(),
    ));

    let (primary_events, primary_rx) = mpsc::channel(SOURCE_EVENT_CHANNEL_CAPACITY);
    let primary_source = Arc::new(PrimarySourceProcessor::new(
        Arc::clone(&registry),
        emitter,
        Arc::clone(&upstream),
        primary_rx,
        spawner,
    ));

    let ws_manager = Arc::new(WsConnectionManager::new(Arc::clone(&broadcaster)));
    let artwork = create_artwork_resolver(config)?;

    Ok(BootstrappedServices {
        registry,
        broadcaster,
        event_bridge,
        external_source,
        primary_source,
        primary_events,
        upstream,
        ws_manager,
        artwork,
        config: Arc::new(RwLock::new(config.clone())),
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::services::ExternalNowPlaying;
    use crate::zones::{Connectivity, PlaybackState};

    fn playing(position: u32) -> ExternalNowPlaying {
        ExternalNowPlaying {
            zone_name: Some("Patio".into()),
            state: Some(PlaybackState::Playing),
            title: Some("Hey Jude".into()),
            artist: Some("The Beatles".into()),
            album: None,
            duration_seconds: Some(431),
            seek_position: Some(position),
            artwork_ref: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = Config {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        let result = bootstrap_services(&config, tokio::runtime::Handle::current());
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn push_list_subscribe_timeout_end_to_end() {
        let services =
            bootstrap_services(&Config::default(), tokio::runtime::Handle::current()).unwrap();
        services.start_background_tasks();

        services
            .external_source
            .push_update("ext-1", playing(40))
            .unwrap();

        let mut rx = services.broadcaster.on_connect("ws-test");
        match rx.recv().await.unwrap() {
            ServerMessage::Connection {
                upstream_connected, ..
            } => assert!(!upstream_connected),
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerMessage::Zones { zones } => {
                assert_eq!(zones.len(), 1);
                assert_eq!(zones[0].id, "ext-1");
                assert_eq!(zones[0].connectivity, Connectivity::Connected);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(services.broadcaster.subscribe("ws-test", "ext-1"));
        match rx.recv().await.unwrap() {
            ServerMessage::NowPlaying {
                state,
                seek_position,
                ..
            } => {
                assert_eq!(state, PlaybackState::Playing);
                assert_eq!(seek_position, 40);
            }
            other => panic!("unexpected {:?}", other),
        }

        // No further pushes: the sweep at 90 s is the first to see > 60 s of silence.
        tokio::time::sleep(Duration::from_secs(95)).await;

        match rx.recv().await.unwrap() {
            ServerMessage::NowPlaying { state, .. } => assert_eq!(state, PlaybackState::Stopped),
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerMessage::Zones { zones } => {
                assert_eq!(zones[0].connectivity, Connectivity::Disconnected)
            }
            other => panic!("unexpected {:?}", other),
        }

        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
    }

    #[tokio::test]
    async fn primary_events_reach_registry() {
        let services =
            bootstrap_services(&Config::default(), tokio::runtime::Handle::current()).unwrap();
        services.start_background_tasks();

        services
            .primary_events
            .send(SourceEvent::UpstreamChanged { connected: true })
            .await
            .unwrap();
        services
            .primary_events
            .send(SourceEvent::ZoneSeen {
                zone_id: "p1".into(),
                zone_name: "Den".into(),
            })
            .await
            .unwrap();

        for _ in 0..100 {
            if services.registry.get_zone("p1").is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(services.upstream.is_connected());
        assert!(services.registry.get_zone("p1").is_some());
        services.shutdown().await;
    }
}
