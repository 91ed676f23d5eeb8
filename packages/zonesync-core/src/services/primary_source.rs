//! Primary source event processing.
//!
//! Responsibilities:
//! - Consuming events from the primary playback-control driver
//! - Applying them through the same registry calls as external pushes
//! - Tracking whether the primary system is reachable at all

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::EventEmitter;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::zones::{
    NowPlayingSnapshot, PlaybackState, SnapshotApplied, Track, ZoneRegistry, ZoneSource,
};

/// Events produced by the primary-system driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A zone was enumerated (or renamed) without playback information.
    ZoneSeen { zone_id: String, zone_name: String },
    /// Full playback state of a zone.
    NowPlaying {
        zone_id: String,
        zone_name: String,
        state: PlaybackState,
        track: Option<Track>,
        seek_position: u32,
    },
    /// The position moved without any other change.
    Seek { zone_id: String, seek_position: u32 },
    /// The zone no longer exists upstream.
    ZoneRemoved { zone_id: String },
    /// The driver gained or lost its connection to the primary system.
    UpstreamChanged { connected: bool },
}

/// Whether the primary playback-control system is reachable.
#[derive(Debug, Default)]
pub struct UpstreamStatus {
    connected: AtomicBool,
}

impl UpstreamStatus {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stores the new value and returns the previous one.
    fn set(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }
}

/// Dependencies needed to apply an event; shared with the forwarder task.
#[derive(Clone)]
struct ProcessorDeps {
    registry: Arc<ZoneRegistry>,
    emitter: Arc<dyn EventEmitter>,
    upstream: Arc<UpstreamStatus>,
}

/// Applies primary-driver events to the registry.
pub struct PrimarySourceProcessor {
    deps: ProcessorDeps,
    event_rx: Arc<Mutex<Option<mpsc::Receiver<SourceEvent>>>>,
    spawner: TokioSpawner,
}

impl PrimarySourceProcessor {
    pub fn new(
        registry: Arc<ZoneRegistry>,
        emitter: Arc<dyn EventEmitter>,
        upstream: Arc<UpstreamStatus>,
        event_rx: mpsc::Receiver<SourceEvent>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            deps: ProcessorDeps {
                registry,
                emitter,
                upstream,
            },
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
            spawner,
        }
    }

    /// Applies a single event synchronously.
    pub fn handle_event(&self, event: SourceEvent) {
        Self::process_event_with_deps(&self.deps, event);
    }

    fn process_event_with_deps(deps: &ProcessorDeps, event: SourceEvent) {
        let now = Instant::now();
        match event {
            SourceEvent::ZoneSeen { zone_id, zone_name } => {
                let upsert = match deps
                    .registry
                    .upsert_zone(ZoneSource::Primary, &zone_id, &zone_name, now)
                {
                    Ok(upsert) => upsert,
                    Err(e) => {
                        log::warn!("[PrimarySource] Ignoring zone {}: {}", zone_id, e);
                        return;
                    }
                };
                let reconnected = deps.registry.mark_seen(&zone_id, now);
                if upsert.listing_changed() || reconnected {
                    deps.emitter.emit_zones_changed();
                }
            }
            SourceEvent::NowPlaying {
                zone_id,
                zone_name,
                state,
                track,
                seek_position,
            } => {
                let upsert = match deps
                    .registry
                    .upsert_zone(ZoneSource::Primary, &zone_id, &zone_name, now)
                {
                    Ok(upsert) => upsert,
                    Err(e) => {
                        log::warn!("[PrimarySource] Ignoring update for {}: {}", zone_id, e);
                        return;
                    }
                };
                let snapshot = NowPlayingSnapshot::new(&zone_id, state, track, seek_position, now);
                if let SnapshotApplied::Applied { reconnected } =
                    deps.registry.record_snapshot(snapshot)
                {
                    if upsert.listing_changed() || reconnected {
                        deps.emitter.emit_zones_changed();
                    }
                    if let Some(current) = deps.registry.get_snapshot(&zone_id) {
                        deps.emitter.emit_now_playing(current);
                    }
                }
            }
            SourceEvent::Seek {
                zone_id,
                seek_position,
            } => {
                if deps.registry.source_of(&zone_id) != Some(ZoneSource::Primary) {
                    log::debug!("[PrimarySource] Seek for unknown zone {} dropped", zone_id);
                    return;
                }
                if let Some(moved) = deps.registry.record_seek(&zone_id, seek_position, now) {
                    deps.emitter.emit_seek(&zone_id, moved.seek_position);
                }
            }
            SourceEvent::ZoneRemoved { zone_id } => {
                if deps.registry.source_of(&zone_id) == Some(ZoneSource::Primary)
                    && deps.registry.remove_zone(&zone_id)
                {
                    deps.emitter.emit_zones_changed();
                }
            }
            SourceEvent::UpstreamChanged { connected } => {
                let was_connected = deps.upstream.set(connected);
                if was_connected == connected {
                    return;
                }
                if connected {
                    log::info!("[PrimarySource] Upstream connected");
                    return;
                }

                log::warn!("[PrimarySource] Upstream lost, disconnecting primary zones");
                let mut changed = false;
                for (zone_id, last_seen) in deps.registry.connected_zones(ZoneSource::Primary) {
                    if let Some(stopped) = deps.registry.mark_disconnected(&zone_id, last_seen) {
                        deps.emitter.emit_now_playing(stopped);
                        changed = true;
                    }
                }
                if changed {
                    deps.emitter.emit_zones_changed();
                }
            }
        }
    }

    /// Spawns a task forwarding driver events until the channel closes or
    /// `cancel` fires.
    pub fn start_event_forwarder(&self, cancel: CancellationToken) {
        let deps = self.deps.clone();
        let event_rx = Arc::clone(&self.event_rx);

        self.spawner.spawn_service("primary event forwarder", async move {
            let rx = event_rx.lock().take();
            let Some(mut rx) = rx else {
                log::warn!("[PrimarySource] Event forwarder already started");
                return;
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => Self::process_event_with_deps(&deps, event),
                        None => {
                            log::info!("[PrimarySource] Driver channel closed");
                            break;
                        }
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::{Emitted, RecordingEmitter};
    use crate::zones::Connectivity;

    fn setup() -> (
        Arc<ZoneRegistry>,
        Arc<RecordingEmitter>,
        Arc<UpstreamStatus>,
        PrimarySourceProcessor,
        mpsc::Sender<SourceEvent>,
    ) {
        let registry = Arc::new(ZoneRegistry::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let upstream = Arc::new(UpstreamStatus::new(true));
        let (tx, rx) = mpsc::channel(16);
        let processor = PrimarySourceProcessor::new(
            Arc::clone(&registry),
            emitter.clone(),
            Arc::clone(&upstream),
            rx,
            TokioSpawner::current(),
        );
        (registry, emitter, upstream, processor, tx)
    }

    fn now_playing(zone_id: &str, position: u32) -> SourceEvent {
        SourceEvent::NowPlaying {
            zone_id: zone_id.into(),
            zone_name: "Living Room".into(),
            state: PlaybackState::Playing,
            track: Some(Track {
                title: "Teardrop".into(),
                artist: "Massive Attack".into(),
                album: "Mezzanine".into(),
                duration_seconds: 330,
                artwork_ref: Some("art/1".into()),
            }),
            seek_position: position,
        }
    }

    #[tokio::test]
    async fn now_playing_creates_primary_zone() {
        let (registry, emitter, _upstream, processor, _tx) = setup();
        processor.handle_event(now_playing("p1", 20));

        assert_eq!(registry.source_of("p1"), Some(ZoneSource::Primary));
        let events = emitter.take();
        assert_eq!(events[0], Emitted::ZonesChanged);
        assert!(matches!(&events[1], Emitted::NowPlaying(s) if s.seek_position == 20));
    }

    #[tokio::test]
    async fn seek_emits_clamped_position() {
        let (_registry, emitter, _upstream, processor, _tx) = setup();
        processor.handle_event(now_playing("p1", 20));
        emitter.take();

        processor.handle_event(SourceEvent::Seek {
            zone_id: "p1".into(),
            seek_position: 999,
        });
        assert_eq!(emitter.take(), vec![Emitted::Seek("p1".into(), 330)]);
    }

    #[tokio::test]
    async fn zone_seen_twice_emits_once() {
        let (_registry, emitter, _upstream, processor, _tx) = setup();
        let seen = SourceEvent::ZoneSeen {
            zone_id: "p1".into(),
            zone_name: "Den".into(),
        };
        processor.handle_event(seen.clone());
        processor.handle_event(seen);
        assert_eq!(emitter.zones_changed_count(), 1);
    }

    #[tokio::test]
    async fn upstream_loss_stops_all_primary_zones() {
        let (registry, emitter, upstream, processor, _tx) = setup();
        processor.handle_event(now_playing("p1", 1));
        processor.handle_event(now_playing("p2", 2));
        registry
            .upsert_zone(ZoneSource::External, "ext", "Patio", Instant::now())
            .unwrap();
        emitter.take();

        processor.handle_event(SourceEvent::UpstreamChanged { connected: false });

        assert!(!upstream.is_connected());
        for id in ["p1", "p2"] {
            assert_eq!(
                registry.get_zone(id).unwrap().connectivity,
                Connectivity::Disconnected
            );
            assert_eq!(registry.get_snapshot(id).unwrap().state, PlaybackState::Stopped);
        }
        assert_eq!(
            registry.get_zone("ext").unwrap().connectivity,
            Connectivity::Connected
        );
        assert_eq!(emitter.zones_changed_count(), 1);

        // Repeated loss is a no-op.
        emitter.take();
        processor.handle_event(SourceEvent::UpstreamChanged { connected: false });
        assert!(emitter.take().is_empty());
    }

    #[tokio::test]
    async fn zone_seen_after_upstream_recovery_reconnects() {
        let (registry, emitter, upstream, processor, _tx) = setup();
        let seen = SourceEvent::ZoneSeen {
            zone_id: "p1".into(),
            zone_name: "Den".into(),
        };
        processor.handle_event(seen.clone());
        processor.handle_event(SourceEvent::UpstreamChanged { connected: false });
        processor.handle_event(SourceEvent::UpstreamChanged { connected: true });
        assert!(upstream.is_connected());
        assert_eq!(
            registry.get_zone("p1").unwrap().connectivity,
            Connectivity::Disconnected
        );
        emitter.take();

        processor.handle_event(seen.clone());

        assert_eq!(
            registry.get_zone("p1").unwrap().connectivity,
            Connectivity::Connected
        );
        assert_eq!(emitter.take(), vec![Emitted::ZonesChanged]);

        processor.handle_event(seen);
        assert!(emitter.take().is_empty());
    }

    #[tokio::test]
    async fn primary_events_cannot_touch_external_zones() {
        let (registry, emitter, _upstream, processor, _tx) = setup();
        registry
            .upsert_zone(ZoneSource::External, "ext", "Patio", Instant::now())
            .unwrap();

        processor.handle_event(now_playing("ext", 5));
        processor.handle_event(SourceEvent::ZoneRemoved {
            zone_id: "ext".into(),
        });

        assert!(registry.get_snapshot("ext").is_none());
        assert!(registry.get_zone("ext").is_some());
        assert!(emitter.take().is_empty());
    }

    #[tokio::test]
    async fn forwarder_applies_channel_events() {
        let (registry, _emitter, _upstream, processor, tx) = setup();
        let cancel = CancellationToken::new();
        processor.start_event_forwarder(cancel.clone());

        tx.send(now_playing("p1", 3)).await.unwrap();
        tx.send(SourceEvent::ZoneRemoved {
            zone_id: "p1".into(),
        })
        .await
        .unwrap();
        tx.send(SourceEvent::ZoneSeen {
            zone_id: "p2".into(),
            zone_name: "Den".into(),
        })
        .await
        .unwrap();

        for _ in 0..100 {
            if registry.get_zone("p2").is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.get_zone("p1").is_none());
        assert!(registry.get_zone("p2").is_some());
        cancel.cancel();
    }
}
