//! External source adapter.
//!
//! Responsibilities:
//! - Validating HTTP push payloads from third-party sources
//! - Applying them to the registry as whole snapshots
//! - Detecting sources that went silent via a periodic liveness sweep

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult};
use crate::events::EventEmitter;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::validate_zone_id;
use crate::zones::{
    NowPlayingSnapshot, PlaybackState, SnapshotApplied, Track, ZoneRegistry, ZoneSource,
};

/// Body of `POST /sources/{zone_id}/now-playing`.
///
/// Every field is optional at the type level so that a missing field is a
/// validation error with a readable message rather than a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalNowPlaying {
    pub zone_name: Option<String>,
    pub state: Option<PlaybackState>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<u32>,
    pub seek_position: Option<u32>,
    pub artwork_ref: Option<String>,
}

/// Successful push/delete response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushAccepted {
    pub success: bool,
    pub zone_id: String,
}

impl PushAccepted {
    fn new(zone_id: &str) -> Self {
        Self {
            success: true,
            zone_id: zone_id.to_string(),
        }
    }
}

/// A push that passed validation.
struct ValidPush {
    zone_name: String,
    state: PlaybackState,
    track: Option<Track>,
    seek_position: u32,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_push(zone_id: &str, payload: ExternalNowPlaying) -> SyncResult<ValidPush> {
    validate_zone_id(zone_id).map_err(SyncError::Validation)?;

    let zone_name = non_empty(payload.zone_name)
        .ok_or_else(|| SyncError::Validation("zone_name is required".into()))?;
    let state = payload
        .state
        .ok_or_else(|| SyncError::Validation("state is required".into()))?;

    let title = non_empty(payload.title);
    let artist = non_empty(payload.artist);

    let track = match (title, artist) {
        (Some(title), Some(artist)) => Some(Track {
            title,
            artist,
            album: payload.album.unwrap_or_default(),
            duration_seconds: payload.duration_seconds.unwrap_or(0),
            artwork_ref: non_empty(payload.artwork_ref),
        }),
        (title, _) if state != PlaybackState::Stopped => {
            let missing = if title.is_none() { "title" } else { "artist" };
            return Err(SyncError::Validation(format!(
                "{} is required unless state is stopped",
                missing
            )));
        }
        _ => None,
    };

    Ok(ValidPush {
        zone_name,
        state,
        track,
        seek_position: payload.seek_position.unwrap_or(0),
    })
}

/// Applies pushes from third-party sources and times out silent ones.
pub struct ExternalSourceAdapter {
    registry: Arc<ZoneRegistry>,
    emitter: Arc<dyn EventEmitter>,
    timeout: Duration,
    sweep_interval: Duration,
    spawner: TokioSpawner,
}

impl ExternalSourceAdapter {
    /// Creates an adapter. `timeout` is the silence after which a zone is
    /// disconnected; `sweep_interval` is how often that is checked.
    pub fn new(
        registry: Arc<ZoneRegistry>,
        emitter: Arc<dyn EventEmitter>,
        timeout: Duration,
        sweep_interval: Duration,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            registry,
            emitter,
            timeout,
            sweep_interval,
            spawner,
        }
    }

    /// Validates and applies one push.
    ///
    /// On success the zone exists, is connected, and holds the pushed
    /// snapshot (unless a newer push for it landed concurrently).
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a malformed payload; nothing is touched
    /// - [`SyncError::ZoneConflict`] if the primary source owns the id
    pub fn push_update(
        &self,
        zone_id: &str,
        payload: ExternalNowPlaying,
    ) -> SyncResult<PushAccepted> {
        let push = validate_push(zone_id, payload)?;
        let now = Instant::now();

        let upsert = self
            .registry
            .upsert_zone(ZoneSource::External, zone_id, &push.zone_name, now)?;

        let snapshot =
            NowPlayingSnapshot::new(zone_id, push.state, push.track, push.seek_position, now);
        let applied = self.registry.record_snapshot(snapshot);

        match applied {
            SnapshotApplied::Applied { reconnected } => {
                if upsert.listing_changed() || reconnected {
                    self.emitter.emit_zones_changed();
                }
                if let Some(current) = self.registry.get_snapshot(zone_id) {
                    self.emitter.emit_now_playing(current);
                }
            }
            SnapshotApplied::Stale => {
                log::debug!(
                    "[ExternalSource] Push for {} superseded by a newer one",
                    zone_id
                );
                if upsert.listing_changed() {
                    self.emitter.emit_zones_changed();
                }
            }
            SnapshotApplied::UnknownZone => {
                // Deleted between upsert and snapshot.
                return Err(SyncError::ZoneNotFound(zone_id.to_string()));
            }
        }

        Ok(PushAccepted::new(zone_id))
    }

    /// Permanently removes an external zone.
    ///
    /// # Errors
    ///
    /// - [`SyncError::ZoneNotFound`] if no zone has this id
    /// - [`SyncError::ZoneConflict`] if the zone belongs to the primary source
    pub fn delete_zone(&self, zone_id: &str) -> SyncResult<PushAccepted> {
        match self.registry.source_of(zone_id) {
            None => return Err(SyncError::ZoneNotFound(zone_id.to_string())),
            Some(ZoneSource::Primary) => {
                return Err(SyncError::ZoneConflict(zone_id.to_string()))
            }
            Some(ZoneSource::External) => {}
        }
        if !self.registry.remove_zone(zone_id) {
            return Err(SyncError::ZoneNotFound(zone_id.to_string()));
        }
        self.emitter.emit_zones_changed();
        Ok(PushAccepted::new(zone_id))
    }

    /// Disconnects every external zone silent for longer than the timeout.
    ///
    /// Each transition is a compare-and-set on the `last_seen` value read at
    /// the start of the sweep, so a push landing mid-sweep always wins.
    /// Returns the number of zones disconnected.
    pub fn sweep(&self, now: Instant) -> usize {
        let stale = self
            .registry
            .stale_zones(ZoneSource::External, now, self.timeout);

        let mut disconnected = 0;
        for (zone_id, observed_last_seen) in stale {
            if let Some(stopped) = self.registry.mark_disconnected(&zone_id, observed_last_seen) {
                log::info!(
                    "[Sweep] {} silent for {:?}, marked disconnected",
                    zone_id,
                    now.saturating_duration_since(observed_last_seen)
                );
                self.emitter.emit_now_playing(stopped);
                disconnected += 1;
            }
        }
        if disconnected > 0 {
            self.emitter.emit_zones_changed();
        }
        disconnected
    }

    /// Spawns the periodic liveness sweep, stopped by `cancel`.
    pub fn start_sweep_task(self: &Arc<Self>, cancel: CancellationToken) {
        let adapter = Arc::clone(self);
        let period = self.sweep_interval;

        self.spawner.spawn_service("liveness sweep", async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        adapter.sweep(Instant::now());
                    }
                }
            }
        });
    }
}
