//! Canonical in-memory store of zones and their latest snapshots.
//!
//! # Concurrency design
//!
//! Zones live in a `DashMap` keyed by zone id. Every mutation runs under the
//! entry's shard lock and swaps whole values (`Arc<NowPlayingSnapshot>`), so a
//! reader never sees a half-updated zone and unrelated zones never contend.
//!
//! Pushes and the liveness sweep race on the same zones. Both sides are
//! guarded by `last_seen`: a snapshot older than `last_seen` is discarded, and
//! the sweep only disconnects a zone if `last_seen` is still the value it
//! observed when it decided the zone was stale.
//!
//! Every stored snapshot is stamped with a registry-wide revision while the
//! entry is locked, so per zone the revisions follow the order of writes.
//! Broadcasters use it to discard an event that lost a race to a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::{SyncError, SyncResult};
use crate::zones::{
    Connectivity, NowPlayingSnapshot, PlaybackState, ZoneListing, ZoneSource,
};

/// Outcome of [`ZoneRegistry::upsert_zone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneUpsert {
    /// The zone did not exist before.
    Created,
    /// The zone existed and its display name changed.
    ListingChanged,
    /// The zone existed with the same metadata.
    Unchanged,
}

impl ZoneUpsert {
    /// Returns true if the zone was created by this call.
    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, ZoneUpsert::Created)
    }

    /// Returns true if displays need a fresh zone list.
    #[must_use]
    pub fn listing_changed(self) -> bool {
        !matches!(self, ZoneUpsert::Unchanged)
    }
}

/// Outcome of [`ZoneRegistry::record_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotApplied {
    /// The snapshot replaced the cached one.
    Applied {
        /// The zone was disconnected and is connected again.
        reconnected: bool,
    },
    /// A newer snapshot had already landed; this one was discarded.
    Stale,
    /// No zone with this id exists.
    UnknownZone,
}

#[derive(Debug)]
struct ZoneEntry {
    display_name: String,
    source: ZoneSource,
    connectivity: Connectivity,
    last_seen: Instant,
    snapshot: Option<Arc<NowPlayingSnapshot>>,
}

impl ZoneEntry {
    fn listing(&self, id: &str) -> ZoneListing {
        ZoneListing {
            id: id.to_string(),
            display_name: self.display_name.clone(),
            source: self.source,
            connectivity: self.connectivity,
        }
    }
}

/// Single source of truth for zone metadata and the latest snapshot per zone.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: DashMap<String, ZoneEntry>,
    revision: AtomicU64,
}

impl ZoneRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called with the zone's entry lock held.
    fn stamp(&self, mut snapshot: NowPlayingSnapshot) -> Arc<NowPlayingSnapshot> {
        snapshot.revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        Arc::new(snapshot)
    }

    /// Inserts a zone or updates its display name.
    ///
    /// `seen_at` becomes the zone's `last_seen` only when the zone is created;
    /// for existing zones liveness is driven by snapshots alone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ZoneConflict`] if the id already belongs to the
    /// other source kind. Zone ids never change owner.
    pub fn upsert_zone(
        &self,
        source: ZoneSource,
        zone_id: &str,
        display_name: &str,
        seen_at: Instant,
    ) -> SyncResult<ZoneUpsert> {
        match self.zones.entry(zone_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.source != source {
                    return Err(SyncError::ZoneConflict(zone_id.to_string()));
                }
                if entry.display_name == display_name {
                    Ok(ZoneUpsert::Unchanged)
                } else {
                    log::info!(
                        "[Registry] Zone {} renamed: {:?} -> {:?}",
                        zone_id,
                        entry.display_name,
                        display_name
                    );
                    entry.display_name = display_name.to_string();
                    Ok(ZoneUpsert::ListingChanged)
                }
            }
            Entry::Vacant(vacant) => {
                log::info!(
                    "[Registry] Zone created: {} ({:?}, {:?})",
                    zone_id,
                    display_name,
                    source
                );
                vacant.insert(ZoneEntry {
                    display_name: display_name.to_string(),
                    source,
                    connectivity: Connectivity::Connected,
                    last_seen: seen_at,
                    snapshot: None,
                });
                Ok(ZoneUpsert::Created)
            }
        }
    }

    /// Replaces the cached snapshot for `snapshot.zone_id`.
    ///
    /// Also sets `last_seen` to the snapshot's capture time and marks the
    /// zone connected. Snapshots captured before the current `last_seen` are
    /// discarded so an older update can never overwrite a newer one.
    pub fn record_snapshot(&self, snapshot: NowPlayingSnapshot) -> SnapshotApplied {
        let Some(mut entry) = self.zones.get_mut(&snapshot.zone_id) else {
            log::debug!(
                "[Registry] Snapshot for unknown zone {} dropped",
                snapshot.zone_id
            );
            return SnapshotApplied::UnknownZone;
        };

        if snapshot.captured_at < entry.last_seen {
            log::debug!(
                "[Registry] Stale snapshot for {} discarded",
                snapshot.zone_id
            );
            return SnapshotApplied::Stale;
        }

        let reconnected = entry.connectivity == Connectivity::Disconnected;
        if reconnected {
            log::info!("[Registry] Zone {} reconnected", snapshot.zone_id);
        }
        entry.last_seen = snapshot.captured_at;
        entry.connectivity = Connectivity::Connected;
        entry.snapshot = Some(self.stamp(snapshot));
        SnapshotApplied::Applied { reconnected }
    }

    /// Records that the source has reported `zone_id` again without a snapshot.
    ///
    /// Refreshes `last_seen` and reconnects the zone if it was disconnected.
    /// The cached snapshot is kept as is. Returns true on a reconnect; reports
    /// older than `last_seen` change nothing.
    pub fn mark_seen(&self, zone_id: &str, at: Instant) -> bool {
        let Some(mut entry) = self.zones.get_mut(zone_id) else {
            return false;
        };
        if at < entry.last_seen {
            return false;
        }
        entry.last_seen = at;
        if entry.connectivity == Connectivity::Connected {
            return false;
        }
        entry.connectivity = Connectivity::Connected;
        log::info!("[Registry] Zone {} reconnected", zone_id);
        true
    }

    /// Moves the cached snapshot of a connected zone to a new position.
    ///
    /// Returns the replacement snapshot, or `None` if the zone is unknown,
    /// disconnected, has no snapshot yet, or already has newer information.
    pub fn record_seek(
        &self,
        zone_id: &str,
        seek_position: u32,
        at: Instant,
    ) -> Option<Arc<NowPlayingSnapshot>> {
        let mut entry = self.zones.get_mut(zone_id)?;
        if entry.connectivity == Connectivity::Disconnected || at < entry.last_seen {
            return None;
        }
        let current = entry.snapshot.as_ref()?;
        let updated = self.stamp(current.with_position(seek_position, at));
        entry.last_seen = at;
        entry.snapshot = Some(Arc::clone(&updated));
        Some(updated)
    }

    /// Marks a zone disconnected if nothing has been heard since `observed_last_seen`.
    ///
    /// This is the sweep side of the compare-and-set: if a push landed after
    /// the caller read `last_seen`, the values differ and the transition is
    /// dropped. On success the cached snapshot is replaced by a stopped copy
    /// (or a bare stopped snapshot if none was cached) and returned.
    pub fn mark_disconnected(
        &self,
        zone_id: &str,
        observed_last_seen: Instant,
    ) -> Option<Arc<NowPlayingSnapshot>> {
        let mut entry = self.zones.get_mut(zone_id)?;
        if entry.connectivity == Connectivity::Disconnected {
            return None;
        }
        if entry.last_seen != observed_last_seen {
            log::debug!(
                "[Registry] Zone {} heard from since sweep read it, keeping connected",
                zone_id
            );
            return None;
        }

        let stopped = match entry.snapshot.as_deref() {
            Some(snapshot) => snapshot.stopped(),
            None => NowPlayingSnapshot::new(
                zone_id,
                PlaybackState::Stopped,
                None,
                0,
                entry.last_seen,
            ),
        };
        let stopped = self.stamp(stopped);
        entry.connectivity = Connectivity::Disconnected;
        entry.snapshot = Some(Arc::clone(&stopped));
        log::info!("[Registry] Zone {} marked disconnected", zone_id);
        Some(stopped)
    }

    /// Connected zones of `source` whose `last_seen` is more than `threshold` before `now`.
    ///
    /// Returns each zone id with the `last_seen` value that was read, ready to
    /// be passed back to [`mark_disconnected`](Self::mark_disconnected).
    pub fn stale_zones(
        &self,
        source: ZoneSource,
        now: Instant,
        threshold: Duration,
    ) -> Vec<(String, Instant)> {
        self.zones
            .iter()
            .filter(|r| {
                let entry = r.value();
                entry.source == source
                    && entry.connectivity == Connectivity::Connected
                    && now.saturating_duration_since(entry.last_seen) > threshold
            })
            .map(|r| (r.key().clone(), r.value().last_seen))
            .collect()
    }

    /// Connected zones of `source` with the `last_seen` value that was read.
    pub fn connected_zones(&self, source: ZoneSource) -> Vec<(String, Instant)> {
        self.zones
            .iter()
            .filter(|r| {
                r.value().source == source && r.value().connectivity == Connectivity::Connected
            })
            .map(|r| (r.key().clone(), r.value().last_seen))
            .collect()
    }

    /// Permanently removes a zone. Returns whether it existed.
    pub fn remove_zone(&self, zone_id: &str) -> bool {
        let existed = self.zones.remove(zone_id).is_some();
        if existed {
            log::info!("[Registry] Zone removed: {}", zone_id);
        }
        existed
    }

    /// Returns all zones ordered by display name, then id.
    ///
    /// The order only depends on zone metadata, never on insertion order or
    /// map layout, so repeated calls produce identical lists.
    pub fn list_zones(&self) -> Vec<ZoneListing> {
        let mut zones: Vec<ZoneListing> = self
            .zones
            .iter()
            .map(|r| r.value().listing(r.key()))
            .collect();
        zones.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        zones
    }

    /// Returns the latest snapshot for a zone, if one has been recorded.
    pub fn get_snapshot(&self, zone_id: &str) -> Option<Arc<NowPlayingSnapshot>> {
        self.zones.get(zone_id)?.snapshot.clone()
    }

    /// Returns the listing entry for a single zone.
    pub fn get_zone(&self, zone_id: &str) -> Option<ZoneListing> {
        self.zones.get(zone_id).map(|r| r.value().listing(zone_id))
    }

    /// Returns the owning source of a zone.
    pub fn source_of(&self, zone_id: &str) -> Option<ZoneSource> {
        self.zones.get(zone_id).map(|r| r.value().source)
    }

    /// Number of known zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns true if no zones are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Track;

    fn track() -> Track {
        Track {
            title: "A".into(),
            artist: "B".into(),
            album: String::new(),
            duration_seconds: 200,
            artwork_ref: None,
        }
    }

    fn snapshot(zone_id: &str, position: u32, at: Instant) -> NowPlayingSnapshot {
        NowPlayingSnapshot::new(zone_id, PlaybackState::Playing, Some(track()), position, at)
    }

    #[test]
    fn upsert_reports_creation_rename_and_noop() {
        let registry = ZoneRegistry::new();
        let now = Instant::now();

        let first = registry
            .upsert_zone(ZoneSource::External, "z1", "Office", now)
            .unwrap();
        assert!(first.is_new());

        let again = registry
            .upsert_zone(ZoneSource::External, "z1", "Office", now)
            .unwrap();
        assert_eq!(again, ZoneUpsert::Unchanged);
        assert!(!again.listing_changed());

        let renamed = registry
            .upsert_zone(ZoneSource::External, "z1", "Study", now)
            .unwrap();
        assert_eq!(renamed, ZoneUpsert::ListingChanged);
        assert_eq!(registry.get_zone("z1").unwrap().display_name, "Study");
    }

    #[test]
    fn zone_ids_keep_their_source() {
        let registry = ZoneRegistry::new();
        let now = Instant::now();
        registry
            .upsert_zone(ZoneSource::Primary, "kitchen", "Kitchen", now)
            .unwrap();

        let err = registry
            .upsert_zone(ZoneSource::External, "kitchen", "Kitchen", now)
            .unwrap_err();
        assert!(matches!(err, SyncError::ZoneConflict(id) if id == "kitchen"));
        assert_eq!(registry.source_of("kitchen"), Some(ZoneSource::Primary));
    }

    #[test]
    fn snapshot_for_unknown_zone_is_rejected() {
        let registry = ZoneRegistry::new();
        let result = registry.record_snapshot(snapshot("ghost", 1, Instant::now()));
        assert_eq!(result, SnapshotApplied::UnknownZone);
        assert!(registry.get_snapshot("ghost").is_none());
    }

    #[test]
    fn newest_snapshot_wins_regardless_of_arrival_order() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::External, "z1", "Office", base)
            .unwrap();

        // Capture offsets in seconds, delivered out of order.
        let arrivals = [3u64, 1, 7, 2, 7, 5, 9, 4, 8];
        let mut max_applied = 0;
        for offset in arrivals {
            let at = base + Duration::from_secs(offset);
            let result = registry.record_snapshot(snapshot("z1", offset as u32, at));
            if offset >= max_applied {
                assert!(matches!(result, SnapshotApplied::Applied { .. }));
                max_applied = offset;
            } else {
                assert_eq!(result, SnapshotApplied::Stale);
            }
            let current = registry.get_snapshot("z1").unwrap();
            assert_eq!(current.seek_position as u64, max_applied);
        }
    }

    #[test]
    fn sweep_loses_to_a_push_that_landed_after_it_read() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::External, "z1", "Office", base)
            .unwrap();
        registry.record_snapshot(snapshot("z1", 10, base));

        let now = base + Duration::from_secs(61);
        let stale = registry.stale_zones(ZoneSource::External, now, Duration::from_secs(60));
        assert_eq!(stale, vec![("z1".to_string(), base)]);

        // The source comes back between the sweep's read and its write.
        registry.record_snapshot(snapshot("z1", 70, now));

        assert!(registry.mark_disconnected("z1", base).is_none());
        let zone = registry.get_zone("z1").unwrap();
        assert_eq!(zone.connectivity, Connectivity::Connected);
        let current = registry.get_snapshot("z1").unwrap();
        assert_eq!(current.state, PlaybackState::Playing);
        assert_eq!(current.seek_position, 70);
    }

    #[test]
    fn disconnect_forces_stopped_and_reconnect_is_reported() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::External, "z1", "Office", base)
            .unwrap();
        registry.record_snapshot(snapshot("z1", 10, base));

        let stopped = registry.mark_disconnected("z1", base).unwrap();
        assert_eq!(stopped.state, PlaybackState::Stopped);
        assert_eq!(stopped.track, Some(track()));
        assert_eq!(
            registry.get_zone("z1").unwrap().connectivity,
            Connectivity::Disconnected
        );
        // A second sweep is a no-op.
        assert!(registry.mark_disconnected("z1", base).is_none());
        // Seeks do not revive a disconnected zone.
        assert!(registry
            .record_seek("z1", 20, base + Duration::from_secs(1))
            .is_none());

        let result = registry.record_snapshot(snapshot("z1", 0, base + Duration::from_secs(90)));
        assert_eq!(result, SnapshotApplied::Applied { reconnected: true });
        assert_eq!(
            registry.get_zone("z1").unwrap().connectivity,
            Connectivity::Connected
        );
    }

    #[test]
    fn mark_seen_reconnects_and_keeps_snapshot() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::Primary, "p1", "Den", base)
            .unwrap();
        registry.record_snapshot(snapshot("p1", 10, base));
        assert!(!registry.mark_seen("p1", base), "already connected");

        registry.mark_disconnected("p1", base).unwrap();
        assert!(!registry.mark_seen("ghost", base));
        assert!(registry.mark_seen("p1", base + Duration::from_secs(5)));
        assert_eq!(
            registry.get_zone("p1").unwrap().connectivity,
            Connectivity::Connected
        );
        assert_eq!(
            registry.get_snapshot("p1").unwrap().state,
            PlaybackState::Stopped
        );
        // An older report cannot win over the refreshed last_seen.
        assert_eq!(
            registry.record_snapshot(snapshot("p1", 1, base + Duration::from_secs(1))),
            SnapshotApplied::Stale
        );
    }

    #[test]
    fn revisions_follow_write_order() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::External, "z1", "Office", base)
            .unwrap();
        registry.record_snapshot(snapshot("z1", 10, base));
        let first = registry.get_snapshot("z1").unwrap().revision;
        let moved = registry
            .record_seek("z1", 20, base + Duration::from_secs(1))
            .unwrap();
        let stopped = registry
            .mark_disconnected("z1", base + Duration::from_secs(1))
            .unwrap();

        assert!(first > 0);
        assert!(moved.revision > first);
        assert!(stopped.revision > moved.revision);
    }

    #[test]
    fn disconnect_without_snapshot_creates_stopped_one() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::Primary, "p1", "Den", base)
            .unwrap();

        let stopped = registry.mark_disconnected("p1", base).unwrap();
        assert_eq!(stopped.state, PlaybackState::Stopped);
        assert!(stopped.track.is_none());
    }

    #[test]
    fn seek_replaces_position_only() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::Primary, "p1", "Den", base)
            .unwrap();
        assert!(registry.record_seek("p1", 5, base).is_none(), "no snapshot yet");

        registry.record_snapshot(snapshot("p1", 10, base));
        let moved = registry
            .record_seek("p1", 250, base + Duration::from_secs(1))
            .unwrap();
        assert_eq!(moved.seek_position, 200, "clamped to duration");
        assert_eq!(moved.track, Some(track()));
        assert!(registry.record_seek("p1", 30, base).is_none(), "older than last_seen");
    }

    #[test]
    fn list_order_is_independent_of_insertion_order() {
        let now = Instant::now();
        let names = [("z3", "Kitchen"), ("z1", "Office"), ("z2", "Kitchen"), ("z4", "Bath")];

        let forward = ZoneRegistry::new();
        for (id, name) in names {
            forward.upsert_zone(ZoneSource::External, id, name, now).unwrap();
        }
        let backward = ZoneRegistry::new();
        for (id, name) in names.iter().rev() {
            backward.upsert_zone(ZoneSource::External, id, name, now).unwrap();
        }

        let ids: Vec<String> = forward.list_zones().into_iter().map(|z| z.id).collect();
        assert_eq!(ids, vec!["z4", "z2", "z3", "z1"]);
        assert_eq!(forward.list_zones(), backward.list_zones());
    }

    #[test]
    fn remove_reports_existence() {
        let registry = ZoneRegistry::new();
        registry
            .upsert_zone(ZoneSource::External, "z1", "Office", Instant::now())
            .unwrap();
        assert!(registry.remove_zone("z1"));
        assert!(!registry.remove_zone("z1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_zones_respects_threshold_and_source() {
        let registry = ZoneRegistry::new();
        let base = Instant::now();
        registry
            .upsert_zone(ZoneSource::External, "old", "Old", base)
            .unwrap();
        registry
            .upsert_zone(ZoneSource::External, "fresh", "Fresh", base + Duration::from_secs(2))
            .unwrap();
        registry
            .upsert_zone(ZoneSource::Primary, "primary", "Primary", base)
            .unwrap();

        let now = base + Duration::from_secs(61);
        let stale = registry.stale_zones(ZoneSource::External, now, Duration::from_secs(60));
        assert_eq!(stale, vec![("old".to_string(), base)]);
    }
}
