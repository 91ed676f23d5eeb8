//! Zone data model and the canonical zone registry.
//!
//! A zone is a logical playback endpoint (a room, a device) whose current
//! playback state is reported either by the primary playback-control system or
//! by an external source pushing over HTTP.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub mod registry;

pub use registry::{SnapshotApplied, ZoneRegistry, ZoneUpsert};

/// Which kind of source owns a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSource {
    /// Enumerated by the primary playback-control system.
    Primary,
    /// Pushed by a third-party integration.
    External,
}

/// Whether a zone's source is currently reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Connected,
    Disconnected,
}

/// Transport state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackState {
    /// Returns true for [`PlaybackState::Playing`].
    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Track metadata as shown on a display.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// Track length in seconds; 0 when unknown.
    #[serde(default)]
    pub duration_seconds: u32,
    /// Opaque handle resolved by the artwork collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_ref: Option<String>,
}

impl Track {
    /// Returns true if `other` is the same song (title, artist and album).
    ///
    /// Position snapshots of one song differ in everything but this identity,
    /// so this is what "the track changed" means for a display.
    #[must_use]
    pub fn same_song(&self, other: &Track) -> bool {
        self.title == other.title && self.artist == other.artist && self.album == other.album
    }
}

/// Full playback state of a zone at one point in time.
///
/// Snapshots are immutable once built: the registry swaps whole snapshots and
/// never edits one in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlayingSnapshot {
    pub zone_id: String,
    pub state: PlaybackState,
    pub track: Option<Track>,
    /// Position within the track in seconds, always within `0..=duration_seconds`.
    pub seek_position: u32,
    /// When the snapshot was taken.
    #[serde(skip)]
    pub captured_at: Instant,
    /// Registry write order; 0 until the registry stores the snapshot.
    #[serde(skip)]
    pub revision: u64,
}

impl NowPlayingSnapshot {
    /// Builds a snapshot, clamping the position into the track.
    pub fn new(
        zone_id: impl Into<String>,
        state: PlaybackState,
        track: Option<Track>,
        seek_position: u32,
        captured_at: Instant,
    ) -> Self {
        let seek_position = clamp_position(track.as_ref(), seek_position);
        Self {
            zone_id: zone_id.into(),
            state,
            track,
            seek_position,
            captured_at,
            revision: 0,
        }
    }

    /// Returns a copy of this snapshot at a new position.
    #[must_use]
    pub fn with_position(&self, seek_position: u32, captured_at: Instant) -> Self {
        Self::new(
            self.zone_id.clone(),
            self.state,
            self.track.clone(),
            seek_position,
            captured_at,
        )
    }

    /// Returns a copy of this snapshot forced to `stopped`.
    ///
    /// Keeps the track and position so a display can still show what was
    /// last playing. `captured_at` is preserved: a stop forced by a timeout is
    /// not newer information from the source.
    #[must_use]
    pub fn stopped(&self) -> Self {
        Self {
            state: PlaybackState::Stopped,
            ..self.clone()
        }
    }
}

fn clamp_position(track: Option<&Track>, position: u32) -> u32 {
    match track {
        Some(track) => position.min(track.duration_seconds),
        None => 0,
    }
}

/// One entry of the zone picker sent to displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneListing {
    pub id: String,
    pub display_name: String,
    pub source: ZoneSource,
    pub connectivity: Connectivity,
}
