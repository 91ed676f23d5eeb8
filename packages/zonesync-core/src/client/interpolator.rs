//! Continuous playback position from discrete snapshots.
//!
//! The server only reports positions when something changes (plus periodic
//! pushes from external sources). Between reports the display advances the
//! position locally from the last sync point:
//!
//! ```text
//! position(T) = min(sync_position + (T - sync_at), duration)   while playing
//! position(T) = sync_position                                  otherwise
//! ```

use tokio::time::Instant;

use crate::zones::{PlaybackState, Track};

/// Local model of the subscribed zone's position.
#[derive(Debug, Clone)]
pub struct PositionInterpolator {
    state: PlaybackState,
    track: Option<Track>,
    sync_position: f64,
    sync_at: Instant,
}

impl PositionInterpolator {
    pub fn new(now: Instant) -> Self {
        Self {
            state: PlaybackState::Stopped,
            track: None,
            sync_position: 0.0,
            sync_at: now,
        }
    }

    fn duration(&self) -> f64 {
        self.track
            .as_ref()
            .map_or(0.0, |t| f64::from(t.duration_seconds))
    }

    fn clamp(&self, position: f64) -> f64 {
        position.clamp(0.0, self.duration())
    }

    /// Resets the model from a full snapshot.
    ///
    /// Returns true if the song changed, in which case any previous position
    /// is meaningless and the display should redraw from scratch.
    pub fn apply_snapshot(
        &mut self,
        state: PlaybackState,
        track: Option<Track>,
        seek_position: u32,
        at: Instant,
    ) -> bool {
        let song_changed = match (&self.track, &track) {
            (Some(old), Some(new)) => !old.same_song(new),
            (None, None) => false,
            _ => true,
        };
        self.state = state;
        self.track = track;
        self.sync_position = self.clamp(f64::from(seek_position));
        self.sync_at = at;
        song_changed
    }

    /// Moves the sync point without changing state or track.
    pub fn apply_seek(&mut self, seek_position: u32, at: Instant) {
        self.sync_position = self.clamp(f64::from(seek_position));
        self.sync_at = at;
    }

    /// Forces the model to stopped, keeping the track on screen.
    pub fn freeze(&mut self, now: Instant) {
        self.sync_position = self.position_at(now);
        self.sync_at = now;
        self.state = PlaybackState::Stopped;
    }

    /// Displayed position in seconds at `now`.
    ///
    /// A `now` earlier than the last sync point counts as zero elapsed time,
    /// so clock trouble can never move the position backwards.
    pub fn position_at(&self, now: Instant) -> f64 {
        if !self.state.is_playing() {
            return self.sync_position;
        }
        let elapsed = now.saturating_duration_since(self.sync_at).as_secs_f64();
        self.clamp(self.sync_position + elapsed)
    }

    /// Fraction of the track played at `now`, in `0.0..=1.0`. Zero when the
    /// duration is unknown.
    pub fn progress_at(&self, now: Instant) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (self.position_at(now) / duration).clamp(0.0, 1.0)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }
}
