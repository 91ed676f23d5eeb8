//! Display WebSocket wire messages.
//!
//! Both directions are JSON objects tagged by `type`. The server and the
//! display client share these definitions so the two ends cannot drift.

use serde::{Deserialize, Serialize};

use crate::zones::{NowPlayingSnapshot, PlaybackState, Track, ZoneListing};

/// Connection status reported in the `connection` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
}

/// Messages sent from the server to a display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when a display connects.
    Connection {
        status: ConnectionStatus,
        /// Whether the primary playback-control system is reachable.
        upstream_connected: bool,
    },
    /// Full replacement of the zone picker.
    Zones { zones: Vec<ZoneListing> },
    /// Full playback state of the subscribed zone.
    NowPlaying {
        zone_id: String,
        state: PlaybackState,
        track: Option<Track>,
        seek_position: u32,
    },
    /// Position-only correction for the subscribed zone.
    Seek { zone_id: String, seek_position: u32 },
    Error { message: String },
}

impl ServerMessage {
    /// Builds a `now_playing` message from a registry snapshot.
    pub fn now_playing(snapshot: &NowPlayingSnapshot) -> Self {
        ServerMessage::NowPlaying {
            zone_id: snapshot.zone_id.clone(),
            state: snapshot.state,
            track: snapshot.track.clone(),
            seek_position: snapshot.seek_position,
        }
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connection { .. } => "connection",
            ServerMessage::Zones { .. } => "zones",
            ServerMessage::NowPlaying { .. } => "now_playing",
            ServerMessage::Seek { .. } => "seek",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// Messages sent from a display to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { zone_id: String },
    Unsubscribe,
}
