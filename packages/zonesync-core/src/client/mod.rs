//! Display client.
//!
//! Keeps one logical connection to the server per display across drops,
//! remembers which zone the display wants, and advances the displayed
//! position locally between server updates.
//!
//! - [`DisplayClient`] spawns the single client task and returns a [`ClientHandle`]
//! - [`DisplaySink`] is what the rendering layer implements
//! - [`Transport`] abstracts the socket so the client can be driven in tests

use std::time::Duration;

use thiserror::Error;

use crate::protocol_constants::{
    INTERPOLATION_TICK_MS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS,
};
use crate::zones::{PlaybackState, Track, ZoneListing};

pub mod backoff;
pub mod connection;
pub mod interpolator;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use connection::{ClientHandle, ConnectionState, DisplayClient};
pub use interpolator::PositionInterpolator;
pub use transport::{Transport, TransportConnection, WsTransport};

/// Client-side errors. None of these end the client; they only drive the
/// connection state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting, sending or receiving failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The client task has been torn down.
    #[error("Client is torn down")]
    TornDown,
}

/// Display client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// First reconnect delay.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// How often the displayed position is recomputed while playing.
    pub tick_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            tick_interval: Duration::from_millis(INTERPOLATION_TICK_MS),
        }
    }
}

/// What the subscribed zone is playing, as handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub zone_id: String,
    pub state: PlaybackState,
    pub track: Option<Track>,
    /// True if the song differs from the previous view.
    pub song_changed: bool,
}

/// Rendering collaborator.
///
/// Called from the client task; implementations must return quickly. Every
/// method has an empty default so a sink only implements what it draws.
pub trait DisplaySink: Send + Sync {
    fn on_connection_state(&self, _state: ConnectionState) {}

    /// The primary playback system became reachable or unreachable.
    fn on_upstream(&self, _connected: bool) {}

    fn on_zones(&self, _zones: &[ZoneListing]) {}

    fn on_now_playing(&self, _view: &NowPlayingView) {}

    /// Position in seconds and progress in `0.0..=1.0`.
    fn on_position(&self, _position: f64, _progress: f64) {}

    fn on_error(&self, _message: &str) {}
}
