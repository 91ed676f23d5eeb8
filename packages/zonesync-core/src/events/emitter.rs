//! Event emitter abstraction for decoupling sources from transport.
//!
//! Sources and the liveness sweep depend on the [`EventEmitter`] trait rather
//! than on the subscription broadcaster, enabling testing and alternative
//! transports.

use std::sync::Arc;

use crate::zones::NowPlayingSnapshot;

/// Typed callbacks for everything a zone change can mean to a display.
///
/// Implementations must not block: they are called from HTTP handlers, the
/// sweep task, and the primary-source forwarder.
///
/// # Example
///
/// ```ignore
/// struct MySource {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MySource {
///     fn on_track(&self, snapshot: Arc<NowPlayingSnapshot>) {
///         self.emitter.emit_now_playing(snapshot);
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// The set of zones, their names, or their connectivity changed.
    fn emit_zones_changed(&self);

    /// A zone has a new snapshot.
    fn emit_now_playing(&self, snapshot: Arc<NowPlayingSnapshot>);

    /// A zone's position moved without any other change.
    fn emit_seek(&self, zone_id: &str, seek_position: u32);
}

/// No-op emitter for testing or embedding without displays.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_zones_changed(&self) {}

    fn emit_now_playing(&self, _snapshot: Arc<NowPlayingSnapshot>) {}

    fn emit_seek(&self, _zone_id: &str, _seek_position: u32) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_zones_changed(&self) {
        tracing::debug!("zones_changed");
    }

    fn emit_now_playing(&self, snapshot: Arc<NowPlayingSnapshot>) {
        tracing::debug!(
            zone_id = %snapshot.zone_id,
            state = ?snapshot.state,
            seek_position = snapshot.seek_position,
            "now_playing"
        );
    }

    fn emit_seek(&self, zone_id: &str, seek_position: u32) {
        tracing::debug!(zone_id, seek_position, "seek");
    }
}
