//! Bridge that forwards domain events to the display transport.
//!
//! The [`EventBridge`] lives at the boundary between sources and transport:
//! every event goes to the subscription broadcaster and, when one is set, to
//! an additional external emitter (debug logging, an embedding application).

use std::sync::Arc;

use parking_lot::RwLock;

use super::emitter::EventEmitter;
use crate::zones::NowPlayingSnapshot;

/// Forwards events to the display transport and an optional external emitter.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks.
/// The external emitter uses `RwLock` to allow setting it after construction.
#[derive(Clone)]
pub struct EventBridge {
    transport: Arc<dyn EventEmitter>,
    /// Optional external emitter for out-of-band observers
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl EventBridge {
    /// Creates a bridge delivering to `transport`.
    pub fn new(transport: Arc<dyn EventEmitter>) -> Self {
        Self {
            transport,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives a copy of every event.
    ///
    /// Can be called after construction, so an embedding application can
    /// attach once its own handles exist.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }
}

impl EventEmitter for EventBridge {
    fn emit_zones_changed(&self) {
        if let Some(ref emitter) = *self.external_emitter.read() {
            emitter.emit_zones_changed();
        }
        self.transport.emit_zones_changed();
    }

    fn emit_now_playing(&self, snapshot: Arc<NowPlayingSnapshot>) {
        if let Some(ref emitter) = *self.external_emitter.read() {
            emitter.emit_now_playing(Arc::clone(&snapshot));
        }
        self.transport.emit_now_playing(snapshot);
    }

    fn emit_seek(&self, zone_id: &str, seek_position: u32) {
        if let Some(ref emitter) = *self.external_emitter.read() {
            emitter.emit_seek(zone_id, seek_position);
        }
        self.transport.emit_seek(zone_id, seek_position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::testing::{Emitted, RecordingEmitter};
    use crate::events::emitter::NoopEventEmitter;

    #[test]
    fn forwards_to_transport_and_external() {
        let transport = Arc::new(RecordingEmitter::default());
        let external = Arc::new(RecordingEmitter::default());
        let bridge = EventBridge::new(transport.clone());

        bridge.emit_seek("z1", 3);
        bridge.set_external_emitter(external.clone());
        bridge.emit_zones_changed();

        assert_eq!(
            transport.take(),
            vec![Emitted::Seek("z1".into(), 3), Emitted::ZonesChanged]
        );
        assert_eq!(external.take(), vec![Emitted::ZonesChanged]);
    }

    #[test]
    fn replacing_external_emitter_keeps_transport_delivery() {
        let transport = Arc::new(RecordingEmitter::default());
        let bridge = EventBridge::new(transport.clone());

        bridge.set_external_emitter(Arc::new(NoopEventEmitter));
        bridge.emit_seek("z1", 1);

        let external = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(external.clone());
        bridge.emit_seek("z1", 2);

        assert_eq!(transport.take().len(), 2);
        assert_eq!(external.take(), vec![Emitted::Seek("z1".into(), 2)]);
    }
}
