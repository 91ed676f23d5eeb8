//! Display socket tracking.
//!
//! - `WsConnectionManager`: tracks every open display socket
//! - `ConnectionGuard`: RAII guard that unregisters a socket and drops its
//!   subscription when the handler exits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::services::SubscriptionBroadcaster;

struct ConnectionInfo {
    opened_at: Instant,
}

/// Tracks open display sockets and can force-close them all.
///
/// Each socket gets a child of one global cancellation token, so
/// [`close_all`](Self::close_all) reaches every handler at once.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionInfo>,
    next_id: AtomicU64,
    /// Replaced after `close_all()` so new sockets are still accepted.
    global_cancel: RwLock<CancellationToken>,
    broadcaster: Arc<SubscriptionBroadcaster>,
}

impl WsConnectionManager {
    pub fn new(broadcaster: Arc<SubscriptionBroadcaster>) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
            broadcaster,
        }
    }

    /// Registers a new socket and returns its guard.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = format!("ws-{}", id);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(
            conn_id.clone(),
            ConnectionInfo {
                opened_at: Instant::now(),
            },
        );
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        self.broadcaster.on_disconnect(id);
        if let Some((_, info)) = self.connections.remove(id) {
            log::info!(
                "[WS] Connection unregistered: {} after {:?} (remaining: {})",
                id,
                info.opened_at.elapsed(),
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes all sockets. Returns how many were signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
        }
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

/// Unregisters a socket when dropped, even if the handler panics.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    /// Cancelled on force-close.
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UpstreamStatus;
    use crate::zones::ZoneRegistry;

    fn manager() -> (Arc<SubscriptionBroadcaster>, Arc<WsConnectionManager>) {
        let broadcaster = Arc::new(SubscriptionBroadcaster::new(
            Arc::new(ZoneRegistry::new()),
            Arc::new(UpstreamStatus::default()),
            8,
        ));
        let manager = Arc::new(WsConnectionManager::new(Arc::clone(&broadcaster)));
        (broadcaster, manager)
    }

    #[test]
    fn guard_drop_unregisters_and_unsubscribes() {
        let (broadcaster, manager) = manager();
        let guard = manager.register();
        let _rx = broadcaster.on_connect(guard.id());
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(broadcaster.connection_count(), 1);

        drop(guard);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let (_broadcaster, manager) = manager();
        let a = manager.register();
        let b = manager.register();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn close_all_cancels_existing_but_not_new_connections() {
        let (_broadcaster, manager) = manager();
        let old = manager.register();

        assert_eq!(manager.close_all(), 1);
        assert!(old.cancel_token().is_cancelled());

        let fresh = manager.register();
        assert!(!fresh.cancel_token().is_cancelled());
    }
}
