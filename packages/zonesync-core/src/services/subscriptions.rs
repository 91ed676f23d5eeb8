//! Per-connection subscription tracking and event fan-out.
//!
//! Each display connection owns one bounded outbound queue. Zone-list changes
//! go to every connection; now-playing and seek events go only to the
//! connections subscribed to that zone. Because each connection has a single
//! FIFO queue, events for its zone arrive in the order they were emitted.
//!
//! Emission order is not registry order: a sweep and a push can apply in one
//! order and emit in the other. Snapshots carry the registry revision, and a
//! connection is never sent a snapshot older than the last one it received.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::events::EventEmitter;
use crate::protocol::{ConnectionStatus, ServerMessage};
use crate::services::primary_source::UpstreamStatus;
use crate::zones::{NowPlayingSnapshot, ZoneRegistry};

struct Subscriber {
    tx: mpsc::Sender<ServerMessage>,
    zone_id: Option<String>,
    /// Revision of the last snapshot queued for `zone_id`.
    last_revision: u64,
}

/// Both indexes change together, so they share one lock.
#[derive(Default)]
struct SubscriptionTable {
    /// connection id -> outbound queue and current subscription
    connections: HashMap<String, Subscriber>,
    /// zone id -> subscribed connection ids
    by_zone: HashMap<String, HashSet<String>>,
}

impl SubscriptionTable {
    fn detach(&mut self, connection_id: &str, zone_id: &str) {
        if let Some(set) = self.by_zone.get_mut(zone_id) {
            set.remove(connection_id);
            if set.is_empty() {
                self.by_zone.remove(zone_id);
            }
        }
    }

    fn remove_connection(&mut self, connection_id: &str) -> bool {
        match self.connections.remove(connection_id) {
            Some(subscriber) => {
                if let Some(zone_id) = subscriber.zone_id {
                    self.detach(connection_id, &zone_id);
                }
                true
            }
            None => false,
        }
    }
}

/// Outcome of queueing one message.
enum Delivery {
    Queued,
    /// Queue full or receiver gone; the connection must be dropped.
    Dead,
}

fn deliver(connection_id: &str, tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> Delivery {
    match tx.try_send(msg) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(msg)) => {
            log::warn!(
                "[Subscriptions] Outbound queue full for {}, dropping connection (pending {})",
                connection_id,
                msg.kind()
            );
            Delivery::Dead
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("[Subscriptions] Connection {} already closed", connection_id);
            Delivery::Dead
        }
    }
}

/// Routes zone events to the display connections that care about them.
pub struct SubscriptionBroadcaster {
    registry: Arc<ZoneRegistry>,
    upstream: Arc<UpstreamStatus>,
    table: RwLock<SubscriptionTable>,
    queue_capacity: usize,
}

impl SubscriptionBroadcaster {
    /// Creates a broadcaster reading zone state from `registry`.
    ///
    /// `queue_capacity` bounds each connection's outbound queue and must be at
    /// least 2 (the two greeting messages).
    pub fn new(
        registry: Arc<ZoneRegistry>,
        upstream: Arc<UpstreamStatus>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            registry,
            upstream,
            table: RwLock::new(SubscriptionTable::default()),
            queue_capacity: queue_capacity.max(2),
        }
    }

    /// Registers a connection and queues the `connection` and `zones` greetings.
    ///
    /// Connecting does not subscribe to anything. The returned receiver is
    /// the connection's outbound queue; it closes when the connection is
    /// dropped by [`on_disconnect`](Self::on_disconnect) or for falling behind.
    pub fn on_connect(&self, connection_id: &str) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        // Greetings are queued under the write lock so that no zone-list
        // broadcast can slip in ahead of them.
        let mut table = self.table.write();
        let greeting = [
            ServerMessage::Connection {
                status: ConnectionStatus::Connected,
                upstream_connected: self.upstream.is_connected(),
            },
            ServerMessage::Zones {
                zones: self.registry.list_zones(),
            },
        ];
        for msg in greeting {
            // Fresh queue with capacity >= 2 cannot be full here.
            let _ = tx.try_send(msg);
        }
        table.remove_connection(connection_id);
        table.connections.insert(
            connection_id.to_string(),
            Subscriber {
                tx,
                zone_id: None,
                last_revision: 0,
            },
        );
        log::debug!(
            "[Subscriptions] {} connected ({} total)",
            connection_id,
            table.connections.len()
        );
        rx
    }

    /// Subscribes a connection to a zone, replacing any prior subscription.
    ///
    /// If a snapshot is cached for the zone it is queued immediately, so a new
    /// subscriber never waits for the next upstream change. Subscribing to a
    /// zone that does not exist yet is allowed; updates flow once it appears.
    ///
    /// Returns true if a cached snapshot was queued.
    pub fn subscribe(&self, connection_id: &str, zone_id: &str) -> bool {
        let mut table = self.table.write();
        let previous = match table.connections.get_mut(connection_id) {
            Some(subscriber) => {
                subscriber.last_revision = 0;
                subscriber.zone_id.replace(zone_id.to_string())
            }
            None => {
                log::warn!(
                    "[Subscriptions] Subscribe from unknown connection {}",
                    connection_id
                );
                return false;
            }
        };
        if let Some(previous) = previous {
            table.detach(connection_id, &previous);
        }
        table
            .by_zone
            .entry(zone_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        log::info!("[Subscriptions] {} subscribed to {}", connection_id, zone_id);

        let Some(snapshot) = self.registry.get_snapshot(zone_id) else {
            return false;
        };
        let Some(subscriber) = table.connections.get_mut(connection_id) else {
            return false;
        };
        subscriber.last_revision = snapshot.revision;
        match deliver(connection_id, &subscriber.tx, ServerMessage::now_playing(&snapshot)) {
            Delivery::Queued => true,
            Delivery::Dead => {
                table.remove_connection(connection_id);
                false
            }
        }
    }

    /// Clears a connection's subscription, keeping the connection.
    pub fn unsubscribe(&self, connection_id: &str) {
        let mut table = self.table.write();
        let previous = table
            .connections
            .get_mut(connection_id)
            .and_then(|subscriber| subscriber.zone_id.take());
        if let Some(zone_id) = previous {
            table.detach(connection_id, &zone_id);
            log::info!(
                "[Subscriptions] {} unsubscribed from {}",
                connection_id,
                zone_id
            );
        }
    }

    /// Forgets a connection entirely.
    pub fn on_disconnect(&self, connection_id: &str) {
        if self.table.write().remove_connection(connection_id) {
            log::debug!("[Subscriptions] {} disconnected", connection_id);
        }
    }

    /// Sends the current zone list to every connection.
    ///
    /// The list is read under the table lock, so the last list queued is
    /// never older than one queued before it.
    pub fn on_zone_list_changed(&self) {
        let mut table = self.table.write();
        let zones = self.registry.list_zones();
        let dead: Vec<String> = table
            .connections
            .iter()
            .filter_map(|(id, subscriber)| {
                let msg = ServerMessage::Zones {
                    zones: zones.clone(),
                };
                match deliver(id, &subscriber.tx, msg) {
                    Delivery::Queued => None,
                    Delivery::Dead => Some(id.clone()),
                }
            })
            .collect();
        for id in &dead {
            table.remove_connection(id);
        }
    }

    /// Sends a zone's new snapshot to its subscribers only.
    ///
    /// A subscriber that already received a newer revision of the zone skips
    /// this one.
    pub fn on_now_playing_changed(&self, snapshot: &NowPlayingSnapshot) {
        let mut table = self.table.write();
        let Some(subscribers) = table.by_zone.get(&snapshot.zone_id) else {
            return;
        };
        let ids: Vec<String> = subscribers.iter().cloned().collect();

        let mut dead = Vec::new();
        for id in ids {
            let Some(subscriber) = table.connections.get_mut(&id) else {
                continue;
            };
            if snapshot.revision < subscriber.last_revision {
                log::debug!(
                    "[Subscriptions] Skipping superseded snapshot r{} of {} for {} (has r{})",
                    snapshot.revision,
                    snapshot.zone_id,
                    id,
                    subscriber.last_revision
                );
                continue;
            }
            subscriber.last_revision = snapshot.revision;
            let msg = ServerMessage::now_playing(snapshot);
            if let Delivery::Dead = deliver(&id, &subscriber.tx, msg) {
                dead.push(id);
            }
        }
        for id in &dead {
            table.remove_connection(id);
        }
    }

    /// Sends a position-only correction to a zone's subscribers.
    pub fn on_seek(&self, zone_id: &str, seek_position: u32) {
        self.send_to_zone(zone_id, || ServerMessage::Seek {
            zone_id: zone_id.to_string(),
            seek_position,
        });
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.table.read().connections.len()
    }

    /// Returns the zone a connection is subscribed to.
    pub fn subscription_of(&self, connection_id: &str) -> Option<String> {
        self.table
            .read()
            .connections
            .get(connection_id)
            .and_then(|s| s.zone_id.clone())
    }

    /// Returns the number of connections subscribed to a zone.
    #[must_use]
    pub fn subscriber_count(&self, zone_id: &str) -> usize {
        self.table
            .read()
            .by_zone
            .get(zone_id)
            .map_or(0, HashSet::len)
    }

    fn send_to_zone(&self, zone_id: &str, build: impl Fn() -> ServerMessage) {
        let dead: Vec<String> = {
            let table = self.table.read();
            let Some(subscribers) = table.by_zone.get(zone_id) else {
                return;
            };
            subscribers
                .iter()
                .filter_map(|id| {
                    let subscriber = table.connections.get(id)?;
                    match deliver(id, &subscriber.tx, build()) {
                        Delivery::Queued => None,
                        Delivery::Dead => Some(id.clone()),
                    }
                })
                .collect()
        };
        self.drop_connections(&dead);
    }

    fn drop_connections(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let mut table = self.table.write();
        for id in ids {
            table.remove_connection(id);
        }
    }
}

impl EventEmitter for SubscriptionBroadcaster {
    fn emit_zones_changed(&self) {
        self.on_zone_list_changed();
    }

    fn emit_now_playing(&self, snapshot: Arc<NowPlayingSnapshot>) {
        self.on_now_playing_changed(&snapshot);
    }

    fn emit_seek(&self, zone_id: &str, seek_position: u32) {
        self.on_seek(zone_id, seek_position);
    }
}
