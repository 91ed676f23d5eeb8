//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_PORT, EXTERNAL_SOURCE_PUSH_INTERVAL_SECS, EXTERNAL_SOURCE_SWEEP_INTERVAL_SECS,
    EXTERNAL_SOURCE_TIMEOUT_SECS, OUTBOUND_QUEUE_CAPACITY, WS_IDLE_TIMEOUT_SECS,
    WS_PING_INTERVAL_SECS,
};

/// Configuration for the zonesync server.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server (0 = auto-allocate).
    pub bind_port: u16,

    // External sources
    /// Seconds without a push before an external zone is disconnected.
    pub external_timeout_secs: u64,

    /// Seconds between liveness sweeps.
    pub sweep_interval_secs: u64,

    /// Push cadence advertised to external sources (seconds).
    pub push_interval_secs: u64,

    // WebSocket
    /// Capacity of each display connection's outbound queue.
    pub outbound_queue_capacity: usize,

    /// Idle timeout for a display socket (seconds).
    pub ws_idle_timeout_secs: u64,

    /// Interval between server pings (seconds).
    pub ws_ping_interval_secs: u64,

    // Artwork
    /// Base URL artwork refs are resolved against. `None` disables `/artwork`.
    pub artwork_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: DEFAULT_PORT,
            external_timeout_secs: EXTERNAL_SOURCE_TIMEOUT_SECS,
            sweep_interval_secs: EXTERNAL_SOURCE_SWEEP_INTERVAL_SECS,
            push_interval_secs: EXTERNAL_SOURCE_PUSH_INTERVAL_SECS,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            ws_idle_timeout_secs: WS_IDLE_TIMEOUT_SECS,
            ws_ping_interval_secs: WS_PING_INTERVAL_SECS,
            artwork_base_url: None,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.external_timeout_secs == 0 {
            return Err("external_timeout_secs must be >= 1".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be >= 1 (interval panics on 0)".to_string());
        }
        if self.sweep_interval_secs > self.external_timeout_secs {
            return Err(format!(
                "sweep_interval_secs ({}) must not exceed external_timeout_secs ({})",
                self.sweep_interval_secs, self.external_timeout_secs
            ));
        }
        if self.push_interval_secs == 0 || self.push_interval_secs >= self.external_timeout_secs {
            return Err("push_interval_secs must be between 1 and external_timeout_secs".to_string());
        }
        if self.outbound_queue_capacity < 2 {
            return Err("outbound_queue_capacity must be >= 2".to_string());
        }
        if self.ws_ping_interval_secs == 0 {
            return Err("ws_ping_interval_secs must be >= 1".to_string());
        }
        if self.ws_idle_timeout_secs <= self.ws_ping_interval_secs {
            return Err("ws_idle_timeout_secs must exceed ws_ping_interval_secs".to_string());
        }
        if let Some(url) = &self.artwork_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("artwork_base_url must be http(s): {}", url));
            }
        }
        Ok(())
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn ws_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_idle_timeout_secs)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }
}
