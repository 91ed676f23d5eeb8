//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WebSocket server to.
    /// Override: `ZONESYNC_BIND_PORT`
    pub bind_port: u16,

    /// Seconds without a push before an external zone is disconnected.
    /// Override: `ZONESYNC_EXTERNAL_TIMEOUT`
    pub external_timeout_secs: u64,

    /// Seconds between liveness sweeps.
    /// Override: `ZONESYNC_SWEEP_INTERVAL`
    pub sweep_interval_secs: u64,

    /// Push cadence advertised to external sources via `/health`.
    pub push_interval_secs: u64,

    /// Per-display outbound queue length.
    pub outbound_queue_capacity: usize,

    /// Display socket idle timeout in seconds.
    pub ws_idle_timeout_secs: u64,

    /// Base URL artwork refs are resolved against.
    /// Override: `ZONESYNC_ARTWORK_BASE_URL`
    pub artwork_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = zonesync_core::Config::default();
        Self {
            bind_port: core.bind_port,
            external_timeout_secs: core.external_timeout_secs,
            sweep_interval_secs: core.sweep_interval_secs,
            push_interval_secs: core.push_interval_secs,
            outbound_queue_capacity: core.outbound_queue_capacity,
            ws_idle_timeout_secs: core.ws_idle_timeout_secs,
            artwork_base_url: core.artwork_base_url,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies overrides from `lookup`. Unparseable values are ignored.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("ZONESYNC_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(secs) = lookup("ZONESYNC_EXTERNAL_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.external_timeout_secs = secs;
        }

        if let Some(secs) = lookup("ZONESYNC_SWEEP_INTERVAL").and_then(|v| v.parse().ok()) {
            self.sweep_interval_secs = secs;
        }

        if let Some(url) = lookup("ZONESYNC_ARTWORK_BASE_URL") {
            self.artwork_base_url = (!url.is_empty()).then_some(url);
        }
    }

    /// Converts to zonesync-core's Config type.
    pub fn to_core_config(&self) -> zonesync_core::Config {
        zonesync_core::Config {
            bind_port: self.bind_port,
            external_timeout_secs: self.external_timeout_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            push_interval_secs: self.push_interval_secs,
            outbound_queue_capacity: self.outbound_queue_capacity,
            ws_idle_timeout_secs: self.ws_idle_timeout_secs,
            artwork_base_url: self.artwork_base_url.clone(),
            ..Default::default()
        }
    }
}
