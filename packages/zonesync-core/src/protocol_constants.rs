//! Fixed protocol constants shared by the server and the display client.
//!
//! Tunable values live in [`Config`](crate::state::Config); the constants here
//! are the defaults and the values that both ends of the wire must agree on.

// ─────────────────────────────────────────────────────────────────────────────
// External Source Liveness
// ─────────────────────────────────────────────────────────────────────────────

/// An external zone with no push for longer than this is marked disconnected.
pub const EXTERNAL_SOURCE_TIMEOUT_SECS: u64 = 60;

/// Interval between liveness sweeps over all external zones.
pub const EXTERNAL_SOURCE_SWEEP_INTERVAL_SECS: u64 = 30;

/// Push cadence advertised to external sources while a zone is playing.
///
/// Only the timeout above is enforced; this is what `/health` tells
/// integrators to aim for so a healthy source never comes near it.
pub const EXTERNAL_SOURCE_PUSH_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Display WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of each connection's outbound message queue.
///
/// A connection that falls this far behind is dropped and left to reconnect.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Idle timeout for a display socket with no inbound traffic (seconds).
///
/// Displays are mostly silent, so this only catches half-open sockets; the
/// server pings every [`WS_PING_INTERVAL_SECS`] and any pong counts as traffic.
pub const WS_IDLE_TIMEOUT_SECS: u64 = 90;

/// Interval between server pings on an idle display socket (seconds).
pub const WS_PING_INTERVAL_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Display Client
// ─────────────────────────────────────────────────────────────────────────────

/// First reconnect delay after a failure (milliseconds).
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on the reconnect delay (milliseconds).
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Interval at which the displayed position is recomputed while playing.
pub const INTERPOLATION_TICK_MS: u64 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier returned by `/health`.
pub const SERVICE_ID: &str = "zonesync";

/// Default HTTP/WS port for the server.
pub const DEFAULT_PORT: u16 = 8088;
