//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Zone Id Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Longest zone id accepted from an external source.
const MAX_ZONE_ID_LEN: usize = 128;

/// Checks that a source-assigned zone id is usable as a map key and URL segment.
///
/// Ids are opaque, but an empty id or one with control characters would make
/// the zone impossible to address from a display or a later `DELETE`.
pub fn validate_zone_id(zone_id: &str) -> Result<(), String> {
    if zone_id.trim().is_empty() {
        return Err("zone id must not be empty".to_string());
    }
    if zone_id.len() > MAX_ZONE_ID_LEN {
        return Err(format!(
            "zone id must be at most {} bytes",
            MAX_ZONE_ID_LEN
        ));
    }
    if zone_id.chars().any(char::is_control) {
        return Err("zone id must not contain control characters".to_string());
    }
    Ok(())
}
