//! Event system for real-time display communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for sources to report zone changes
//! - [`EventBridge`] for fanning those changes out to the display transport

mod bridge;
mod emitter;

pub use bridge::EventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::testing;
