//! Zonesync Core - shared library for Zonesync.
//!
//! Zonesync keeps a set of wall displays in step with what is playing in
//! each listening zone. Zones come from two places: a primary playback
//! system reached through an event stream, and external sources that push
//! snapshots over HTTP. Displays connect over WebSocket, pick one zone, and
//! advance its position locally between updates.
//!
//! # Architecture
//!
//! - [`zones`]: Zone registry, the single source of truth
//! - [`services`]: Source adapters and the display subscription broadcaster
//! - [`events`]: Event system between sources and the display transport
//! - [`api`]: HTTP routes and the display WebSocket
//! - [`client`]: Display-side connection manager and position interpolator
//! - [`bootstrap`]: Service wiring for the server binary
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Reporting zone changes
//! - [`ArtworkResolver`](artwork::ArtworkResolver): Fetching cover art
//! - [`Transport`](client::Transport): Display socket, swappable in tests
//! - [`DisplaySink`](client::DisplaySink): Rendering collaborator

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod artwork;
pub mod bootstrap;
pub mod client;
pub mod error;
pub mod events;
pub mod protocol;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;
pub mod zones;

pub use artwork::{Artwork, ArtworkResolver, HttpArtworkResolver, NoArtwork};
pub use error::{ErrorCode, SyncError, SyncResult};
pub use events::{EventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use protocol::{ClientMessage, ServerMessage};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::Config;
pub use utils::{now_millis, validate_zone_id};

pub use zones::{
    Connectivity, NowPlayingSnapshot, PlaybackState, Track, ZoneListing, ZoneRegistry, ZoneSource,
};

pub use services::{
    ExternalNowPlaying, ExternalSourceAdapter, PrimarySourceProcessor, SourceEvent,
    SubscriptionBroadcaster, UpstreamStatus,
};

pub use client::{
    ClientConfig, ClientError, ClientHandle, ConnectionState, DisplayClient, DisplaySink,
    NowPlayingView, PositionInterpolator, WsTransport,
};

pub use bootstrap::{bootstrap_services, BootstrappedServices};

pub use api::{start_server, AppState, ServerError, WsConnectionManager};
