//! Zonesync Display - headless reference display.
//!
//! Connects to a Zonesync server, follows one zone and logs what a real
//! renderer would draw. Useful for exercising a deployment without hardware.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use zonesync_core::{
    ClientConfig, ConnectionState, DisplayClient, DisplaySink, NowPlayingView, WsTransport,
    ZoneListing,
};

/// Zonesync Display - Follows one zone and logs its playback.
#[derive(Parser, Debug)]
#[command(name = "zonesync-display")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Display WebSocket URL.
    #[arg(short, long, default_value = "ws://127.0.0.1:8088/ws", env = "ZONESYNC_SERVER_URL")]
    url: String,

    /// Zone to follow. Without it only the zone list is shown.
    #[arg(short, long, env = "ZONESYNC_ZONE")]
    zone: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ZONESYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

/// Logs renderer calls; positions only once per displayed second.
#[derive(Default)]
struct LogSink {
    last_second: AtomicI64,
}

impl DisplaySink for LogSink {
    fn on_connection_state(&self, state: ConnectionState) {
        log::info!("[Display] Connection: {:?}", state);
    }

    fn on_upstream(&self, connected: bool) {
        log::info!(
            "[Display] Playback system {}",
            if connected { "reachable" } else { "unreachable" }
        );
    }

    fn on_zones(&self, zones: &[ZoneListing]) {
        log::info!("[Display] {} zone(s)", zones.len());
        for zone in zones {
            log::info!(
                "[Display]   {} ({}) {:?} {:?}",
                zone.display_name,
                zone.id,
                zone.source,
                zone.connectivity
            );
        }
    }

    fn on_now_playing(&self, view: &NowPlayingView) {
        match &view.track {
            Some(track) => log::info!(
                "[Display] {:?}: {} - {}{}",
                view.state,
                track.artist,
                track.title,
                if view.song_changed { " (new)" } else { "" }
            ),
            None => log::info!("[Display] {:?}: nothing playing", view.state),
        }
        self.last_second.store(-1, Ordering::Relaxed);
    }

    fn on_position(&self, position: f64, progress: f64) {
        let second = position.floor() as i64;
        if self.last_second.swap(second, Ordering::Relaxed) != second {
            log::info!(
                "[Display] {}:{:02} ({:.0}%)",
                second / 60,
                second % 60,
                progress * 100.0
            );
        }
    }

    fn on_error(&self, message: &str) {
        log::warn!("[Display] Server says: {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Zonesync Display v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Connecting to {}", args.url);

    let client = DisplayClient::spawn(
        Arc::new(WsTransport::new(args.url)),
        Arc::new(LogSink::default()),
        ClientConfig::default(),
    );

    if let Some(zone) = args.zone {
        client
            .subscribe(zone)
            .await
            .context("Client stopped before subscribing")?;
    }

    signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;

    log::info!("Shutting down...");
    client.teardown().await;
    Ok(())
}
