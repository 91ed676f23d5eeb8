//! Display connection manager.
//!
//! One task owns all client state and multiplexes everything in a single
//! `select!` loop:
//!
//! - commands from the [`ClientHandle`]
//! - the in-flight connect attempt
//! - the pending reconnect timer (at most one; replaced, never stacked)
//! - inbound frames from the open connection
//! - the interpolation tick, present only while the zone is playing
//!
//! The zone the display wants lives here, not on the server, so every
//! successful (re)connect re-issues the subscription.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use super::backoff::ReconnectBackoff;
use super::interpolator::PositionInterpolator;
use super::transport::{Transport, TransportConnection};
use super::{ClientConfig, ClientError, DisplaySink, NowPlayingView};
use crate::protocol::{ClientMessage, ServerMessage};

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal; reached only through [`ClientHandle::teardown`].
    TornDown,
}

#[derive(Debug)]
enum Command {
    Subscribe(String),
    Unsubscribe,
    Teardown,
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn TransportConnection>, ClientError>> + Send>>;

/// Spawns display clients.
pub struct DisplayClient;

impl DisplayClient {
    /// Starts the client task and begins connecting immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DisplaySink>,
        config: ClientConfig,
    ) -> ClientHandle {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = ClientTask {
            transport,
            sink,
            backoff: ReconnectBackoff::new(config.reconnect_base_delay, config.reconnect_max_delay),
            config,
            state_tx,
            subscription: None,
            interpolator: PositionInterpolator::new(Instant::now()),
            connection: None,
            connecting: None,
            reconnect: None,
            tick: None,
        };

        ClientHandle {
            commands: commands_tx,
            state_rx,
            task: tokio::spawn(task.run(commands_rx)),
        }
    }
}

/// Control surface of a running client.
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Watches a zone, replacing any previous choice. Survives reconnects.
    pub async fn subscribe(&self, zone_id: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::Subscribe(zone_id.into())).await
    }

    /// Stops watching any zone.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        self.command(Command::Unsubscribe).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver for connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Cancels any pending reconnect, closes the connection and waits for
    /// the client task to finish. Nothing is scheduled afterwards.
    pub async fn teardown(self) {
        let _ = self.commands.send(Command::Teardown).await;
        if let Err(e) = self.task.await {
            log::error!("[Client] Task ended abnormally: {}", e);
        }
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::TornDown)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Optional select! branches
// ─────────────────────────────────────────────────────────────────────────────

async fn poll_connect(
    connecting: &mut Option<ConnectFuture>,
) -> Result<Box<dyn TransportConnection>, ClientError> {
    match connecting {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn wait_reconnect(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn recv_inbound(
    connection: &mut Option<Box<dyn TransportConnection>>,
) -> Option<Result<String, ClientError>> {
    match connection {
        Some(conn) => conn.recv().await,
        None => pending().await,
    }
}

async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client task
// ─────────────────────────────────────────────────────────────────────────────

struct ClientTask {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn DisplaySink>,
    config: ClientConfig,
    state_tx: watch::Sender<ConnectionState>,
    backoff: ReconnectBackoff,
    /// Zone the display wants, independent of connection state.
    subscription: Option<String>,
    interpolator: PositionInterpolator,
    connection: Option<Box<dyn TransportConnection>>,
    connecting: Option<ConnectFuture>,
    reconnect: Option<Pin<Box<Sleep>>>,
    tick: Option<Interval>,
}

impl ClientTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.start_connect();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Subscribe(zone_id)) => self.subscribe(zone_id).await,
                    Some(Command::Unsubscribe) => self.unsubscribe().await,
                    Some(Command::Teardown) | None => {
                        self.teardown().await;
                        break;
                    }
                },
                result = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                () = wait_reconnect(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.start_connect();
                }
                inbound = recv_inbound(&mut self.connection) => self.on_inbound(inbound),
                () = next_tick(&mut self.tick) => self.emit_position(),
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("[Client] {:?} -> {:?}", previous, state);
            self.sink.on_connection_state(state);
        }
    }

    fn start_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let transport = Arc::clone(&self.transport);
        self.connecting = Some(Box::pin(async move { transport.connect().await }));
    }

    /// Arms the single reconnect timer, dropping any previous one.
    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        log::info!(
            "[Client] Reconnecting in {:?} (attempt {})",
            delay,
            self.backoff.failures()
        );
        self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
    }

    async fn on_connect_result(
        &mut self,
        result: Result<Box<dyn TransportConnection>, ClientError>,
    ) {
        match result {
            Ok(connection) => {
                log::info!("[Client] Connected");
                self.connection = Some(connection);
                self.backoff.reset();
                self.reconnect = None;
                self.set_state(ConnectionState::Connected);
                if let Some(zone_id) = self.subscription.clone() {
                    self.send(ClientMessage::Subscribe { zone_id }).await;
                }
            }
            Err(e) => {
                log::warn!("[Client] Connect failed: {}", e);
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        log::warn!("[Client] Connection lost: {}", reason);
        self.connection = None;
        // Stale until the resubscribe replays a snapshot.
        self.interpolator.freeze(Instant::now());
        self.tick = None;
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    /// Sends if connected; a failed send counts as a lost connection.
    async fn send(&mut self, msg: ClientMessage) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                log::error!("[Client] Failed to serialize {:?}: {}", msg, e);
                return;
            }
        };
        if let Err(e) = connection.send(text).await {
            self.connection_lost(&e.to_string());
        }
    }

    async fn subscribe(&mut self, zone_id: String) {
        if self.subscription.as_deref() != Some(zone_id.as_str()) {
            self.reset_zone_model();
        }
        log::info!("[Client] Subscribing to {}", zone_id);
        self.subscription = Some(zone_id.clone());
        self.send(ClientMessage::Subscribe { zone_id }).await;
    }

    async fn unsubscribe(&mut self) {
        if self.subscription.take().is_some() {
            self.reset_zone_model();
            self.send(ClientMessage::Unsubscribe).await;
        }
    }

    fn reset_zone_model(&mut self) {
        self.interpolator = PositionInterpolator::new(Instant::now());
        self.tick = None;
    }

    async fn teardown(&mut self) {
        self.reconnect = None;
        self.connecting = None;
        self.tick = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        self.set_state(ConnectionState::TornDown);
        log::info!("[Client] Torn down");
    }

    fn on_inbound(&mut self, inbound: Option<Result<String, ClientError>>) {
        match inbound {
            None => self.connection_lost("closed by server"),
            Some(Err(e)) => self.connection_lost(&e.to_string()),
            Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => self.dispatch(msg),
                Err(e) => log::warn!("[Client] Dropping unrecognized message: {}", e),
            },
        }
    }

    fn is_subscribed_to(&self, zone_id: &str) -> bool {
        self.subscription.as_deref() == Some(zone_id)
    }

    fn dispatch(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connection {
                upstream_connected, ..
            } => self.sink.on_upstream(upstream_connected),
            ServerMessage::Zones { zones } => self.sink.on_zones(&zones),
            ServerMessage::NowPlaying {
                zone_id,
                state,
                track,
                seek_position,
            } => {
                if !self.is_subscribed_to(&zone_id) {
                    log::debug!("[Client] Ignoring now_playing for {}", zone_id);
                    return;
                }
                let song_changed = self.interpolator.apply_snapshot(
                    state,
                    track.clone(),
                    seek_position,
                    Instant::now(),
                );
                self.sink.on_now_playing(&NowPlayingView {
                    zone_id,
                    state,
                    track,
                    song_changed,
                });
                self.update_tick();
                self.emit_position();
            }
            ServerMessage::Seek {
                zone_id,
                seek_position,
            } => {
                if !self.is_subscribed_to(&zone_id) {
                    return;
                }
                self.interpolator.apply_seek(seek_position, Instant::now());
                self.emit_position();
            }
            ServerMessage::Error { message } => {
                log::warn!("[Client] Server error: {}", message);
                self.sink.on_error(&message);
            }
        }
    }

    /// Runs the tick only while playing.
    fn update_tick(&mut self) {
        if !self.interpolator.is_playing() {
            self.tick = None;
            return;
        }
        if self.tick.is_none() {
            let period = self.config.tick_interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.tick = Some(interval);
        }
    }

    fn emit_position(&self) {
        let now = Instant::now();
        self.sink.on_position(
            self.interpolator.position_at(now),
            self.interpolator.progress_at(now),
        );
    }
}
