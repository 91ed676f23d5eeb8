//! Display WebSocket handler.
//!
//! Each socket gets one outbound queue from the subscription broadcaster.
//! The handler loop forwards that queue to the socket, applies inbound
//! subscribe/unsubscribe requests, and pings idle sockets.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::AppState;
use crate::error::SyncError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::utils::validate_zone_id;

/// Parses one inbound text frame.
fn parse_client_message(text: &str) -> Result<ClientMessage, SyncError> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| SyncError::Protocol(format!("unrecognized message: {}", e)))?;
    if let ClientMessage::Subscribe { zone_id } = &msg {
        validate_zone_id(zone_id).map_err(SyncError::Protocol)?;
    }
    Ok(msg)
}

fn to_message(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            log::error!("[WS] Failed to serialize {}: {}", msg.kind(), e);
            None
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // The guard drops the subscription when this function returns.
    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();
    let conn_id = conn_guard.id().to_string();

    let mut outbound = state.broadcaster.on_connect(&conn_id);

    let (idle_timeout, ping_every) = {
        let config = state.config.read();
        (config.ws_idle_timeout(), config.ws_ping_interval())
    };
    let mut last_activity = Instant::now();
    let mut ping_interval = tokio::time::interval(ping_every);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_id);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => match parse_client_message(&text) {
                        Ok(ClientMessage::Subscribe { zone_id }) => {
                            state.broadcaster.subscribe(&conn_id, &zone_id);
                        }
                        Ok(ClientMessage::Unsubscribe) => {
                            state.broadcaster.unsubscribe(&conn_id);
                        }
                        Err(e) => {
                            log::warn!("[WS] {}: {}", conn_id, e);
                            let reply = ServerMessage::Error { message: e.to_string() };
                            if let Some(msg) = to_message(&reply) {
                                if sender.send(msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                    },
                    Some(Ok(Message::Binary(_))) => {
                        log::debug!("[WS] {}: ignoring binary frame", conn_id);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Ping/pong only count as activity.
                    Some(Ok(_)) => {}
                }
            }
            queued = outbound.recv() => {
                let Some(msg) = queued else {
                    log::warn!("[WS] {}: dropped by broadcaster", conn_id);
                    break;
                };
                if let Some(msg) = to_message(&msg) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    log::warn!("[WS] {}: idle timeout", conn_id);
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_messages() {
        assert_eq!(
            parse_client_message(r#"{"type":"subscribe","zone_id":"z1"}"#).unwrap(),
            ClientMessage::Subscribe {
                zone_id: "z1".into()
            }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"unsubscribe"}"#).unwrap(),
            ClientMessage::Unsubscribe
        );
    }

    #[test]
    fn rejects_unknown_and_malformed_messages() {
        for text in [
            r#"{"type":"volume","level":3}"#,
            "not json",
            r#"{"zone_id":"z1"}"#,
            r#"{"type":"subscribe","zone_id":""}"#,
        ] {
            let err = parse_client_message(text).unwrap_err();
            assert!(matches!(err, SyncError::Protocol(_)), "{}", text);
        }
    }

    #[test]
    fn outbound_messages_are_text_frames() {
        let msg = to_message(&ServerMessage::Seek {
            zone_id: "z1".into(),
            seek_position: 9,
        })
        .unwrap();
        match msg {
            Message::Text(text) => assert!(text.as_str().contains(r#""type":"seek""#)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
