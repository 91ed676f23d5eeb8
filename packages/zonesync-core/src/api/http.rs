//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::api_success;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{SyncError, SyncResult};
use crate::protocol_constants::SERVICE_ID;
use crate::services::ExternalNowPlaying;
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/zones", get(list_zones))
        .route("/api/zones/{zone_id}/now-playing", get(get_now_playing))
        .route("/sources/{zone_id}/now-playing", post(push_now_playing))
        .route("/sources/{zone_id}", delete(delete_source_zone))
        .route("/artwork/{*artwork_ref}", get(serve_artwork))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe, plus the cadence external sources should push at.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (push_interval, timeout) = {
        let config = state.config.read();
        (config.push_interval_secs, config.external_timeout_secs)
    };
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "zones": state.registry.len(),
        "connections": state.ws_manager.connection_count(),
        "upstream_connected": state.upstream.is_connected(),
        "server_time_ms": now_millis(),
        "external_sources": {
            "push_interval_secs": push_interval,
            "timeout_secs": timeout
        }
    }))
}

async fn list_zones(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "zones": state.registry.list_zones() }))
}

async fn get_now_playing(
    Path(zone_id): Path<String>,
    State(state): State<AppState>,
) -> SyncResult<impl IntoResponse> {
    let snapshot = state
        .registry
        .get_snapshot(&zone_id)
        .ok_or(SyncError::ZoneNotFound(zone_id))?;
    Ok(api_success(&*snapshot).into_response())
}

/// Receives a push from an external source.
///
/// JSON errors (bad syntax, wrong types, unknown `state`) are reported as
/// validation failures in the same body shape as missing fields.
async fn push_now_playing(
    Path(zone_id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<ExternalNowPlaying>, JsonRejection>,
) -> SyncResult<impl IntoResponse> {
    let Json(payload) = payload.map_err(|e| {
        log::debug!("[ExternalSource] Rejected body for {}: {}", zone_id, e);
        SyncError::Validation(e.body_text())
    })?;
    let accepted = state.external_source.push_update(&zone_id, payload)?;
    Ok(api_success(accepted))
}

async fn delete_source_zone(
    Path(zone_id): Path<String>,
    State(state): State<AppState>,
) -> SyncResult<impl IntoResponse> {
    let removed = state.external_source.delete_zone(&zone_id)?;
    Ok(api_success(removed))
}

/// Streams artwork bytes from the resolver collaborator.
async fn serve_artwork(
    Path(artwork_ref): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.artwork.resolve(&artwork_ref).await {
        Some(artwork) => {
            log::debug!(
                "[Artwork] Serving {} ({} bytes)",
                artwork_ref,
                artwork.bytes.len()
            );
            ([(header::CONTENT_TYPE, artwork.content_type)], artwork.bytes).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap_services;
    use crate::services::SourceEvent;
    use crate::state::Config;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn setup() -> (crate::bootstrap::BootstrappedServices, Router) {
        let services =
            bootstrap_services(&Config::default(), tokio::runtime::Handle::current()).unwrap();
        let router = create_router(AppState::new(&services));
        (services, router)
    }

    async fn request(
        app: &Router,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    const PLAYING: &str = r#"{
        "zone_name": "Patio",
        "state": "playing",
        "title": "Clair de Lune",
        "artist": "Debussy",
        "duration_seconds": 300,
        "seek_position": 42
    }"#;

    #[tokio::test]
    async fn health_reports_push_cadence() {
        let (_services, app) = setup();
        let (status, body) = request(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "zonesync");
        assert_eq!(body["external_sources"]["push_interval_secs"], 5);
        assert_eq!(body["external_sources"]["timeout_secs"], 60);
        assert!(body["server_time_ms"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn push_then_read_back() {
        let (_services, app) = setup();

        let (status, body) = request(
            &app,
            Method::POST,
            "/sources/ext-1/now-playing",
            Some(PLAYING),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "zone_id": "ext-1"}));

        let (status, body) = request(&app, Method::GET, "/api/zones", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["zones"][0]["id"], "ext-1");
        assert_eq!(body["zones"][0]["source"], "external");
        assert_eq!(body["zones"][0]["connectivity"], "connected");

        let (status, body) =
            request(&app, Method::GET, "/api/zones/ext-1/now-playing", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "playing");
        assert_eq!(body["seek_position"], 42);
        assert_eq!(body["track"]["title"], "Clair de Lune");
        assert!(body.get("captured_at").is_none());
    }

    #[tokio::test]
    async fn missing_title_is_a_400_with_error_body() {
        let (services, app) = setup();
        let (status, body) = request(
            &app,
            Method::POST,
            "/sources/ext-1/now-playing",
            Some(r#"{"zone_name": "Patio", "state": "playing", "artist": "X"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["status"], 400);
        assert!(services.registry.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_failure() {
        let (_services, app) = setup();
        for bad in [
            "{not json",
            r#"{"zone_name": "Patio", "state": "rewinding"}"#,
            r#"{"zone_name": "Patio", "state": "playing", "title": "a", "artist": "b", "seek_position": -3}"#,
        ] {
            let (status, body) =
                request(&app, Method::POST, "/sources/ext-1/now-playing", Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", bad);
            assert_eq!(body["error"], "validation_failed");
        }
    }

    #[tokio::test]
    async fn push_for_primary_zone_is_a_conflict() {
        let (services, app) = setup();
        services.primary_source.handle_event(SourceEvent::ZoneSeen {
            zone_id: "kitchen".into(),
            zone_name: "Kitchen".into(),
        });

        let (status, body) = request(
            &app,
            Method::POST,
            "/sources/kitchen/now-playing",
            Some(PLAYING),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "zone_conflict");
    }

    #[tokio::test]
    async fn delete_then_delete_again() {
        let (_services, app) = setup();
        request(&app, Method::POST, "/sources/ext-1/now-playing", Some(PLAYING)).await;

        let (status, body) = request(&app, Method::DELETE, "/sources/ext-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["zone_id"], "ext-1");

        let (status, body) = request(&app, Method::DELETE, "/sources/ext-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "zone_not_found");
    }

    #[tokio::test]
    async fn unknown_snapshot_and_artwork_are_404() {
        let (_services, app) = setup();
        let (status, _) = request(&app, Method::GET, "/api/zones/nope/now-playing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = request(&app, Method::GET, "/artwork/abc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
