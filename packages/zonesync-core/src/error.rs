//! Centralized error types for the Zonesync core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the zone synchronization server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SyncError {
    /// An external push was malformed; the zone is untouched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Delete or lookup of an unknown zone id.
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// The zone id already belongs to a different source kind.
    #[error("Zone {0} is owned by another source")]
    ZoneConflict(String),

    /// Malformed or unknown message on a display connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::ZoneNotFound(_) => "zone_not_found",
            Self::ZoneConflict(_) => "zone_conflict",
            Self::Protocol(_) => "protocol_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl SyncError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::ZoneNotFound(_) => StatusCode::NOT_FOUND,
            Self::ZoneConflict(_) => StatusCode::CONFLICT,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
