//! Unified error handling
//!
//! Layer errors ([`crate::store::StoreError`],
//! [`crate::cache::MutationError`]) are converted here into one [`AppError`]
//! that knows its HTTP status. Raw driver errors never cross this boundary.
//!
//! Read and write paths degrade differently when the store is down: reads
//! keep serving the stale snapshot (the handlers only report staleness),
//! writes fail closed with 503 so the client can retry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::MutationError;
use crate::store::StoreError;

/// API response envelope.
///
/// ```json
/// { "code": "0000", "message": "success", "data": { ... } }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    /// Error code (0000 means success)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> AppResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: "0000".into(),
            message: "success".into(),
            data: Some(data),
        }
    }
}

/// Application error enum.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== Auth (4xx) ==========
    /// No resolved user on the request (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Role lacks the permission (403)
    #[error("Permission denied: {0}")]
    Forbidden(String),

    // ========== Business (4xx) ==========
    /// Resource absent from cache and store (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Concurrent modification, retry with fresh data (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed mutation payload, rejected before the store (400)
    #[error("Validation failed: {0}")]
    Validation(String),

    // ========== System (5xx) ==========
    /// The backing store cannot be reached (503)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// First refresh has not completed yet (503)
    #[error("Cache is warming up")]
    WarmingUp,

    /// Anything else (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) | AppError::WarmingUp => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "E3001",
            AppError::Forbidden(_) => "E2001",
            AppError::NotFound(_) => "E0003",
            AppError::Conflict(_) => "E0004",
            AppError::Validation(_) => "E0002",
            AppError::StoreUnavailable(_) => "E9002",
            AppError::WarmingUp => "E9003",
            AppError::Internal(_) => "E9001",
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            StoreError::Conflict { serial, .. } => {
                AppError::Conflict(format!("order {} was modified concurrently", serial))
            }
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Malformed(msg) => AppError::Internal(msg),
        }
    }
}

impl From<MutationError> for AppError {
    fn from(e: MutationError) -> Self {
        match e {
            MutationError::Validation(msg) => AppError::Validation(msg),
            MutationError::NotFound(what) => AppError::NotFound(what),
            MutationError::InvalidTransition { from, to } => {
                AppError::Validation(format!("cannot move order from {} to {}", from, to))
            }
            MutationError::Forbidden(msg) => AppError::Forbidden(msg),
            MutationError::Conflict(serial) => {
                AppError::Conflict(format!("order {} was modified concurrently", serial))
            }
            MutationError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body: AppResponse<()> = AppResponse {
            code: self.code().into(),
            message: self.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Result alias used by every handler.
pub type AppResult<T> = Result<T, AppError>;
