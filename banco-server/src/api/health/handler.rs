//! Health Handler

use axum::{extract::State, Json};
use serde::Serialize;
use shared::Watermark;

use crate::core::ServerState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, `warming` or `degraded`
    pub status: &'static str,
    /// Unix millis of the last successful refresh (0 while warming)
    pub last_refresh_ms: i64,
    /// Milliseconds since the last successful refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_ms: Option<i64>,
    pub watermark: Watermark,
    pub orders_cached: usize,
    /// Process instance id; changes on restart
    pub epoch: uuid::Uuid,
}

/// Always answers 200; a degraded refresh is reported in the body, not the
/// status code, because the server is still serving its last good snapshot.
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let snapshot = state.cache.snapshot();
    let status = if !state.health.is_warm() {
        "warming"
    } else if state.health.is_degraded() {
        "degraded"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        last_refresh_ms: state.health.last_success_millis(),
        staleness_ms: state.health.staleness_millis(),
        watermark: snapshot.watermark(),
        orders_cached: snapshot.len(),
        epoch: state.health.epoch(),
    })
}
