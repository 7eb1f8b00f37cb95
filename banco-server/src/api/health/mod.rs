//! Health API Module
//!
//! Liveness plus the cache's refresh health, for load balancers and the
//! operator dashboard.

mod handler;

use axum::{routing::get, Router};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(handler::health))
}
