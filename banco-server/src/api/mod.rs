//! API routes.
//!
//! - [`health`] - liveness plus cache/refresh health
//! - [`orders`] - order reads (via the cache snapshot) and write-through
//!   mutations

pub mod health;
pub mod orders;

use axum::Router;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};

/// The full API router.
pub fn router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
}
