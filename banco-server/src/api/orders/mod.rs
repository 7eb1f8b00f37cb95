//! Order API Module
//!
//! Reads are served from the cache snapshot; mutations go through the
//! write-through mutator. Nothing here ever queries the backing store on a
//! read path.

mod handler;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Reads (any resolved user)
        .route("/", get(handler::list))
        .route("/changed", get(handler::changed))
        .route("/{serial}", get(handler::get_by_serial))
        // Mutations (role-gated in the handlers)
        .route("/{serial}/edit", post(handler::edit_line))
        .route("/{serial}/status", post(handler::set_status))
        .route("/{serial}/unavailable", post(handler::mark_unavailable))
        .route("/{serial}/confirm", post(handler::confirm))
}
