//! Order API Handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{OrderAggregate, OrderStatus, Watermark};

use crate::auth::{require_edit, require_status_change, AuthUser};
use crate::cache::query::{self, OrderFilter, SortKey, MAX_RESULTS};
use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// Query params for listing orders
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    MAX_RESULTS
}

/// List response with the staleness indicator read endpoints carry when the
/// store is unreachable and the snapshot keeps serving.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub orders: Vec<Arc<OrderAggregate>>,
    pub watermark: Watermark,
    /// Refresh has been failing past the threshold; data may be stale
    pub stale: bool,
    /// Unix millis of the last successful refresh
    pub last_refresh_ms: i64,
}

/// List orders from the current snapshot.
pub async fn list(
    State(state): State<ServerState>,
    _user: AuthUser,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ListResponse>> {
    state.ensure_warm()?;
    let snapshot = state.cache.snapshot();
    let filter = OrderFilter {
        status: params.status,
        operator: params.operator,
        department: params.department,
    };
    let orders = query::list(&snapshot, &filter, params.sort, params.limit);
    Ok(Json(ListResponse {
        orders,
        watermark: snapshot.watermark(),
        stale: state.health.is_degraded(),
        last_refresh_ms: state.health.last_success_millis(),
    }))
}

/// Single order detail.
pub async fn get_by_serial(
    State(state): State<ServerState>,
    _user: AuthUser,
    Path(serial): Path<String>,
) -> AppResult<Json<Arc<OrderAggregate>>> {
    state.ensure_warm()?;
    state
        .cache
        .get(&serial)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("order {} not found", serial)))
}

/// Window for the change-polling probe: 5 minutes, matching the UI's
/// auto-refresh behavior.
const CHANGED_WINDOW_MILLIS: i64 = 5 * 60 * 1000;

#[derive(Debug, Serialize)]
pub struct ChangedResponse {
    pub changed: Vec<String>,
    pub stale: bool,
}

/// Cheap polling endpoint: which orders changed recently. Served from the
/// snapshot so UI polling never touches the store.
pub async fn changed(
    State(state): State<ServerState>,
    _user: AuthUser,
) -> AppResult<Json<ChangedResponse>> {
    state.ensure_warm()?;
    let snapshot = state.cache.snapshot();
    Ok(Json(ChangedResponse {
        changed: query::changed_since(&snapshot, CHANGED_WINDOW_MILLIS),
        stale: state.health.is_degraded(),
    }))
}

/// Edit-line request
#[derive(Debug, Deserialize)]
pub struct EditLineRequest {
    pub position: u32,
    pub quantity: Decimal,
}

/// Change the quantity of one order line (cashier only).
pub async fn edit_line(
    State(state): State<ServerState>,
    AuthUser(user): AuthUser,
    Path(serial): Path<String>,
    Json(payload): Json<EditLineRequest>,
) -> AppResult<Json<Arc<OrderAggregate>>> {
    require_edit(&user)?;
    let order = state
        .mutator
        .edit_line(&serial, payload.position, payload.quantity, &user)
        .await?;
    Ok(Json(order))
}

/// Status-change request
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// Move an order through the preparation flow (cashier or picker).
pub async fn set_status(
    State(state): State<ServerState>,
    AuthUser(user): AuthUser,
    Path(serial): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<Arc<OrderAggregate>>> {
    require_status_change(&user)?;
    // Cancellation counts as an edit, not a preparation step.
    if payload.status == OrderStatus::Cancelled {
        require_edit(&user)?;
    }
    let order = state
        .mutator
        .set_status(&serial, payload.status, &user)
        .await?;
    Ok(Json(order))
}

/// Mark-unavailable request
#[derive(Debug, Deserialize)]
pub struct UnavailableRequest {
    pub position: u32,
}

/// Mark a line unavailable during preparation (cashier or picker).
pub async fn mark_unavailable(
    State(state): State<ServerState>,
    AuthUser(user): AuthUser,
    Path(serial): Path<String>,
    Json(payload): Json<UnavailableRequest>,
) -> AppResult<Json<Arc<OrderAggregate>>> {
    require_status_change(&user)?;
    let order = state
        .mutator
        .mark_line_unavailable(&serial, payload.position, &user)
        .await?;
    Ok(Json(order))
}

/// Confirm an order (cashier only).
pub async fn confirm(
    State(state): State<ServerState>,
    AuthUser(user): AuthUser,
    Path(serial): Path<String>,
) -> AppResult<Json<Arc<OrderAggregate>>> {
    require_edit(&user)?;
    let order = state.mutator.confirm(&serial, &user).await?;
    Ok(Json(order))
}
