//! Backing store adapter
//!
//! The authoritative order data lives in a relational store that other
//! processes also write to. This module is the only place that talks to it:
//! everything above works against the [`BackingStore`] trait and the error
//! taxonomy defined here.
//!
//! The one contract that matters most: a store that cannot be reached is
//! reported as [`StoreError::Unavailable`], never as an empty result set. An
//! empty delta means "no changes"; the two must stay distinguishable.

pub mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{OrderAggregate, OrderStatus, Watermark};
use thiserror::Error;

/// Store-level errors, already classified for the layers above.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection loss, timeout, pool exhaustion. Triggers refresh backoff;
    /// the cache keeps serving the last good snapshot.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Revision mismatch on a guarded write. The caller must re-read and
    /// retry with fresh data.
    #[error("revision conflict on order {serial}: expected {expected}")]
    Conflict { serial: String, expected: u64 },

    /// The order does not exist in the store.
    #[error("order not found: {0}")]
    NotFound(String),

    /// A row came back in a shape we cannot decode.
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// One order as the store sees it: the aggregate plus the store-assigned
/// change marker (a monotonic sequence, not wall-clock time).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order: OrderAggregate,
    /// Change sequence assigned by the store on every insert/update
    pub marker: i64,
}

/// One entry of a delta batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRow {
    /// Insert or update of an order
    Upsert(OrderRecord),
    /// The order was deleted or archived beyond the retention horizon and
    /// must leave the cache
    Evict { serial: String, marker: i64 },
}

impl ChangeRow {
    pub fn marker(&self) -> i64 {
        match self {
            ChangeRow::Upsert(record) => record.marker,
            ChangeRow::Evict { marker, .. } => *marker,
        }
    }

    pub fn serial(&self) -> &str {
        match self {
            ChangeRow::Upsert(record) => &record.order.serial,
            ChangeRow::Evict { serial, .. } => serial,
        }
    }
}

/// A write-through mutation, validated before it gets here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderChange {
    /// Change the quantity of one line; marks the line modified
    EditLine { position: u32, quantity: Decimal },
    /// Mark one line unavailable during preparation; sets its removed flag
    MarkLineUnavailable { position: u32 },
    /// Move the order to a new status
    SetStatus { status: OrderStatus, operator: String },
    /// Cashier confirmation (sets the header flag, moves to Confirmed)
    Confirm { operator: String },
}

/// Port to the authoritative relational store.
///
/// All queries are parameterized; all filters run on indexed columns
/// (status, due date, assigned operator, change sequence). Implementations
/// must use bounded timeouts so a dead store surfaces as `Unavailable`
/// instead of hanging the caller.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Rows whose change marker is strictly greater than `since`, ordered by
    /// marker ascending. `limit` bounds the batch; implementations must not
    /// split a set of rows sharing one marker across batches.
    async fn fetch_changed(
        &self,
        since: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRow>, StoreError>;

    /// Single order lookup.
    async fn fetch_one(&self, serial: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Revision-guarded write: applies `change` only if the stored revision
    /// still equals `expected_revision`, returning the updated record.
    async fn write(
        &self,
        serial: &str,
        expected_revision: u64,
        change: OrderChange,
    ) -> Result<OrderRecord, StoreError>;
}
