//! Postgres implementation of the backing store.
//!
//! The schema pairs an authoritative `orders` table (one row per order, with
//! a `revision` counter and a store-assigned change sequence `seq`) with an
//! `order_lines` table owned by it. Every insert/update takes a fresh value
//! from the `order_seq` sequence, so `seq` is a monotonic change marker that
//! does not depend on wall clocks.
//!
//! Orders deleted upstream are kept as tombstones (`archived_at` set); once a
//! tombstone falls beyond the retention horizon its delta row becomes an
//! eviction instead of an upsert.
//!
//! All SQL is parameterized. Connection acquisition and statements run under
//! bounded timeouts so a dead database surfaces as `StoreError::Unavailable`
//! instead of hanging a request or the refresh loop.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{OrderAggregate, OrderLine, OrderStatus, Watermark};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use super::{BackingStore, ChangeRow, OrderChange, OrderRecord, StoreError};

/// Row shape for the `orders` table. Kept separate from the domain aggregate
/// so schema details stay local to this module.
#[derive(Debug, Clone, FromRow)]
struct DbOrder {
    serial: String,
    order_number: Option<String>,
    customer_name: String,
    department: Option<String>,
    operator: Option<String>,
    due_date: Option<chrono::NaiveDate>,
    confirmed: bool,
    status: String,
    created_at: i64,
    updated_at: i64,
    revision: i64,
    seq: i64,
    archived_at: Option<i64>,
}

/// Row shape for the `order_lines` table.
#[derive(Debug, Clone, FromRow)]
struct DbOrderLine {
    serial: String,
    position: i32,
    product_code: String,
    description: String,
    quantity: Decimal,
    unit: String,
    unit_price: Option<Decimal>,
    modified: bool,
    removed: bool,
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| StoreError::Malformed(format!("unknown order status: {}", raw)))
}

fn status_to_db(status: OrderStatus) -> String {
    status.to_string()
}

fn map_sqlx_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Malformed(e.to_string())
        }
        // Database-level failures (connection resets show up here too) keep
        // the refresh loop in its backoff path rather than crashing it.
        _ => StoreError::Unavailable(e.to_string()),
    }
}

/// Postgres-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    /// Tombstones older than this become evictions in the delta
    retention: chrono::Duration,
}

impl PostgresStore {
    /// Default retention horizon for archived orders: 30 days.
    pub const DEFAULT_RETENTION_DAYS: i64 = 30;

    /// Connect with bounded pool timeouts.
    pub async fn connect(database_url: &str, retention_days: i64) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(map_sqlx_err)?;
        Ok(Self::with_pool(pool, retention_days))
    }

    pub fn with_pool(pool: PgPool, retention_days: i64) -> Self {
        Self {
            pool,
            retention: chrono::Duration::days(retention_days),
        }
    }

    fn retention_cutoff_millis(&self) -> i64 {
        shared::util::now_millis() - self.retention.num_milliseconds()
    }

    /// Assemble aggregates for a set of header rows, fetching their lines in
    /// one round trip.
    async fn assemble(&self, headers: Vec<DbOrder>) -> Result<Vec<ChangeRow>, StoreError> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let serials: Vec<String> = headers.iter().map(|h| h.serial.clone()).collect();
        let lines = sqlx::query_as::<_, DbOrderLine>(
            r#"
            SELECT serial, position, product_code, description, quantity,
                   unit, unit_price, modified, removed
            FROM order_lines
            WHERE serial = ANY($1)
            ORDER BY serial, position
            "#,
        )
        .bind(&serials)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut lines_by_serial: std::collections::HashMap<String, Vec<OrderLine>> =
            std::collections::HashMap::new();
        for line in lines {
            lines_by_serial
                .entry(line.serial.clone())
                .or_default()
                .push(OrderLine {
                    position: line.position as u32,
                    product_code: line.product_code,
                    description: line.description,
                    quantity: line.quantity,
                    unit: line.unit,
                    unit_price: line.unit_price,
                    modified: line.modified,
                    removed: line.removed,
                });
        }

        let cutoff = self.retention_cutoff_millis();
        let mut rows = Vec::with_capacity(headers.len());
        for header in headers {
            if let Some(archived_at) = header.archived_at {
                if archived_at < cutoff {
                    rows.push(ChangeRow::Evict {
                        serial: header.serial,
                        marker: header.seq,
                    });
                    continue;
                }
            }
            let record = self.record_from(header, &mut lines_by_serial)?;
            rows.push(ChangeRow::Upsert(record));
        }
        Ok(rows)
    }

    fn record_from(
        &self,
        header: DbOrder,
        lines_by_serial: &mut std::collections::HashMap<String, Vec<OrderLine>>,
    ) -> Result<OrderRecord, StoreError> {
        let status = parse_status(&header.status)?;
        let lines = lines_by_serial.remove(&header.serial).unwrap_or_default();
        Ok(OrderRecord {
            order: OrderAggregate {
                serial: header.serial,
                order_number: header.order_number,
                customer_name: header.customer_name,
                department: header.department,
                operator: header.operator,
                due_date: header.due_date,
                confirmed: header.confirmed,
                status,
                lines,
                created_at: header.created_at,
                updated_at: header.updated_at,
                revision: header.revision as u64,
            },
            marker: header.seq,
        })
    }
}

#[async_trait]
impl BackingStore for PostgresStore {
    async fn fetch_changed(
        &self,
        since: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRow>, StoreError> {
        let mut headers = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT serial, order_number, customer_name, department, operator,
                   due_date, confirmed, status, created_at, updated_at,
                   revision, seq, archived_at
            FROM orders
            WHERE seq > $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(since.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // A full batch may have cut through a set of rows sharing the
        // boundary marker (rows written in one transaction). Pull the rest of
        // that tie-set so the watermark never lands inside one.
        if headers.len() == limit {
            if let Some(boundary) = headers.last().map(|h| h.seq) {
                let tail = sqlx::query_as::<_, DbOrder>(
                    r#"
                    SELECT serial, order_number, customer_name, department, operator,
                           due_date, confirmed, status, created_at, updated_at,
                           revision, seq, archived_at
                    FROM orders
                    WHERE seq = $1
                    "#,
                )
                .bind(boundary)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
                for row in tail {
                    if !headers.iter().any(|h| h.serial == row.serial) {
                        headers.push(row);
                    }
                }
            }
        }

        self.assemble(headers).await
    }

    async fn fetch_one(&self, serial: &str) -> Result<Option<OrderRecord>, StoreError> {
        let header = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT serial, order_number, customer_name, department, operator,
                   due_date, confirmed, status, created_at, updated_at,
                   revision, seq, archived_at
            FROM orders
            WHERE serial = $1
            "#,
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(header) = header else {
            return Ok(None);
        };
        let rows = self.assemble(vec![header]).await?;
        match rows.into_iter().next() {
            Some(ChangeRow::Upsert(record)) => Ok(Some(record)),
            // Tombstone past retention behaves like a deleted order
            _ => Ok(None),
        }
    }

    async fn write(
        &self,
        serial: &str,
        expected_revision: u64,
        change: OrderChange,
    ) -> Result<OrderRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let header = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT serial, order_number, customer_name, department, operator,
                   due_date, confirmed, status, created_at, updated_at,
                   revision, seq, archived_at
            FROM orders
            WHERE serial = $1
            FOR UPDATE
            "#,
        )
        .bind(serial)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .ok_or_else(|| StoreError::NotFound(serial.to_string()))?;

        if header.revision as u64 != expected_revision {
            return Err(StoreError::Conflict {
                serial: serial.to_string(),
                expected: expected_revision,
            });
        }

        let now = shared::util::now_millis();
        match &change {
            OrderChange::EditLine { position, quantity } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE order_lines
                    SET quantity = $1, modified = TRUE
                    WHERE serial = $2 AND position = $3
                    "#,
                )
                .bind(quantity)
                .bind(serial)
                .bind(*position as i32)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!(
                        "{} line {}",
                        serial, position
                    )));
                }
            }
            OrderChange::MarkLineUnavailable { position } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE order_lines
                    SET removed = TRUE
                    WHERE serial = $1 AND position = $2
                    "#,
                )
                .bind(serial)
                .bind(*position as i32)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!(
                        "{} line {}",
                        serial, position
                    )));
                }
            }
            OrderChange::SetStatus { status, operator } => {
                sqlx::query(
                    r#"
                    UPDATE orders SET status = $1, operator = $2 WHERE serial = $3
                    "#,
                )
                .bind(status_to_db(*status))
                .bind(operator)
                .bind(serial)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            }
            OrderChange::Confirm { operator } => {
                sqlx::query(
                    r#"
                    UPDATE orders
                    SET confirmed = TRUE, status = $1, operator = $2
                    WHERE serial = $3
                    "#,
                )
                .bind(status_to_db(OrderStatus::Confirmed))
                .bind(operator)
                .bind(serial)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            }
        }

        // Revision bump and a fresh change marker in the same transaction,
        // so concurrent delta fetches see the whole write or none of it.
        let header = sqlx::query_as::<_, DbOrder>(
            r#"
            UPDATE orders
            SET revision = revision + 1,
                updated_at = $1,
                seq = nextval('order_seq')
            WHERE serial = $2
            RETURNING serial, order_number, customer_name, department, operator,
                      due_date, confirmed, status, created_at, updated_at,
                      revision, seq, archived_at
            "#,
        )
        .bind(now)
        .bind(serial)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let lines = sqlx::query_as::<_, DbOrderLine>(
            r#"
            SELECT serial, position, product_code, description, quantity,
                   unit, unit_price, modified, removed
            FROM order_lines
            WHERE serial = $1
            ORDER BY position
            "#,
        )
        .bind(serial)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        let mut lines_by_serial = std::collections::HashMap::new();
        lines_by_serial.insert(
            serial.to_string(),
            lines
                .into_iter()
                .map(|line| OrderLine {
                    position: line.position as u32,
                    product_code: line.product_code,
                    description: line.description,
                    quantity: line.quantity,
                    unit: line.unit,
                    unit_price: line.unit_price,
                    modified: line.modified,
                    removed: line.removed,
                })
                .collect(),
        );
        self.record_from(header, &mut lines_by_serial)
    }
}
