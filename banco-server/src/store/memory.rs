//! In-memory backing store.
//!
//! Same contract as the Postgres adapter, backed by a map and a local
//! sequence counter. Used by the test suites and by offline development
//! runs; failure injection lets scheduler tests exercise the outage path
//! without a database.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::{OrderAggregate, OrderStatus, Watermark};

use async_trait::async_trait;

use super::{BackingStore, ChangeRow, OrderChange, OrderRecord, StoreError};

#[derive(Debug, Default)]
struct Inner {
    orders: std::collections::HashMap<String, OrderRecord>,
    /// Serials evicted upstream, with the marker of the eviction
    evicted: Vec<(String, i64)>,
    seq: i64,
    /// When set, every call fails with `Unavailable`
    offline: bool,
}

/// In-memory implementation of [`BackingStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order, assigning the next change marker.
    /// Simulates an out-of-band writer touching the store.
    pub fn upsert(&self, order: OrderAggregate) -> i64 {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let marker = inner.seq;
        inner
            .orders
            .insert(order.serial.clone(), OrderRecord { order, marker });
        marker
    }

    /// Insert or replace an order reusing a caller-chosen marker. Lets tests
    /// build tie-sets (several rows sharing one marker).
    pub fn upsert_at_marker(&self, order: OrderAggregate, marker: i64) {
        let mut inner = self.inner.lock();
        inner.seq = inner.seq.max(marker);
        inner
            .orders
            .insert(order.serial.clone(), OrderRecord { order, marker });
    }

    /// Remove an order; the next delta reports it as an eviction.
    pub fn evict(&self, serial: &str) {
        let mut inner = self.inner.lock();
        if inner.orders.remove(serial).is_some() {
            inner.seq += 1;
            let marker = inner.seq;
            inner.evicted.push((serial.to_string(), marker));
        }
    }

    /// Toggle failure injection.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    pub fn current_seq(&self) -> i64 {
        self.inner.lock().seq
    }

    fn check_online(inner: &Inner) -> Result<(), StoreError> {
        if inner.offline {
            Err(StoreError::Unavailable("store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn fetch_changed(
        &self,
        since: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRow>, StoreError> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;

        let mut rows: Vec<ChangeRow> = inner
            .orders
            .values()
            .filter(|r| r.marker > since.0)
            .cloned()
            .map(ChangeRow::Upsert)
            .collect();
        rows.extend(
            inner
                .evicted
                .iter()
                .filter(|(_, marker)| *marker > since.0)
                .map(|(serial, marker)| ChangeRow::Evict {
                    serial: serial.clone(),
                    marker: *marker,
                }),
        );
        rows.sort_by_key(|r| (r.marker(), r.serial().to_string()));

        // Never split a tie-set at the batch boundary: keep the first `limit`
        // rows plus any further rows sharing the boundary marker.
        if rows.len() > limit {
            let boundary = rows[limit - 1].marker();
            let tail: Vec<ChangeRow> = rows
                .split_off(limit)
                .into_iter()
                .filter(|r| r.marker() == boundary)
                .collect();
            rows.extend(tail);
        }
        Ok(rows)
    }

    async fn fetch_one(&self, serial: &str) -> Result<Option<OrderRecord>, StoreError> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;
        Ok(inner.orders.get(serial).cloned())
    }

    async fn write(
        &self,
        serial: &str,
        expected_revision: u64,
        change: OrderChange,
    ) -> Result<OrderRecord, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;

        inner.seq += 1;
        let marker = inner.seq;
        let record = inner
            .orders
            .get_mut(serial)
            .ok_or_else(|| StoreError::NotFound(serial.to_string()))?;
        if record.order.revision != expected_revision {
            return Err(StoreError::Conflict {
                serial: serial.to_string(),
                expected: expected_revision,
            });
        }

        let order = &mut record.order;
        match change {
            OrderChange::EditLine { position, quantity } => {
                let line = order
                    .lines
                    .iter_mut()
                    .find(|l| l.position == position)
                    .ok_or_else(|| StoreError::NotFound(format!("{} line {}", serial, position)))?;
                line.quantity = quantity;
                line.modified = true;
            }
            OrderChange::MarkLineUnavailable { position } => {
                let line = order
                    .lines
                    .iter_mut()
                    .find(|l| l.position == position)
                    .ok_or_else(|| StoreError::NotFound(format!("{} line {}", serial, position)))?;
                line.removed = true;
            }
            OrderChange::SetStatus { status, operator } => {
                order.status = status;
                order.operator = Some(operator);
            }
            OrderChange::Confirm { operator } => {
                order.confirmed = true;
                order.status = OrderStatus::Confirmed;
                order.operator = Some(operator);
            }
        }
        order.revision += 1;
        order.updated_at = shared::util::now_millis();
        record.marker = marker;
        Ok(record.clone())
    }
}

/// Build a minimal order for tests.
pub fn test_order(serial: &str, revision: u64) -> OrderAggregate {
    let mut order = OrderAggregate::new(serial, "Test Customer");
    order.revision = revision;
    order.lines = vec![shared::OrderLine {
        position: 0,
        product_code: "ART-001".into(),
        description: "Test article".into(),
        quantity: Decimal::from(1),
        unit: "PZ".into(),
        unit_price: None,
        modified: false,
        removed: false,
    }];
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_delta_is_not_an_error() {
        let store = MemoryStore::new();
        let rows = store.fetch_changed(Watermark::ZERO, 100).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_offline_is_distinct_from_empty() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.fetch_changed(Watermark::ZERO, 100).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_changed_orders_by_marker() {
        let store = MemoryStore::new();
        store.upsert(test_order("S-2", 1));
        store.upsert(test_order("S-1", 1));
        let rows = store.fetch_changed(Watermark::ZERO, 100).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].marker() < rows[1].marker());
        assert_eq!(rows[0].serial(), "S-2");
    }

    #[tokio::test]
    async fn test_tie_set_never_split() {
        let store = MemoryStore::new();
        store.upsert_at_marker(test_order("S-1", 1), 1);
        store.upsert_at_marker(test_order("S-2", 1), 2);
        store.upsert_at_marker(test_order("S-3", 1), 2);
        store.upsert_at_marker(test_order("S-4", 1), 2);

        // Limit cuts inside the marker-2 tie-set; the whole set must come
        // along anyway.
        let rows = store.fetch_changed(Watermark::ZERO, 2).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[1..].iter().all(|r| r.marker() == 2));
    }

    #[tokio::test]
    async fn test_write_conflict_on_stale_revision() {
        let store = MemoryStore::new();
        store.upsert(test_order("S-1", 3));
        let err = store
            .write(
                "S-1",
                2,
                OrderChange::Confirm {
                    operator: "op".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 2, .. }));
    }

    #[tokio::test]
    async fn test_write_bumps_revision_and_marker() {
        let store = MemoryStore::new();
        let before = store.upsert(test_order("S-1", 1));
        let record = store
            .write(
                "S-1",
                1,
                OrderChange::EditLine {
                    position: 0,
                    quantity: Decimal::from(5),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.order.revision, 2);
        assert!(record.marker > before);
        assert!(record.order.lines[0].modified);
        assert_eq!(record.order.lines[0].quantity, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_eviction_appears_in_delta() {
        let store = MemoryStore::new();
        store.upsert(test_order("S-1", 1));
        let after_insert = store.current_seq();
        store.evict("S-1");
        let rows = store
            .fetch_changed(Watermark(after_insert), 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(&rows[0], ChangeRow::Evict { serial, .. } if serial == "S-1"));
    }
}
