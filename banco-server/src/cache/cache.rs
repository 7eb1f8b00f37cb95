//! The shared order cache.
//!
//! Readers clone an `Arc` to the current snapshot under a read lock and then
//! work lock-free against an immutable view. Writers (delta application and
//! write-through) rebuild the map and swap the pointer under the write lock;
//! both mutation paths go through that one lock, so they serialize with each
//! other and never interleave field-level updates. No store I/O ever happens
//! while the lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use shared::{OrderAggregate, Watermark};

use crate::store::{ChangeRow, OrderRecord};

use super::snapshot::CacheSnapshot;

/// In-memory materialized view of order state.
#[derive(Debug)]
pub struct OrderCache {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::empty())),
        }
    }

    /// Current snapshot; the returned view stays consistent no matter how
    /// many swaps happen while the caller iterates it.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().clone()
    }

    pub fn watermark(&self) -> Watermark {
        self.current.read().watermark()
    }

    /// Single order lookup against the current snapshot.
    pub fn get(&self, serial: &str) -> Option<Arc<OrderAggregate>> {
        self.current.read().get(serial).cloned()
    }

    /// Apply one delta batch and advance the watermark, atomically from a
    /// reader's point of view.
    ///
    /// Revision guard: a row carrying a revision lower than or equal to the
    /// cached one is discarded for that order, which keeps write-through
    /// results from being clobbered by stale deltas and makes re-applying
    /// the same batch a no-op.
    pub fn apply_delta(&self, rows: Vec<ChangeRow>, new_watermark: Watermark) {
        let mut guard = self.current.write();
        let prev = guard.as_ref();
        let mut orders: HashMap<String, Arc<OrderAggregate>> = prev.orders_map().clone();
        let mut locally_ahead: HashSet<String> = prev.locally_ahead_set().clone();

        let mut applied = 0usize;
        let mut skipped = 0usize;
        for row in rows {
            match row {
                ChangeRow::Upsert(OrderRecord { order, .. }) => {
                    match orders.get(&order.serial) {
                        Some(existing) if existing.revision > order.revision => {
                            // Stale row; write-through ran ahead of this
                            // delta. Keep the newer entry and its flag.
                            skipped += 1;
                        }
                        Some(existing) if existing.revision == order.revision => {
                            // Same revision: nothing to replace, but the
                            // delta has now caught up with any local write.
                            locally_ahead.remove(&order.serial);
                            skipped += 1;
                        }
                        _ => {
                            locally_ahead.remove(&order.serial);
                            orders.insert(order.serial.clone(), Arc::new(order));
                            applied += 1;
                        }
                    }
                }
                ChangeRow::Evict { serial, .. } => {
                    locally_ahead.remove(&serial);
                    if orders.remove(&serial).is_some() {
                        applied += 1;
                    }
                }
            }
        }

        let watermark = prev.watermark().advanced_to(new_watermark.0);
        *guard = Arc::new(CacheSnapshot::with_parts(orders, watermark, locally_ahead));
        drop(guard);

        tracing::debug!(
            applied,
            skipped,
            watermark = %watermark,
            "delta applied to order cache"
        );
    }

    /// Mirror a write-through result into the cache.
    ///
    /// The watermark stays put: the store assigned this write a marker the
    /// scheduler has not fetched yet, so the entry is flagged locally-ahead
    /// until a delta at or beyond its revision subsumes it.
    pub fn apply_write(&self, record: OrderRecord) {
        let OrderRecord { order, .. } = record;
        let mut guard = self.current.write();
        let prev = guard.as_ref();

        if let Some(existing) = prev.get(&order.serial) {
            if existing.revision >= order.revision {
                tracing::warn!(
                    serial = %order.serial,
                    cached = existing.revision,
                    incoming = order.revision,
                    "write-through result older than cached revision, ignoring"
                );
                return;
            }
        }

        let mut orders = prev.orders_map().clone();
        let mut locally_ahead = prev.locally_ahead_set().clone();
        locally_ahead.insert(order.serial.clone());
        orders.insert(order.serial.clone(), Arc::new(order));

        let watermark = prev.watermark();
        *guard = Arc::new(CacheSnapshot::with_parts(orders, watermark, locally_ahead));
    }

    /// Drop one order from the cache. Eviction is always explicit (store
    /// deletion or archival past retention), never capacity pressure.
    pub fn evict(&self, serial: &str) {
        let mut guard = self.current.write();
        let prev = guard.as_ref();
        if prev.get(serial).is_none() {
            return;
        }
        let mut orders = prev.orders_map().clone();
        let mut locally_ahead = prev.locally_ahead_set().clone();
        orders.remove(serial);
        locally_ahead.remove(serial);
        let watermark = prev.watermark();
        *guard = Arc::new(CacheSnapshot::with_parts(orders, watermark, locally_ahead));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::test_order;
    use crate::store::{ChangeRow, OrderRecord};
    use shared::OrderStatus;

    fn upsert_row(serial: &str, revision: u64, marker: i64) -> ChangeRow {
        ChangeRow::Upsert(OrderRecord {
            order: test_order(serial, revision),
            marker,
        })
    }

    #[test]
    fn test_apply_delta_inserts_and_advances_watermark() {
        let cache = OrderCache::new();
        cache.apply_delta(
            vec![upsert_row("S-1", 1, 1), upsert_row("S-2", 1, 2), upsert_row("S-3", 1, 2)],
            Watermark(2),
        );
        let snap = cache.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.watermark(), Watermark(2));
    }

    #[test]
    fn test_apply_delta_idempotent() {
        let cache = OrderCache::new();
        let rows = vec![upsert_row("S-1", 1, 1), upsert_row("S-2", 2, 2)];
        cache.apply_delta(rows.clone(), Watermark(2));
        let first = cache.snapshot();

        cache.apply_delta(rows, Watermark(2));
        let second = cache.snapshot();

        assert_eq!(second.len(), first.len());
        assert_eq!(second.watermark(), first.watermark());
        for order in first.orders() {
            let again = second.get(&order.serial).unwrap();
            assert_eq!(again.as_ref(), order.as_ref());
        }
    }

    #[test]
    fn test_watermark_never_regresses() {
        let cache = OrderCache::new();
        cache.apply_delta(vec![upsert_row("S-1", 1, 7)], Watermark(7));
        // A buggy/stale batch with an older watermark must not move it back.
        cache.apply_delta(vec![], Watermark(3));
        assert_eq!(cache.watermark(), Watermark(7));
    }

    #[test]
    fn test_stale_delta_does_not_clobber_newer_revision() {
        let cache = OrderCache::new();
        let mut written = test_order("S-2", 5);
        written.status = OrderStatus::Completed;
        cache.apply_write(OrderRecord {
            order: written,
            marker: 10,
        });

        // Delta arrives carrying revision 3 for the same order.
        cache.apply_delta(vec![upsert_row("S-2", 3, 6)], Watermark(6));

        let cached = cache.get("S-2").unwrap();
        assert_eq!(cached.revision, 5);
        assert_eq!(cached.status, OrderStatus::Completed);
        // Still flagged until a delta at revision >= 5 shows up.
        assert!(cache.snapshot().is_locally_ahead("S-2"));
    }

    #[test]
    fn test_delta_at_or_past_local_revision_clears_marker() {
        let cache = OrderCache::new();
        cache.apply_write(OrderRecord {
            order: test_order("S-1", 5),
            marker: 9,
        });
        assert!(cache.snapshot().is_locally_ahead("S-1"));

        cache.apply_delta(vec![upsert_row("S-1", 6, 11)], Watermark(11));
        let snap = cache.snapshot();
        assert!(!snap.is_locally_ahead("S-1"));
        assert_eq!(snap.get("S-1").unwrap().revision, 6);
    }

    #[test]
    fn test_apply_write_rejects_older_revision() {
        let cache = OrderCache::new();
        cache.apply_delta(vec![upsert_row("S-1", 4, 1)], Watermark(1));
        cache.apply_write(OrderRecord {
            order: test_order("S-1", 3),
            marker: 2,
        });
        assert_eq!(cache.get("S-1").unwrap().revision, 4);
    }

    #[test]
    fn test_reader_keeps_consistent_snapshot_across_swap() {
        let cache = OrderCache::new();
        cache.apply_delta(
            vec![upsert_row("S-1", 1, 1), upsert_row("S-2", 1, 1)],
            Watermark(1),
        );

        // A "long-running list call": grab the snapshot, then swap under it.
        let held = cache.snapshot();
        cache.apply_delta(vec![upsert_row("S-1", 2, 5)], Watermark(5));
        cache.evict("S-2");

        // The held view still shows generation N throughout.
        assert_eq!(held.len(), 2);
        assert_eq!(held.get("S-1").unwrap().revision, 1);
        assert_eq!(held.watermark(), Watermark(1));

        // New readers see generation N+1.
        let fresh = cache.snapshot();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.get("S-1").unwrap().revision, 2);
    }

    #[test]
    fn test_evict_via_delta_row() {
        let cache = OrderCache::new();
        cache.apply_delta(vec![upsert_row("S-1", 1, 1)], Watermark(1));
        cache.apply_delta(
            vec![ChangeRow::Evict {
                serial: "S-1".into(),
                marker: 2,
            }],
            Watermark(2),
        );
        assert!(cache.get("S-1").is_none());
        assert_eq!(cache.watermark(), Watermark(2));
    }
}
