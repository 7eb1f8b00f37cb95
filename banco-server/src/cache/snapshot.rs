//! Immutable cache snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shared::{OrderAggregate, Watermark};

/// One self-consistent view of every cached order at a point in time.
///
/// Snapshots are never mutated after publication; the cache swaps in a new
/// one instead. Aggregates are held behind `Arc` so successor snapshots share
/// unchanged entries instead of deep-copying them.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    orders: HashMap<String, Arc<OrderAggregate>>,
    watermark: Watermark,
    /// Orders written through by this process that no delta has covered yet;
    /// their revision may run ahead of the watermark.
    locally_ahead: HashSet<String>,
    /// When this snapshot was published (Unix millis)
    built_at: i64,
}

impl CacheSnapshot {
    /// The empty snapshot an unwarmed cache starts from.
    pub fn empty() -> Self {
        Self {
            orders: HashMap::new(),
            watermark: Watermark::ZERO,
            locally_ahead: HashSet::new(),
            built_at: shared::util::now_millis(),
        }
    }

    pub(super) fn with_parts(
        orders: HashMap<String, Arc<OrderAggregate>>,
        watermark: Watermark,
        locally_ahead: HashSet<String>,
    ) -> Self {
        Self {
            orders,
            watermark,
            locally_ahead,
            built_at: shared::util::now_millis(),
        }
    }

    pub(super) fn orders_map(&self) -> &HashMap<String, Arc<OrderAggregate>> {
        &self.orders
    }

    pub fn get(&self, serial: &str) -> Option<&Arc<OrderAggregate>> {
        self.orders.get(serial)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Arc<OrderAggregate>> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Whether `serial` carries a write-through result not yet subsumed by a
    /// delta.
    pub fn is_locally_ahead(&self, serial: &str) -> bool {
        self.locally_ahead.contains(serial)
    }

    pub(super) fn locally_ahead_set(&self) -> &HashSet<String> {
        &self.locally_ahead
    }

    pub fn built_at(&self) -> i64 {
        self.built_at
    }
}
