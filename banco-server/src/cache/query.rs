//! Read-only query façade over a cache snapshot.
//!
//! Everything here is a pure function of one [`CacheSnapshot`]; the backing
//! store is never touched on a read path. Filters mirror the store's indexed
//! columns (status, assigned operator, department, due date) so a query
//! means the same thing at either layer, and results are capped at the same
//! bound the store itself applies.

use std::sync::Arc;

use serde::Deserialize;
use shared::{OrderAggregate, OrderStatus};

use super::snapshot::CacheSnapshot;

/// Hard cap on list results, matching the backing store's own query cap.
pub const MAX_RESULTS: usize = 500;

/// Sort order for listings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Earliest due date first (orders without one sort last)
    #[default]
    DueDate,
    /// Most recently arrived first
    CreatedAt,
}

/// Filter over the snapshot's indexed fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub operator: Option<String>,
    pub department: Option<String>,
}

impl OrderFilter {
    fn matches(&self, order: &OrderAggregate) -> bool {
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        if let Some(operator) = &self.operator {
            if order.operator.as_deref() != Some(operator.as_str()) {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if order.department.as_deref() != Some(department.as_str()) {
                return false;
            }
        }
        true
    }
}

/// List orders from `snapshot`, filtered, sorted and capped.
///
/// `limit` is clamped to [`MAX_RESULTS`] no matter what the caller asks for.
pub fn list(
    snapshot: &CacheSnapshot,
    filter: &OrderFilter,
    sort: SortKey,
    limit: usize,
) -> Vec<Arc<OrderAggregate>> {
    let mut orders: Vec<Arc<OrderAggregate>> = snapshot
        .orders()
        .filter(|o| filter.matches(o))
        .cloned()
        .collect();

    match sort {
        SortKey::DueDate => {
            // None sorts last; serial breaks ties so the order is stable
            // across identical snapshots.
            orders.sort_by(|a, b| {
                let key_a = (a.due_date.is_none(), a.due_date, a.serial.clone());
                let key_b = (b.due_date.is_none(), b.due_date, b.serial.clone());
                key_a.cmp(&key_b)
            });
        }
        SortKey::CreatedAt => {
            orders.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.serial.cmp(&b.serial))
            });
        }
    }

    orders.truncate(limit.min(MAX_RESULTS));
    orders
}

/// Serials of orders modified within the last `window_millis`, for the UI's
/// cheap change-polling endpoint. Served from the snapshot, never the store.
pub fn changed_since(snapshot: &CacheSnapshot, window_millis: i64) -> Vec<String> {
    let cutoff = shared::util::now_millis() - window_millis;
    let mut serials: Vec<String> = snapshot
        .orders()
        .filter(|o| o.updated_at >= cutoff)
        .map(|o| o.serial.clone())
        .collect();
    serials.sort();
    serials
}
