//! Write-through mutations.
//!
//! Every API-driven mutation follows the same discipline: validate against
//! the cached aggregate, write to the backing store, and only then mirror
//! the store's result into the cache. A store failure leaves the cache
//! untouched; the cache never reflects a write that did not durably succeed.

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::{CurrentUser, OrderAggregate, OrderStatus, Role};
use thiserror::Error;

use crate::store::{BackingStore, OrderChange, StoreError};

use super::OrderCache;

/// Mutation failures, already shaped for the API layer.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Rejected before reaching the store
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order not found: {0}")]
    NotFound(String),

    /// Illegal status transition
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Caller's department binding does not cover this order
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Revision conflict at the store; the caller must re-read and retry
    #[error("order {0} was modified concurrently")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MutationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { serial, .. } => MutationError::Conflict(serial),
            StoreError::NotFound(what) => MutationError::NotFound(what),
            other => MutationError::Store(other),
        }
    }
}

/// Applies API mutations store-first, cache-second.
pub struct WriteThroughMutator {
    store: Arc<dyn BackingStore>,
    cache: Arc<OrderCache>,
}

impl WriteThroughMutator {
    pub fn new(store: Arc<dyn BackingStore>, cache: Arc<OrderCache>) -> Self {
        Self { store, cache }
    }

    /// Change the quantity of one order line.
    pub async fn edit_line(
        &self,
        serial: &str,
        position: u32,
        quantity: Decimal,
        user: &CurrentUser,
    ) -> Result<Arc<OrderAggregate>, MutationError> {
        if quantity <= Decimal::ZERO {
            return Err(MutationError::Validation(
                "quantity must be positive".into(),
            ));
        }

        let current = self.current_aggregate(serial).await?;
        if current.is_terminal() {
            return Err(MutationError::Validation(format!(
                "order {} is {} and cannot be edited",
                serial, current.status
            )));
        }
        let line = current
            .line_at(position)
            .ok_or_else(|| MutationError::NotFound(format!("{} line {}", serial, position)))?;
        if line.removed {
            return Err(MutationError::Validation(format!(
                "line {} of order {} was removed upstream",
                position, serial
            )));
        }

        tracing::info!(serial, position, %quantity, user = %user.user_id, "editing order line");
        self.write_through(
            serial,
            current.revision,
            OrderChange::EditLine { position, quantity },
        )
        .await
    }

    /// Move an order to `target` status.
    pub async fn set_status(
        &self,
        serial: &str,
        target: OrderStatus,
        user: &CurrentUser,
    ) -> Result<Arc<OrderAggregate>, MutationError> {
        let current = self.current_aggregate(serial).await?;
        Self::check_department(user, &current)?;
        if !current.status.can_transition_to(target) {
            return Err(MutationError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        tracing::info!(serial, from = %current.status, to = %target, user = %user.user_id, "changing order status");
        self.write_through(
            serial,
            current.revision,
            OrderChange::SetStatus {
                status: target,
                operator: user.user_id.clone(),
            },
        )
        .await
    }

    /// Cashier confirmation: sets the header flag and moves to `Confirmed`.
    pub async fn confirm(
        &self,
        serial: &str,
        user: &CurrentUser,
    ) -> Result<Arc<OrderAggregate>, MutationError> {
        let current = self.current_aggregate(serial).await?;
        if current.confirmed {
            return Err(MutationError::Validation(format!(
                "order {} is already confirmed",
                serial
            )));
        }
        if !current.status.can_transition_to(OrderStatus::Confirmed) {
            return Err(MutationError::InvalidTransition {
                from: current.status,
                to: OrderStatus::Confirmed,
            });
        }

        tracing::info!(serial, user = %user.user_id, "confirming order");
        self.write_through(
            serial,
            current.revision,
            OrderChange::Confirm {
                operator: user.user_id.clone(),
            },
        )
        .await
    }

    /// Mark one line unavailable during preparation; the UI shows it struck
    /// through rather than silently dropping it.
    pub async fn mark_line_unavailable(
        &self,
        serial: &str,
        position: u32,
        user: &CurrentUser,
    ) -> Result<Arc<OrderAggregate>, MutationError> {
        let current = self.current_aggregate(serial).await?;
        Self::check_department(user, &current)?;
        if current.is_terminal() {
            return Err(MutationError::Validation(format!(
                "order {} is {} and cannot be edited",
                serial, current.status
            )));
        }
        let line = current
            .line_at(position)
            .ok_or_else(|| MutationError::NotFound(format!("{} line {}", serial, position)))?;
        if line.removed {
            return Err(MutationError::Validation(format!(
                "line {} of order {} is already unavailable",
                position, serial
            )));
        }

        tracing::info!(serial, position, user = %user.user_id, "marking order line unavailable");
        self.write_through(
            serial,
            current.revision,
            OrderChange::MarkLineUnavailable { position },
        )
        .await
    }

    /// Pickers bound to a department may only touch that department's
    /// orders. Validated against the loaded aggregate so uncached orders
    /// get the same gate as cached ones.
    fn check_department(user: &CurrentUser, order: &OrderAggregate) -> Result<(), MutationError> {
        if let (Role::Picker, Some(bound)) = (&user.role, &user.department) {
            if order.department.as_deref() != Some(bound.as_str()) {
                return Err(MutationError::Forbidden(format!(
                    "picker {} is bound to department {}",
                    user.user_id, bound
                )));
            }
        }
        Ok(())
    }

    /// The aggregate the mutation validates against: the cached one, or a
    /// direct store read for orders the refresh has not picked up yet.
    async fn current_aggregate(&self, serial: &str) -> Result<Arc<OrderAggregate>, MutationError> {
        if let Some(order) = self.cache.get(serial) {
            return Ok(order);
        }
        match self.store.fetch_one(serial).await? {
            Some(record) => Ok(Arc::new(record.order)),
            None => Err(MutationError::NotFound(serial.to_string())),
        }
    }

    /// Store first; the cache only learns about the change once it is
    /// durable. Any store error propagates with the cache untouched.
    async fn write_through(
        &self,
        serial: &str,
        expected_revision: u64,
        change: OrderChange,
    ) -> Result<Arc<OrderAggregate>, MutationError> {
        let record = self.store.write(serial, expected_revision, change).await?;
        self.cache.apply_write(record);
        self.cache
            .get(serial)
            .ok_or_else(|| MutationError::NotFound(serial.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::store::memory::{test_order, MemoryStore};
    use crate::store::{ChangeRow, OrderRecord};
    use shared::{Role, Watermark};

    fn setup() -> (Arc<MemoryStore>, Arc<OrderCache>, WriteThroughMutator) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(OrderCache::new());
        let mutator = WriteThroughMutator::new(store.clone(), cache.clone());
        (store, cache, mutator)
    }

    fn cashier() -> CurrentUser {
        CurrentUser::new("op-1", Role::Cashier)
    }

    fn seed(store: &MemoryStore, cache: &OrderCache, serial: &str) {
        let marker = store.upsert(test_order(serial, 1));
        let record = OrderRecord {
            order: test_order(serial, 1),
            marker,
        };
        cache.apply_delta(vec![ChangeRow::Upsert(record)], Watermark(marker));
    }

    #[tokio::test]
    async fn test_edit_line_updates_store_then_cache() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");

        let order = mutator
            .edit_line("S-1", 0, Decimal::from(7), &cashier())
            .await
            .unwrap();
        assert_eq!(order.revision, 2);
        assert!(order.lines[0].modified);

        // Store and cache agree.
        let stored = store.fetch_one("S-1").await.unwrap().unwrap();
        assert_eq!(stored.order.revision, 2);
        assert_eq!(cache.get("S-1").unwrap().revision, 2);
        assert!(cache.snapshot().is_locally_ahead("S-1"));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_cache_untouched() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");
        let before = cache.get("S-1").unwrap();

        store.set_offline(true);
        let err = mutator
            .edit_line("S-1", 0, Decimal::from(3), &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Store(StoreError::Unavailable(_))));

        let after = cache.get("S-1").unwrap();
        assert_eq!(after.as_ref(), before.as_ref());
    }

    #[tokio::test]
    async fn test_conflict_surfaced_not_applied() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");

        // An out-of-band writer bumps the store to revision 2 behind our
        // cached revision 1.
        store
            .write(
                "S-1",
                1,
                OrderChange::SetStatus {
                    status: OrderStatus::Confirmed,
                    operator: "other".into(),
                },
            )
            .await
            .unwrap();

        let err = mutator
            .edit_line("S-1", 0, Decimal::from(3), &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Conflict(_)));
        // Cache still holds the revision the next delta will replace.
        assert_eq!(cache.get("S-1").unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected_before_store() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");
        let seq_before = store.current_seq();

        let err = mutator
            .set_status("S-1", OrderStatus::Completed, &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::InvalidTransition { .. }));
        // Nothing reached the store.
        assert_eq!(store.current_seq(), seq_before);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");
        let err = mutator
            .edit_line("S-1", 0, Decimal::ZERO, &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_confirm_sets_flag_and_status() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");

        let order = mutator.confirm("S-1", &cashier()).await.unwrap();
        assert!(order.confirmed);
        assert_eq!(order.status, OrderStatus::Confirmed);

        let again = mutator.confirm("S-1", &cashier()).await.unwrap_err();
        assert!(matches!(again, MutationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_line_unavailable_then_edit_rejected() {
        let (store, cache, mutator) = setup();
        seed(&store, &cache, "S-1");

        let picker = CurrentUser::new("p-1", Role::Picker);
        let order = mutator
            .mark_line_unavailable("S-1", 0, &picker)
            .await
            .unwrap();
        assert!(order.lines[0].removed);
        assert_eq!(order.revision, 2);

        // Marking again is rejected, and so are edits to the struck line.
        let err = mutator
            .mark_line_unavailable("S-1", 0, &picker)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Validation(_)));
        let err = mutator
            .edit_line("S-1", 0, Decimal::from(2), &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_department_binding_covers_uncached_orders() {
        let (store, cache, mutator) = setup();
        // Another department's order, present in the store only.
        let mut order = test_order("S-7", 1);
        order.department = Some("REP07".into());
        order.status = OrderStatus::Confirmed;
        store.upsert(order);
        assert!(cache.get("S-7").is_none());

        let outsider = CurrentUser::new("p-1", Role::Picker).with_department("REP05");
        let err = mutator
            .set_status("S-7", OrderStatus::InPreparation, &outsider)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Forbidden(_)));
        let err = mutator
            .mark_line_unavailable("S-7", 0, &outsider)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Forbidden(_)));

        // The bound department and unbound roles pass.
        let own = CurrentUser::new("p-2", Role::Picker).with_department("REP07");
        let updated = mutator
            .set_status("S-7", OrderStatus::InPreparation, &own)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::InPreparation);
    }

    #[tokio::test]
    async fn test_mutation_on_uncached_order_falls_back_to_store() {
        let (store, cache, mutator) = setup();
        // Present in the store, not yet refreshed into the cache.
        store.upsert(test_order("S-9", 1));
        assert!(cache.get("S-9").is_none());

        let order = mutator.confirm("S-9", &cashier()).await.unwrap();
        assert_eq!(order.revision, 2);
        assert!(cache.get("S-9").is_some());
    }
}
