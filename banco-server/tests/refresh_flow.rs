//! End-to-end refresh flow over the in-memory store.
//!
//! Walks an order cache through its whole lifecycle: warm-up full load,
//! incremental deltas with tied markers, a write-through edit racing a stale
//! delta, a store outage served from the last good snapshot, and recovery.

use std::sync::Arc;

use banco_server::core::{Config, ServerState};
use banco_server::store::memory::{test_order, MemoryStore};
use banco_server::store::{ChangeRow, OrderRecord};
use rust_decimal::Decimal;
use shared::{CurrentUser, OrderStatus, Role, Watermark};
use tokio_util::sync::CancellationToken;

fn test_state() -> (Arc<MemoryStore>, ServerState) {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        database_url: "memory://".into(),
        http_port: 0,
        work_dir: ".".into(),
        environment: "test".into(),
        refresh_interval_secs: 30,
        refresh_batch_size: 500,
        max_backoff_secs: 300,
        failure_threshold: 3,
        retention_days: 30,
    };
    let state = ServerState::with_store(config, store.clone());
    (store, state)
}

#[tokio::test]
async fn test_full_lifecycle() {
    let (store, state) = test_state();
    let scheduler = state.build_scheduler(CancellationToken::new());
    let cashier = CurrentUser::new("op-1", Role::Cashier);

    // Before the first refresh the cache is empty and reads are gated.
    assert!(state.ensure_warm().is_err());

    // Warm-up: three orders land with tied markers [1, 2, 2].
    store.upsert_at_marker(test_order("S-1", 1), 1);
    store.upsert_at_marker(test_order("S-2", 1), 2);
    store.upsert_at_marker(test_order("S-3", 1), 2);

    let applied = scheduler.refresh_once().await.unwrap();
    assert_eq!(applied, 3);
    assert!(state.ensure_warm().is_ok());
    assert_eq!(state.cache.watermark(), Watermark(2));
    assert_eq!(state.cache.snapshot().len(), 3);

    // Write-through edit bumps S-2 to revision 2 ahead of the next delta.
    let edited = state
        .mutator
        .edit_line("S-2", 0, Decimal::from(9), &cashier)
        .await
        .unwrap();
    assert_eq!(edited.revision, 2);
    assert!(state.cache.snapshot().is_locally_ahead("S-2"));

    // The next refresh picks the write back up from the store; the cached
    // revision is not regressed and the locally-ahead marker clears.
    scheduler.refresh_once().await.unwrap();
    let s2 = state.cache.get("S-2").unwrap();
    assert_eq!(s2.revision, 2);
    assert!(s2.lines[0].modified);
    assert!(!state.cache.snapshot().is_locally_ahead("S-2"));

    // Outage: refreshes fail and record themselves; the last good snapshot
    // keeps serving.
    let watermark_before = state.cache.watermark();
    store.set_offline(true);
    for _ in 0..3 {
        assert!(scheduler.refresh_once().await.is_err());
    }
    assert!(state.health.is_degraded());
    assert_eq!(state.cache.snapshot().len(), 3);
    assert_eq!(state.cache.watermark(), watermark_before);

    // Mutations fail closed during the outage; nothing reaches the cache.
    let err = state
        .mutator
        .set_status("S-1", OrderStatus::Confirmed, &cashier)
        .await;
    assert!(err.is_err());
    assert_eq!(state.cache.get("S-1").unwrap().status, OrderStatus::Received);

    // Recovery: the degraded flag clears and the delta resumes advancing.
    store.set_offline(false);
    store.upsert(test_order("S-4", 1));
    scheduler.refresh_once().await.unwrap();
    assert!(!state.health.is_degraded());
    assert_eq!(state.cache.snapshot().len(), 4);
    assert!(state.cache.watermark() > watermark_before);
}

#[tokio::test]
async fn test_stale_delta_never_overwrites_newer_write() {
    let (store, state) = test_state();
    let scheduler = state.build_scheduler(CancellationToken::new());
    let cashier = CurrentUser::new("op-1", Role::Cashier);

    store.upsert(test_order("S-1", 1));
    scheduler.refresh_once().await.unwrap();

    // Two write-throughs race the refresh: the cache holds revision 3.
    state.mutator.confirm("S-1", &cashier).await.unwrap();
    state
        .mutator
        .set_status("S-1", OrderStatus::InPreparation, &cashier)
        .await
        .unwrap();
    assert_eq!(state.cache.get("S-1").unwrap().revision, 3);

    // A delta carrying an older revision of the same order is discarded.
    let mut stale = test_order("S-1", 2);
    stale.status = OrderStatus::Confirmed;
    state.cache.apply_delta(
        vec![ChangeRow::Upsert(OrderRecord {
            order: stale,
            marker: 99,
        })],
        Watermark(99),
    );

    let s1 = state.cache.get("S-1").unwrap();
    assert_eq!(s1.revision, 3);
    assert_eq!(s1.status, OrderStatus::InPreparation);
    // The watermark still advances even though the row was discarded.
    assert_eq!(state.cache.watermark(), Watermark(99));
}

#[tokio::test]
async fn test_eviction_flows_through_refresh() {
    let (store, state) = test_state();
    let scheduler = state.build_scheduler(CancellationToken::new());

    store.upsert(test_order("S-1", 1));
    store.upsert(test_order("S-2", 1));
    scheduler.refresh_once().await.unwrap();
    assert_eq!(state.cache.snapshot().len(), 2);

    store.evict("S-1");
    scheduler.refresh_once().await.unwrap();
    assert!(state.cache.get("S-1").is_none());
    assert!(state.cache.get("S-2").is_some());
}

#[tokio::test]
async fn test_backlog_beyond_batch_limit_loads_fully_before_warm() {
    let (store, base) = test_state();
    // Batch limit smaller than the backlog.
    let mut config = base.config.clone();
    config.refresh_batch_size = 2;
    let state = ServerState::with_store(config, store.clone());
    let scheduler = state.build_scheduler(CancellationToken::new());

    for i in 0..5 {
        store.upsert(test_order(&format!("S-{}", i), 1));
    }

    // The initial load drains every slice before reads open up; the cache
    // is never warm and partial at the same time.
    assert!(state.ensure_warm().is_err());
    scheduler.refresh_once().await.unwrap();
    assert!(state.ensure_warm().is_ok());
    assert_eq!(state.cache.snapshot().len(), 5);
    assert_eq!(state.cache.watermark(), Watermark(5));
}
