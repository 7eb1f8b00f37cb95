//! Periodic cache refresh.
//!
//! One long-lived task drives the whole refresh cycle: fetch the delta,
//! apply it, sleep until the next tick. Because there is exactly one task
//! and it awaits each refresh to completion, refreshes never overlap; a
//! tick that fires while a refresh is still running is skipped.
//!
//! On store outage the loop switches to exponential backoff (capped) and
//! flips the degraded flag once failures pass a threshold. The cache keeps
//! serving its last good snapshot the whole time; stale beats unavailable.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::cache::{DeltaFetcher, OrderCache};
use crate::store::StoreError;

/// Shared refresh health, read by the API layer for staleness indicators.
///
/// `epoch` identifies this process instance; clients that cache the value
/// can detect server restarts.
#[derive(Debug)]
pub struct SyncHealth {
    /// Unix millis of the last successful refresh (0 = never, still warming)
    last_success: AtomicI64,
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
    epoch: uuid::Uuid,
}

impl Default for SyncHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHealth {
    pub fn new() -> Self {
        Self {
            last_success: AtomicI64::new(0),
            consecutive_failures: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
            epoch: uuid::Uuid::new_v4(),
        }
    }

    pub fn record_success(&self) {
        self.last_success
            .store(shared::util::now_millis(), Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        if self.degraded.swap(false, Ordering::AcqRel) {
            tracing::info!("store reachable again, refresh recovered");
        }
    }

    pub fn record_failure(&self, threshold: u32) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= threshold && !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::error!(failures, "refresh degraded, serving stale cache");
        }
    }

    /// First successful refresh completed; before that, reads get a
    /// warming-up response instead of an empty order list.
    pub fn is_warm(&self) -> bool {
        self.last_success.load(Ordering::Acquire) > 0
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn last_success_millis(&self) -> i64 {
        self.last_success.load(Ordering::Acquire)
    }

    /// Milliseconds since the last successful refresh; `None` while warming.
    pub fn staleness_millis(&self) -> Option<i64> {
        match self.last_success.load(Ordering::Acquire) {
            0 => None,
            at => Some((shared::util::now_millis() - at).max(0)),
        }
    }

    pub fn epoch(&self) -> uuid::Uuid {
        self.epoch
    }
}

/// The recurring refresh task.
pub struct RefreshScheduler {
    fetcher: DeltaFetcher,
    cache: Arc<OrderCache>,
    health: Arc<SyncHealth>,
    interval: Duration,
    max_backoff: Duration,
    failure_threshold: u32,
    shutdown: CancellationToken,
}

impl RefreshScheduler {
    pub fn new(
        fetcher: DeltaFetcher,
        cache: Arc<OrderCache>,
        health: Arc<SyncHealth>,
        interval: Duration,
        max_backoff: Duration,
        failure_threshold: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            cache,
            health,
            interval,
            max_backoff,
            failure_threshold,
            shutdown,
        }
    }

    /// Main loop: initial full load (watermark starts at zero), then the
    /// fixed interval with backoff on failure. Cancellation can interrupt
    /// an in-flight fetch; a cancelled fetch is dropped before anything is
    /// applied, so the cache never sees a partial refresh.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "refresh scheduler started"
        );

        let mut backoff = self.interval;
        loop {
            let result = tokio::select! {
                res = self.refresh_once() => res,
                _ = self.shutdown.cancelled() => {
                    tracing::info!("refresh scheduler received shutdown signal");
                    return;
                }
            };

            let delay = match result {
                Ok(applied) => {
                    if applied > 0 {
                        tracing::info!(rows = applied, watermark = %self.cache.watermark(), "refresh applied");
                    }
                    backoff = self.interval;
                    self.interval
                }
                Err(e) => {
                    let failures = self.health.failure_count();
                    tracing::warn!(error = %e, failures, retry_in_secs = backoff.as_secs(), "refresh failed");
                    let delay = Self::with_jitter(backoff);
                    backoff = (backoff * 2).min(self.max_backoff);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("refresh scheduler stopped");
                    return;
                }
            }
        }
    }

    /// One full refresh cycle, recording the outcome on the shared health
    /// signal either way. Public so tests and the warm-up path can drive
    /// refreshes directly.
    pub async fn refresh_once(&self) -> Result<usize, StoreError> {
        match self.drain_backlog().await {
            Ok(applied) => {
                self.health.record_success();
                Ok(applied)
            }
            Err(e) => {
                self.health.record_failure(self.failure_threshold);
                Err(e)
            }
        }
    }

    /// Fetch and apply until the store has no more rows past the watermark.
    ///
    /// A single bounded fetch is not enough: the initial load (and any
    /// backlog after an outage) can span several batches, and declaring
    /// success after the first slice would serve a partial order list as if
    /// it were complete. Each applied batch advances the watermark, so the
    /// loop makes progress; a batch shorter than the limit means the store
    /// is drained.
    async fn drain_backlog(&self) -> Result<usize, StoreError> {
        let mut applied = 0usize;
        loop {
            let since = self.cache.watermark();
            let batch = self.fetcher.fetch(since).await?;
            let fetched = batch.rows.len();
            // Watermark and rows advance together in one swap.
            self.cache.apply_delta(batch.rows, batch.watermark);
            applied += fetched;
            if fetched < self.fetcher.batch_limit() {
                return Ok(applied);
            }
        }
    }

    /// Up to 10% random jitter so several instances never sync their retry
    /// storms against a recovering store.
    fn with_jitter(base: Duration) -> Duration {
        let jitter_ms = base.as_millis() as u64 / 10;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}
