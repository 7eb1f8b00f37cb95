//! Incremental delta fetching.
//!
//! Pulls rows whose change marker is strictly greater than the cache's
//! watermark and computes the successor watermark. The marker is a
//! store-assigned monotonic sequence, so ties only occur between rows
//! written in one transaction; the store contract guarantees a tie-set is
//! never split across batches, which lets the watermark land safely on the
//! highest fetched marker.

use std::sync::Arc;

use shared::Watermark;

use crate::store::{BackingStore, ChangeRow, StoreError};

/// One fetched delta: the rows plus the watermark the cache should advance
/// to once they are applied.
#[derive(Debug)]
pub struct DeltaBatch {
    pub rows: Vec<ChangeRow>,
    pub watermark: Watermark,
}

impl DeltaBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Computes deltas against the backing store.
#[derive(Clone)]
pub struct DeltaFetcher {
    store: Arc<dyn BackingStore>,
    batch_limit: usize,
}

impl DeltaFetcher {
    pub fn new(store: Arc<dyn BackingStore>, batch_limit: usize) -> Self {
        Self { store, batch_limit }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Fetch everything changed since `since`.
    ///
    /// `new_watermark = max(markers, since)`; an empty delta leaves the
    /// watermark untouched rather than resetting it.
    pub async fn fetch(&self, since: Watermark) -> Result<DeltaBatch, StoreError> {
        let rows = self.store.fetch_changed(since, self.batch_limit).await?;
        let watermark = rows
            .iter()
            .fold(since, |w, row| w.advanced_to(row.marker()));
        Ok(DeltaBatch { rows, watermark })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{test_order, MemoryStore};

    #[tokio::test]
    async fn test_empty_delta_keeps_watermark() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = DeltaFetcher::new(store, 100);
        let batch = fetcher.fetch(Watermark(42)).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.watermark, Watermark(42));
    }

    #[tokio::test]
    async fn test_watermark_is_max_marker() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_at_marker(test_order("S-1", 1), 1);
        store.upsert_at_marker(test_order("S-2", 1), 2);
        store.upsert_at_marker(test_order("S-3", 1), 2);

        let fetcher = DeltaFetcher::new(store, 100);
        let batch = fetcher.fetch(Watermark::ZERO).await.unwrap();
        // Marker ties ([1, 2, 2]) all land in one batch.
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(batch.watermark, Watermark(2));
    }

    #[tokio::test]
    async fn test_strictly_greater_filter() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_at_marker(test_order("S-1", 1), 1);
        store.upsert_at_marker(test_order("S-2", 1), 2);

        let fetcher = DeltaFetcher::new(store, 100);
        let batch = fetcher.fetch(Watermark(1)).await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].serial(), "S-2");
    }

    #[tokio::test]
    async fn test_store_outage_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let fetcher = DeltaFetcher::new(store, 100);
        let err = fetcher.fetch(Watermark::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
