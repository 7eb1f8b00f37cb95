//! Shared server state.
//!
//! One `ServerState` is built at startup and cloned into every handler and
//! background task. The order cache and its health signal are the only
//! shared mutable pieces; everything else is read-only after init.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::{
    DeltaFetcher, OrderCache, RefreshScheduler, SyncHealth, WriteThroughMutator,
};
use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::store::{BackingStore, PostgresStore, StoreError};

#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: Arc<dyn BackingStore>,
    pub cache: Arc<OrderCache>,
    pub health: Arc<SyncHealth>,
    pub mutator: Arc<WriteThroughMutator>,
}

impl ServerState {
    /// Wire up state over an already-built store. Tests hand in a
    /// `MemoryStore` here; production goes through [`Self::initialize`].
    pub fn with_store(config: Config, store: Arc<dyn BackingStore>) -> Self {
        let cache = Arc::new(OrderCache::new());
        let health = Arc::new(SyncHealth::new());
        let mutator = Arc::new(WriteThroughMutator::new(store.clone(), cache.clone()));
        Self {
            config,
            store,
            cache,
            health,
            mutator,
        }
    }

    /// Connect to the backing store and build the state.
    pub async fn initialize(config: &Config) -> Result<Self, StoreError> {
        let store = PostgresStore::connect(&config.database_url, config.retention_days).await?;
        Ok(Self::with_store(config.clone(), Arc::new(store)))
    }

    /// Register the refresh scheduler with the task manager. The first
    /// refresh inside the scheduler is the warm-up full load; until it
    /// succeeds, read endpoints answer 503 warming-up.
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let scheduler = self.build_scheduler(tasks.shutdown_token());
        tasks.spawn("order_refresh", TaskKind::Periodic, scheduler.run());
    }

    pub fn build_scheduler(&self, shutdown: CancellationToken) -> RefreshScheduler {
        RefreshScheduler::new(
            DeltaFetcher::new(self.store.clone(), self.config.refresh_batch_size),
            self.cache.clone(),
            self.health.clone(),
            self.config.refresh_interval(),
            self.config.max_backoff(),
            self.config.failure_threshold,
            shutdown,
        )
    }

    /// Reject reads until the warm-up load has completed.
    pub fn ensure_warm(&self) -> Result<(), crate::utils::AppError> {
        if self.health.is_warm() {
            Ok(())
        } else {
            Err(crate::utils::AppError::WarmingUp)
        }
    }
}
