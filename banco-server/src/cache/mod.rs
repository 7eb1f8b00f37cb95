//! In-memory order cache and incremental refresh engine
//!
//! The cache is a materialized view of the store's order tables, shared by
//! every request handler. One immutable [`CacheSnapshot`] is current at any
//! time; updates build a successor and swap it in by reference, so readers
//! never observe a half-applied batch.
//!
//! Three actors touch it:
//! - request handlers read snapshots through the [`query`] façade
//! - the [`RefreshScheduler`] applies store deltas on a fixed interval
//! - the [`WriteThroughMutator`] mirrors API writes after the store accepts
//!   them
//!
//! Conflicts between the last two resolve on the per-order revision counter:
//! a later revision is never overwritten by an earlier one.

mod cache;
mod delta;
mod mutator;
pub mod query;
mod scheduler;
mod snapshot;

pub use cache::OrderCache;
pub use delta::{DeltaBatch, DeltaFetcher};
pub use mutator::{MutationError, WriteThroughMutator};
pub use query::{OrderFilter, SortKey, MAX_RESULTS};
pub use scheduler::{RefreshScheduler, SyncHealth};
pub use snapshot::CacheSnapshot;
