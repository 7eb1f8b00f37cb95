//! Banco Server - order cache and refresh engine
//!
//! An in-memory materialized view of the order store, kept current by an
//! incremental delta refresh and served over HTTP. The store stays the
//! single source of truth; this process makes reads fast and keeps serving
//! during store outages.
//!
//! # Module structure
//!
//! ```text
//! banco-server/src/
//! ├── core/          # config, shared state, background tasks, server
//! ├── auth/          # request identity, role permissions
//! ├── cache/         # snapshot cache, delta refresh, write-through
//! ├── store/         # backing store trait, Postgres and in-memory adapters
//! ├── api/           # HTTP routes and handlers
//! └── utils/         # errors, logging
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod core;
pub mod store;
pub mod utils;

pub use cache::{OrderCache, RefreshScheduler, SyncHealth, WriteThroughMutator};
pub use core::{Config, Server, ServerState};
pub use store::BackingStore;
pub use utils::{AppError, AppResponse, AppResult};

pub use utils::logger::init_logger_with_file;

/// Load `.env`, switch into the work directory and bring up logging.
pub fn setup_environment() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    if let Ok(work_dir) = std::env::var("WORK_DIR") {
        std::fs::create_dir_all(&work_dir)?;
        std::env::set_current_dir(&work_dir)?;
    }

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());

    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
    ____
   / __ )____ _____  _________
  / __  / __ `/ __ \/ ___/ __ \
 / /_/ / /_/ / / / / /__/ /_/ /
/_____/\__,_/_/ /_/\___/\____/
    "#
    );
}
