//! Server configuration.
//!
//! # Environment variables
//!
//! Every setting can be overridden through the environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | DATABASE_URL | postgres://localhost/banco | Backing store connection string |
//! | HTTP_PORT | 3000 | HTTP API port |
//! | WORK_DIR | /var/lib/banco | Working directory (logs) |
//! | ENVIRONMENT | development | development / staging / production |
//! | REFRESH_INTERVAL_SECS | 30 | Delta refresh interval |
//! | REFRESH_BATCH_SIZE | 500 | Max rows per delta fetch |
//! | MAX_BACKOFF_SECS | 300 | Backoff cap after repeated refresh failures |
//! | FAILURE_THRESHOLD | 5 | Consecutive failures before degraded health |
//! | RETENTION_DAYS | 30 | Archived orders older than this are evicted |
//!
//! # Example
//!
//! ```ignore
//! DATABASE_URL=postgres://pos:pos@db/banco HTTP_PORT=8080 cargo run
//! ```

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store connection string
    pub database_url: String,
    /// HTTP API port
    pub http_port: u16,
    /// Working directory for logs and local files
    pub work_dir: String,
    /// development | staging | production
    pub environment: String,
    /// Delta refresh interval (seconds)
    pub refresh_interval_secs: u64,
    /// Max rows per delta fetch
    pub refresh_batch_size: usize,
    /// Backoff cap (seconds)
    pub max_backoff_secs: u64,
    /// Consecutive refresh failures before the degraded flag flips
    pub failure_threshold: u32,
    /// Retention horizon for archived orders (days)
    pub retention_days: i64,
}

impl Config {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/banco".into()),
            http_port: env_parsed("HTTP_PORT", 3000),
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/banco".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            refresh_interval_secs: env_parsed("REFRESH_INTERVAL_SECS", 30),
            refresh_batch_size: env_parsed("REFRESH_BATCH_SIZE", 500),
            max_backoff_secs: env_parsed("MAX_BACKOFF_SECS", 300),
            failure_threshold: env_parsed("FAILURE_THRESHOLD", 5),
            retention_days: env_parsed("RETENTION_DAYS", 30),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
