//! HTTP server startup and shutdown.

use tower_http::trace::TraceLayer;

use crate::api;
use crate::core::{BackgroundTasks, Config, ServerState};

/// The HTTP server plus its background tasks.
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create the server with pre-built state (tests, embedded runs).
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let state = match self.state {
            Some(s) => s,
            None => ServerState::initialize(&self.config).await?,
        };

        // Background tasks first: the refresh scheduler's initial full load
        // is what takes the cache out of the warming-up state.
        let mut tasks = BackgroundTasks::new();
        state.start_background_tasks(&mut tasks);

        let app = api::router()
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("banco server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await?;

        // Cancels the scheduler; an in-flight fetch is dropped unapplied.
        tasks.shutdown().await;
        Ok(())
    }
}
