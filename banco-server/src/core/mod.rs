//! Server core: configuration, shared state, background tasks, HTTP server.

mod config;
mod server;
mod state;
mod tasks;

pub use config::Config;
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
