//! Shared domain types for the banco order backend.
//!
//! Kept free of I/O so both the server and any future client tooling can
//! depend on it:
//! - `order`: the order aggregate, line items, status machine, watermark
//! - `user`: resolved user identity and roles (auth itself lives outside)
//! - `util`: time helpers

pub mod order;
pub mod user;
pub mod util;

pub use order::{OrderAggregate, OrderLine, OrderStatus, Watermark};
pub use user::{CurrentUser, Role};
