//! Request identity
//!
//! Authentication itself is an external collaborator: some upstream layer
//! (reverse proxy, session middleware) resolves the caller and attaches a
//! [`shared::CurrentUser`] to the request. This module only extracts that
//! resolved identity and checks role permissions for the engine's own
//! endpoints.

mod extractor;
mod permissions;

pub use extractor::AuthUser;
pub use permissions::{require_edit, require_status_change};
