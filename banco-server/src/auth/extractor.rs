//! Resolved-user extractor
//!
//! The external auth layer stores a [`CurrentUser`] in the request
//! extensions; handlers declare `AuthUser` to require it.

use axum::extract::FromRequestParts;
use http::request::Parts;
use shared::CurrentUser;

use crate::utils::AppError;

/// Extractor wrapper around the resolved [`CurrentUser`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<CurrentUser>() {
            Some(user) => Ok(AuthUser(user.clone())),
            None => {
                tracing::warn!(uri = %parts.uri, "request without resolved user");
                Err(AppError::Unauthorized)
            }
        }
    }
}
