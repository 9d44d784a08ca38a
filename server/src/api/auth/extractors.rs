//! Principal extractor for Axum handlers

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::{AuthError, AuthenticationError};
use crate::domain::Principal;

/// The authenticated caller, placed in extensions by [`super::require_auth`]
///
/// Rejects with 401 when the route is public and no credentials were sent.
#[derive(Debug, Clone)]
pub struct Auth(pub Principal);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Auth)
            .ok_or(AuthenticationError::MissingToken.into())
    }
}
