//! Authentication and authorization failures
//!
//! Every failure maps to a short plain-text response. Authentication
//! failures are 401 with a `WWW-Authenticate: Bearer` challenge; endpoint
//! and API-key refusals are 403.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The caller could not be identified
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token audience not accepted")]
    AudienceMismatch,

    #[error("Tenant not allowed")]
    TenantNotAllowed,

    #[error("Token issuer not accepted")]
    InvalidIssuer,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Signing keys unavailable")]
    KeysUnavailable,

    #[error("Missing claim: {0}")]
    MissingClaim(String),
}

/// The caller was identified but may not perform the operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Access to this endpoint is forbidden")]
    EndpointForbidden,

    #[error("API key mismatch")]
    ApiKeyMismatch,

    #[error("API key not allowed for this URI")]
    ApiKeyUriNotAllowed,
}

/// Failure of any request-time authentication stage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthenticationError {
    fn into_response(self) -> Response {
        // RFC 6750: no error code when the request carried no token at all
        let challenge = match self {
            Self::MissingToken => HeaderValue::from_static("Bearer"),
            _ => HeaderValue::from_static("Bearer error=\"invalid_token\""),
        };
        let mut response = (StatusCode::UNAUTHORIZED, self.to_string()).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge);
        response
    }
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Authentication(e) => e.into_response(),
            Self::Authorization(e) => e.into_response(),
        }
    }
}
