//! Authentication middleware
//!
//! Runs the per-request pipeline against one policy snapshot: API-key gate,
//! then bearer-token identity, then the endpoint matrix. The resolved
//! [`Principal`] is stored in request extensions for handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::Response;

use super::error::AuthError;
use super::jwt::IdentityClaimsExtractor;
use super::policy::{AuthPolicy, PolicyHandle};
use crate::core::constants::AUDIT_TARGET;
use crate::domain::Principal;

/// State for the authentication middleware
#[derive(Clone)]
pub struct AuthState {
    pub policy: PolicyHandle,
    pub identity: Arc<IdentityClaimsExtractor>,
}

/// Token from an `Authorization: Bearer` header; the scheme is case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn identify(
    state: &AuthState,
    policy: &AuthPolicy,
    headers: &HeaderMap,
    path: &str,
) -> Result<Option<Principal>, AuthError> {
    if let Some(principal) = policy.gate().authenticate(headers, path)? {
        return Ok(Some(principal));
    }
    match bearer_token(headers) {
        Some(token) => Ok(Some(state.identity.authenticate(token).await?)),
        None => Ok(None),
    }
}

/// Middleware that requires an authorized caller for non-public endpoints
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let policy = state.policy.current();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Preflight never carries credentials
    let principal = if method == Method::OPTIONS {
        None
    } else {
        identify(&state, &policy, request.headers(), &path)
            .await
            .inspect_err(|e| {
                tracing::info!(
                    target: AUDIT_TARGET,
                    %method,
                    path = %path,
                    status = e.status().as_u16(),
                    error = %e,
                    "request denied"
                );
            })?
    };

    let caller = principal.as_ref().map(Principal::id).unwrap_or("-");
    match policy.matrix().authorize(&method, &path, principal.as_ref()) {
        Ok(access) if policy.debug() => {
            tracing::info!(target: AUDIT_TARGET, %method, path = %path, caller, ?access, "request allowed");
        }
        Ok(access) => {
            tracing::debug!(target: AUDIT_TARGET, %method, path = %path, caller, ?access, "request allowed");
        }
        Err(e) => {
            tracing::info!(
                target: AUDIT_TARGET,
                %method,
                path = %path,
                caller,
                status = e.status().as_u16(),
                error = %e,
                "request denied"
            );
            return Err(e);
        }
    }

    if let Some(principal) = principal {
        request.extensions_mut().insert(principal);
    }
    Ok(next.run(request).await)
}
