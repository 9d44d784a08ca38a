//! Bearer-token validation and claim normalization
//!
//! Tokens from a Keycloak-style or Okta-style provider are verified against
//! the provider's JWKS and turned into a [`Principal`]. The provider is fixed
//! at startup; only the issuer's tenant segment varies per token.

use std::collections::BTreeSet;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::Value;

use super::error::AuthenticationError;
use super::keys::{KeySet, KeySetError};
use crate::core::config::{IdentityConfig, ProviderKind};
use crate::core::constants::{API_KEY_PRINCIPAL_PREFIX, SCOPE_AUTHORITY_PREFIX, TENANT_WILDCARD};
use crate::domain::Principal;
use crate::utils::crypto::peek_jwt_payload;

impl ProviderKind {
    /// JWKS location published by the provider for `issuer`
    pub fn jwks_url(&self, issuer: &str) -> String {
        let issuer = issuer.trim_end_matches('/');
        match self {
            ProviderKind::Keycloak => format!("{issuer}/protocol/openid-connect/certs"),
            ProviderKind::Okta => format!("{issuer}/v1/keys"),
        }
    }

    /// Tenant id carried by the issuer URL
    ///
    /// Keycloak: the realm (`.../realms/{tenant}`). Okta: the authorization
    /// server (`.../oauth2/{tenant}`).
    pub fn tenant_of(&self, issuer: &str) -> Option<String> {
        let marker = match self {
            ProviderKind::Keycloak => "/realms/",
            ProviderKind::Okta => "/oauth2/",
        };
        let (_, rest) = issuer.split_once(marker)?;
        let tenant = rest.split('/').next().unwrap_or_default();
        (!tenant.is_empty()).then(|| tenant.to_string())
    }

    /// Raw scope names granted to the token
    fn scopes(&self, claims: &Value) -> Vec<String> {
        match self {
            ProviderKind::Keycloak => string_or_list(claims.get("scope")),
            ProviderKind::Okta => match claims.get("scp") {
                Some(scp) => string_or_list(Some(scp)),
                None => string_or_list(claims.get("scope")),
            },
        }
    }
}

/// Space-separated string or array of strings
fn string_or_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Roles from `claim`; anything but an array yields no roles
fn roles_from(claims: &Value, claim: &str) -> Vec<String> {
    match claims.get(claim) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(other) => {
            tracing::debug!(claim, kind = %json_kind(other), "Roles claim is not a list, ignoring");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `aud` may be a single string or a list
fn audiences_of(claims: &Value) -> Vec<&str> {
    match claims.get("aud") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthenticationError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthenticationError::ExpiredToken,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey => AuthenticationError::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => AuthenticationError::MissingClaim(claim.clone()),
        ErrorKind::ImmatureSignature => {
            AuthenticationError::MalformedToken("token not yet valid".to_string())
        }
        _ => AuthenticationError::MalformedToken(err.to_string()),
    }
}

/// Validates bearer tokens and builds principals from their claims
#[derive(Debug, Clone)]
pub struct IdentityClaimsExtractor {
    provider: ProviderKind,
    issuer_base: String,
    jwks_url: Option<String>,
    audiences: Vec<String>,
    allowed_tenants: Vec<String>,
    roles_claim: String,
    principal_claim: String,
    mail_claim: String,
    algorithms: Vec<Algorithm>,
    leeway_secs: u64,
    keys: KeySet,
}

impl IdentityClaimsExtractor {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, KeySetError> {
        let keys = match &config.static_jwks {
            Some(jwks) => KeySet::fixed(jwks.clone()),
            None => KeySet::remote(
                Duration::from_secs(config.jwks_ttl_secs),
                Duration::from_secs(config.jwks_timeout_secs),
            )?,
        };
        Ok(Self::with_keys(config, keys))
    }

    pub fn with_keys(config: &IdentityConfig, keys: KeySet) -> Self {
        Self {
            provider: config.provider,
            issuer_base: config.issuer.clone(),
            jwks_url: config.jwks_url.clone(),
            audiences: config.audiences.clone(),
            allowed_tenants: config.allowed_tenants.clone(),
            roles_claim: config.roles_claim.clone(),
            principal_claim: config.principal_claim.clone(),
            mail_claim: config.mail_claim.clone(),
            algorithms: config.algorithms.clone(),
            leeway_secs: config.leeway_secs,
            keys,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Accept only `{issuer_base}{segment}` where the segment is a single
    /// plain path component. The issuer also builds the JWKS URL, so dot
    /// segments, separators and escapes would let the key lookup and the
    /// tenant disagree.
    fn accepts_issuer(&self, issuer: &str) -> bool {
        let Some(segment) = issuer.strip_prefix(&self.issuer_base) else {
            return false;
        };
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.chars().any(|c| {
                matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
            })
    }

    fn tenant_allowed(&self, tenant: Option<&str>) -> bool {
        if self.allowed_tenants.iter().any(|t| t == TENANT_WILDCARD) {
            return true;
        }
        tenant.is_some_and(|tenant| self.allowed_tenants.iter().any(|t| t == tenant))
    }

    /// Verify `token` and produce the caller's principal
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthenticationError> {
        let header = decode_header(token).map_err(map_jwt_error)?;
        if !self.algorithms.contains(&header.alg) {
            tracing::debug!(alg = ?header.alg, "Token algorithm not allowed");
            return Err(AuthenticationError::InvalidSignature);
        }

        // Unverified peek at `iss`, only to pick the key set; everything is
        // re-read from the verified claims below
        let unverified = peek_jwt_payload(token)
            .ok_or_else(|| AuthenticationError::MalformedToken("unreadable payload".to_string()))?;
        let issuer = unverified
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(AuthenticationError::InvalidIssuer)?;
        if !self.accepts_issuer(issuer) {
            tracing::debug!(issuer, "Token issuer not accepted");
            return Err(AuthenticationError::InvalidIssuer);
        }

        let jwks_url = self
            .jwks_url
            .clone()
            .unwrap_or_else(|| self.provider.jwks_url(issuer));
        let key = self
            .keys
            .decoding_key(&jwks_url, header.kid.as_deref())
            .await
            .map_err(|e| match e {
                KeySetError::KeyNotFound(_) => AuthenticationError::InvalidSignature,
                other => {
                    tracing::warn!(jwks_url = %jwks_url, error = %other, "Signing keys unavailable");
                    AuthenticationError::KeysUnavailable
                }
            })?;

        // Audience is checked below so the failure stays distinguishable
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.leeway = self.leeway_secs;
        let claims = decode::<Value>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .filter(|iss| self.accepts_issuer(iss))
            .ok_or(AuthenticationError::InvalidIssuer)?;

        let audiences = audiences_of(&claims);
        if !audiences
            .iter()
            .any(|aud| self.audiences.iter().any(|accepted| accepted == aud))
        {
            tracing::debug!(?audiences, "Token audience not accepted");
            return Err(AuthenticationError::AudienceMismatch);
        }

        let tenant = self.provider.tenant_of(issuer);
        if !self.tenant_allowed(tenant.as_deref()) {
            tracing::debug!(?tenant, "Tenant not allowed");
            return Err(AuthenticationError::TenantNotAllowed);
        }

        let id = claims
            .get(&self.principal_claim)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthenticationError::MissingClaim(self.principal_claim.clone()))?;
        if id.starts_with(API_KEY_PRINCIPAL_PREFIX) {
            tracing::debug!(id, "Bearer principal id uses the API-key namespace");
            return Err(AuthenticationError::MalformedToken(
                "reserved principal id".to_string(),
            ));
        }
        let email = claims
            .get(&self.mail_claim)
            .and_then(Value::as_str)
            .map(str::to_string);

        let authorities: BTreeSet<String> = self
            .provider
            .scopes(&claims)
            .into_iter()
            .map(|scope| format!("{SCOPE_AUTHORITY_PREFIX}{scope}"))
            .chain(roles_from(&claims, &self.roles_claim))
            .collect();

        Ok(Principal::from_bearer(id.to_string(), tenant, email, authorities).with_issuer(issuer))
    }
}
