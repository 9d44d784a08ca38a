//! Authenticated caller identity
//!
//! A `Principal` is produced once per request by the API-key gate or the
//! bearer-token extractor and is never mutated afterwards. Downstream code
//! (endpoint matrix, RBAC, business handlers) only reads it.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::constants::{API_KEY_PRINCIPAL_PREFIX, ROLE_PLATFORM_ADMIN};

/// How the principal was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    ApiKey,
    BearerToken,
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSource::ApiKey => write!(f, "api_key"),
            AuthSource::BearerToken => write!(f, "bearer_token"),
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: String,
    tenant: Option<String>,
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    /// Roles and scopes, de-duplicated and ordered
    authorities: BTreeSet<String>,
    source: AuthSource,
}

impl Principal {
    /// Principal authenticated through an API-key consumer
    ///
    /// The id is the consumer name under the `apikey:` namespace.
    pub fn from_api_key(consumer: &str, role: &str) -> Self {
        Self {
            id: format!("{API_KEY_PRINCIPAL_PREFIX}{consumer}"),
            tenant: None,
            email: None,
            issuer: None,
            authorities: BTreeSet::from([role.to_string()]),
            source: AuthSource::ApiKey,
        }
    }

    /// Principal authenticated through a verified bearer token
    pub fn from_bearer(
        id: String,
        tenant: Option<String>,
        email: Option<String>,
        authorities: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id,
            tenant,
            email,
            issuer: None,
            authorities: authorities.into_iter().collect(),
            source: AuthSource::BearerToken,
        }
    }

    /// Record the token issuer the principal was verified against
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn source(&self) -> AuthSource {
        self.source
    }

    pub fn authorities(&self) -> impl Iterator<Item = &str> {
        self.authorities.iter().map(String::as_str)
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// True if any of `candidates` is held by this principal
    pub fn has_any_authority<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> bool {
        candidates.into_iter().any(|a| self.authorities.contains(a))
    }

    /// Holds the reserved platform administrator authority
    pub fn is_platform_admin(&self) -> bool {
        self.has_authority(ROLE_PLATFORM_ADMIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_principal_has_single_authority() {
        let p = Principal::from_api_key("scheduler", "Organization.User");
        assert_eq!(p.id(), "apikey:scheduler");
        assert_eq!(p.source(), AuthSource::ApiKey);
        assert_eq!(p.authorities().collect::<Vec<_>>(), vec!["Organization.User"]);
        assert!(p.tenant().is_none());
    }

    #[test]
    fn test_bearer_principal_dedups_authorities() {
        let p = Principal::from_bearer(
            "alice".to_string(),
            Some("acme".to_string()),
            None,
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );
        assert_eq!(p.authorities().count(), 2);
        assert!(p.has_any_authority(["x", "b"]));
        assert!(!p.is_platform_admin());
        assert!(p.issuer().is_none());

        let p = p.with_issuer("https://kc.example.com/realms/acme");
        assert_eq!(p.issuer(), Some("https://kc.example.com/realms/acme"));
    }

    #[test]
    fn test_platform_admin_detection() {
        let p = Principal::from_api_key("ops", ROLE_PLATFORM_ADMIN);
        assert!(p.is_platform_admin());
    }

    #[test]
    fn test_auth_source_display() {
        assert_eq!(AuthSource::ApiKey.to_string(), "api_key");
        assert_eq!(AuthSource::BearerToken.to_string(), "bearer_token");
    }
}
