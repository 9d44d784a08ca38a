//! Signing key sources for bearer-token verification
//!
//! Remote key sets are cached per JWKS URL with a TTL. A token whose `kid`
//! is not in the cached set triggers exactly one refetch, which covers key
//! rotation at the identity provider.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use moka::future::Cache;
use thiserror::Error;

use crate::core::constants::JWKS_CACHE_MAX_ENTRIES;

#[derive(Error, Debug)]
pub enum KeySetError {
    #[error("JWKS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No signing key matches kid {0:?}")]
    KeyNotFound(Option<String>),

    #[error("Unusable JWK: {0}")]
    InvalidJwk(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
enum KeySource {
    Static(Arc<JwkSet>),
    Remote {
        client: reqwest::Client,
        cache: Cache<String, Arc<JwkSet>>,
    },
}

/// Resolves the decoding key for a token
#[derive(Clone)]
pub struct KeySet {
    source: KeySource,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            KeySource::Static(_) => "static",
            KeySource::Remote { .. } => "remote",
        };
        f.debug_struct("KeySet").field("source", &kind).finish()
    }
}

impl KeySet {
    /// Inline key set; the JWKS URL passed to lookups is ignored
    pub fn fixed(jwks: JwkSet) -> Self {
        Self {
            source: KeySource::Static(Arc::new(jwks)),
        }
    }

    /// Key sets fetched over HTTP and cached for `ttl`
    pub fn remote(ttl: Duration, timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let cache = Cache::builder()
            .max_capacity(JWKS_CACHE_MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Ok(Self {
            source: KeySource::Remote { client, cache },
        })
    }

    /// Decoding key for `kid`, fetching or refreshing the key set as needed
    pub async fn decoding_key(
        &self,
        jwks_url: &str,
        kid: Option<&str>,
    ) -> Result<DecodingKey, KeySetError> {
        match &self.source {
            KeySource::Static(jwks) => {
                let jwk = find_jwk(jwks, kid).ok_or_else(|| not_found(kid))?;
                Ok(DecodingKey::from_jwk(jwk)?)
            }
            KeySource::Remote { client, cache } => {
                let jwks = match cache.get(jwks_url).await {
                    Some(jwks) => jwks,
                    None => fetch(client, cache, jwks_url).await?,
                };
                if let Some(jwk) = find_jwk(&jwks, kid) {
                    return Ok(DecodingKey::from_jwk(jwk)?);
                }

                tracing::debug!(jwks_url, kid, "Unknown key id, refreshing JWKS");
                let refreshed = fetch(client, cache, jwks_url).await?;
                let jwk = find_jwk(&refreshed, kid).ok_or_else(|| not_found(kid))?;
                Ok(DecodingKey::from_jwk(jwk)?)
            }
        }
    }
}

async fn fetch(
    client: &reqwest::Client,
    cache: &Cache<String, Arc<JwkSet>>,
    jwks_url: &str,
) -> Result<Arc<JwkSet>, KeySetError> {
    tracing::debug!(jwks_url, "Fetching JWKS");
    let jwks: JwkSet = client
        .get(jwks_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let jwks = Arc::new(jwks);
    cache.insert(jwks_url.to_string(), jwks.clone()).await;
    Ok(jwks)
}

/// Key with a matching `kid`; a token without `kid` only resolves against a
/// single-key set
fn find_jwk<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks
            .keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid)),
        None if jwks.keys.len() == 1 => jwks.keys.first(),
        None => None,
    }
}

fn not_found(kid: Option<&str>) -> KeySetError {
    KeySetError::KeyNotFound(kid.map(str::to_string))
}
