//! API-key gate for service-to-service calls
//!
//! Runs before bearer-token authentication. The first configured consumer
//! whose header is present on the request decides the outcome; requests
//! carrying none of the headers pass through untouched.

use axum::http::{HeaderMap, HeaderName};
use regex::Regex;
use thiserror::Error;

use super::error::AuthorizationError;
use crate::core::config::ApiKeyConsumerConfig;
use crate::domain::Principal;
use crate::utils::crypto::constant_time_eq;

/// Characters that end the literal prefix of a secured URI pattern
const REGEX_METACHARACTERS: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Invalid API-key consumer configuration
#[derive(Error, Debug)]
pub enum ApiKeyConfigError {
    #[error("API key consumer '{consumer}' has an invalid header name '{header}'")]
    InvalidHeader { consumer: String, header: String },

    #[error("API key consumer '{consumer}' has an invalid secured URI pattern '{pattern}': {source}")]
    InvalidPattern {
        consumer: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled secured-URI pattern
///
/// The literal `/` allows every path. Any other pattern is split at its
/// first regex metacharacter: the path must start with the literal prefix
/// and match the whole pattern.
#[derive(Debug, Clone)]
pub enum UriPattern {
    Any,
    Prefixed { prefix: String, regex: Regex },
}

impl UriPattern {
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if pattern == "/" {
            return Ok(Self::Any);
        }
        let prefix = match pattern.find(REGEX_METACHARACTERS) {
            Some(idx) => &pattern[..idx],
            None => pattern,
        };
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self::Prefixed {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefixed { prefix, regex } => path.starts_with(prefix) && regex.is_match(path),
        }
    }
}

#[derive(Debug, Clone)]
struct ApiKeyConsumer {
    name: String,
    header: HeaderName,
    secret: String,
    patterns: Vec<UriPattern>,
    role: String,
}

impl ApiKeyConsumer {
    fn allows(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Ordered list of API-key consumers
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGate {
    consumers: Vec<ApiKeyConsumer>,
}

impl ApiKeyGate {
    pub fn from_config(consumers: &[ApiKeyConsumerConfig]) -> Result<Self, ApiKeyConfigError> {
        let consumers = consumers
            .iter()
            .map(|c| {
                let header = HeaderName::from_bytes(c.header.as_bytes()).map_err(|_| {
                    ApiKeyConfigError::InvalidHeader {
                        consumer: c.name.clone(),
                        header: c.header.clone(),
                    }
                })?;
                let patterns = c
                    .secured_uris
                    .iter()
                    .map(|pattern| {
                        UriPattern::parse(pattern).map_err(|source| {
                            ApiKeyConfigError::InvalidPattern {
                                consumer: c.name.clone(),
                                pattern: pattern.clone(),
                                source,
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ApiKeyConsumer {
                    name: c.name.clone(),
                    header,
                    secret: c.secret.clone(),
                    patterns,
                    role: c.role.clone(),
                })
            })
            .collect::<Result<Vec<_>, ApiKeyConfigError>>()?;
        Ok(Self { consumers })
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Distinct consumer header names
    pub fn headers(&self) -> Vec<HeaderName> {
        let mut headers: Vec<HeaderName> = Vec::new();
        for consumer in &self.consumers {
            if !headers.contains(&consumer.header) {
                headers.push(consumer.header.clone());
            }
        }
        headers
    }

    /// Authenticate a request by its API-key headers
    ///
    /// `Ok(None)` means no consumer header was present and the request
    /// continues to bearer-token authentication.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        path: &str,
    ) -> Result<Option<Principal>, AuthorizationError> {
        let Some((consumer, value)) = self
            .consumers
            .iter()
            .find_map(|c| headers.get(&c.header).map(|v| (c, v)))
        else {
            return Ok(None);
        };

        // Non-UTF-8 values can never equal a configured secret
        let presented = value.to_str().unwrap_or_default();
        if !constant_time_eq(presented, &consumer.secret) {
            tracing::debug!(consumer = %consumer.name, "API key mismatch");
            return Err(AuthorizationError::ApiKeyMismatch);
        }

        if !consumer.allows(path) {
            tracing::debug!(consumer = %consumer.name, path, "API key not allowed for URI");
            return Err(AuthorizationError::ApiKeyUriNotAllowed);
        }

        Ok(Some(Principal::from_api_key(&consumer.name, &consumer.role)))
    }
}
