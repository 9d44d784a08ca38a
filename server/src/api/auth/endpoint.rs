//! Endpoint-level authorization: path template + method class -> authorities

use axum::http::Method;

use super::error::{AuthError, AuthenticationError, AuthorizationError};
use crate::core::config::{EndpointPolicyConfig, EndpointsConfig, TenantOverrides};
use crate::core::constants::{ROLE_ORGANIZATION_USER, ROLE_ORGANIZATION_VIEWER};
use crate::domain::Principal;

/// GET/HEAD read; everything else except OPTIONS writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Read,
    Write,
}

impl MethodClass {
    pub fn of(method: &Method) -> Self {
        if method == Method::GET || method == Method::HEAD {
            Self::Read
        } else {
            Self::Write
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `{param}` or `*`: exactly one non-empty segment
    Any,
}

/// Path template such as `/organizations/{organization_id}/workspaces`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

/// Drop trailing slashes, keeping the root
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    normalize(path).split('/').skip(1).filter(|s| !s.is_empty())
}

impl PathTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = segments(template)
            .map(|s| {
                if s == "*" || (s.starts_with('{') && s.ends_with('}')) {
                    Segment::Any
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        if path == "/" {
            return self.segments.is_empty();
        }
        let mut parts = path.split('/').skip(1);
        for segment in &self.segments {
            let Some(part) = parts.next() else {
                return false;
            };
            let ok = match segment {
                Segment::Literal(lit) => lit == part,
                Segment::Any => !part.is_empty(),
            };
            if !ok {
                return false;
            }
        }
        parts.next().is_none()
    }
}

/// One row of the policy table
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    templates: Vec<PathTemplate>,
    readers: Vec<String>,
    writers: Vec<String>,
    tenant_admin_override: Option<String>,
}

impl EndpointPolicy {
    pub fn new<I, S>(paths: I, readers: Vec<String>, writers: Vec<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            templates: paths
                .into_iter()
                .map(|p| PathTemplate::parse(p.as_ref()))
                .collect(),
            readers,
            writers,
            tenant_admin_override: None,
        }
    }

    pub fn with_tenant_admin_override(mut self, authority: impl Into<String>) -> Self {
        self.tenant_admin_override = Some(authority.into());
        self
    }

    fn from_config(config: &EndpointPolicyConfig, overrides: &TenantOverrides) -> Self {
        Self::new(&config.paths, config.readers.clone(), config.writers.clone())
            .with_tenant_admin_override(
                config
                    .tenant_admin_override
                    .clone()
                    .unwrap_or_else(|| overrides.admin.clone()),
            )
    }

    fn matches(&self, path: &str) -> bool {
        self.templates.iter().any(|t| t.matches(path))
    }

    fn authorities(&self, class: MethodClass) -> &[String] {
        match class {
            MethodClass::Read => &self.readers,
            MethodClass::Write => &self.writers,
        }
    }

    /// Platform admin, tenant admin override, or any authority of the class
    fn permits(&self, principal: &Principal, class: MethodClass) -> bool {
        principal.is_platform_admin()
            || self
                .tenant_admin_override
                .as_deref()
                .is_some_and(|a| principal.has_authority(a))
            || principal.has_any_authority(self.authorities(class).iter().map(String::as_str))
    }
}

/// Why a request was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointAccess {
    /// CORS preflight
    Preflight,
    /// Public path, read method
    Public,
    /// Authenticated, no policy covers the path
    Authenticated,
    /// Authenticated and granted by the policy at this table index
    Granted(usize),
}

/// Ordered policy table; the first matching policy wins
#[derive(Debug, Clone)]
pub struct EndpointAuthorizationMatrix {
    public_paths: Vec<PathTemplate>,
    policies: Vec<EndpointPolicy>,
}

impl EndpointAuthorizationMatrix {
    pub fn new<I, S>(public_paths: I, policies: Vec<EndpointPolicy>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            public_paths: public_paths
                .into_iter()
                .map(|p| PathTemplate::parse(p.as_ref()))
                .collect(),
            policies,
        }
    }

    pub fn from_config(config: &EndpointsConfig, overrides: &TenantOverrides) -> Self {
        let policies = match &config.policies {
            Some(policies) => policies
                .iter()
                .map(|p| EndpointPolicy::from_config(p, overrides))
                .collect(),
            None => default_policies(overrides),
        };
        Self::new(&config.public_paths, policies)
    }

    pub fn policies(&self) -> &[EndpointPolicy] {
        &self.policies
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|t| t.matches(path))
    }

    /// Decide whether `principal` may call `method path`
    ///
    /// Public paths only cover read methods; a missing principal on any
    /// other request is an authentication failure.
    pub fn authorize(
        &self,
        method: &Method,
        path: &str,
        principal: Option<&Principal>,
    ) -> Result<EndpointAccess, AuthError> {
        if method == Method::OPTIONS {
            return Ok(EndpointAccess::Preflight);
        }
        let class = MethodClass::of(method);
        if class == MethodClass::Read && self.is_public(path) {
            return Ok(EndpointAccess::Public);
        }
        let principal = principal.ok_or(AuthenticationError::MissingToken)?;

        match self.policies.iter().position(|p| p.matches(path)) {
            None => Ok(EndpointAccess::Authenticated),
            Some(idx) if self.policies[idx].permits(principal, class) => {
                Ok(EndpointAccess::Granted(idx))
            }
            Some(_) => Err(AuthorizationError::EndpointForbidden.into()),
        }
    }
}

/// Policy table used when configuration provides none
fn default_policies(overrides: &TenantOverrides) -> Vec<EndpointPolicy> {
    let readers = vec![
        ROLE_ORGANIZATION_USER.to_string(),
        ROLE_ORGANIZATION_VIEWER.to_string(),
        overrides.user.clone(),
        overrides.viewer.clone(),
    ];
    let writers = vec![ROLE_ORGANIZATION_USER.to_string(), overrides.user.clone()];

    let resource_routes: [&[&str]; 4] = [
        &["/organizations", "/organizations/*"],
        &[
            "/organizations/{organization_id}/workspaces",
            "/organizations/{organization_id}/workspaces/*",
        ],
        &[
            "/organizations/{organization_id}/datasets",
            "/organizations/{organization_id}/datasets/*",
        ],
        &[
            "/organizations/{organization_id}/workspaces/{workspace_id}/scenarios",
            "/organizations/{organization_id}/workspaces/{workspace_id}/scenarios/*",
        ],
    ];

    let mut policies: Vec<EndpointPolicy> = resource_routes
        .iter()
        .map(|paths| {
            EndpointPolicy::new(paths.iter(), readers.clone(), writers.clone())
                .with_tenant_admin_override(overrides.admin.clone())
        })
        .collect();

    // Resource registry: mutations need writers, decisions are made per resource
    policies.push(
        EndpointPolicy::new(
            [
                "/api/v1/rbac/resources/{resource_id}",
                "/api/v1/rbac/resources/{resource_id}/*",
                "/api/v1/rbac/resources/{resource_id}/*/*",
            ],
            readers.clone(),
            writers,
        )
        .with_tenant_admin_override(overrides.admin.clone()),
    );

    // Decision routes only answer questions, so readers may POST to them
    policies.push(
        EndpointPolicy::new(
            ["/api/v1/rbac", "/api/v1/rbac/*"],
            readers.clone(),
            readers,
        )
        .with_tenant_admin_override(overrides.admin.clone()),
    );
    policies
}
