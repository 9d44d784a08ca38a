use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use crate::api::auth::api_key::UriPattern;
use crate::domain::rbac::RoleCatalog;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_ADMIN_ROLE, DEFAULT_API_KEY_HEADER, DEFAULT_HOST,
    DEFAULT_JWKS_TIMEOUT_SECS, DEFAULT_JWKS_TTL_SECS, DEFAULT_JWT_ALGORITHM,
    DEFAULT_JWT_LEEWAY_SECS, DEFAULT_MAIL_CLAIM, DEFAULT_PORT, DEFAULT_PRINCIPAL_CLAIM,
    DEFAULT_PUBLIC_PATHS, DEFAULT_ROLES_CLAIM, DEFAULT_TENANT_ADMIN, DEFAULT_TENANT_USER,
    DEFAULT_TENANT_VIEWER, ROLE_NONE,
};

// =============================================================================
// Identity Provider Enum
// =============================================================================

/// Identity provider variant, fixed at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Keycloak,
    Okta,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Keycloak => write!(f, "keycloak"),
            ProviderKind::Okta => write!(f, "okta"),
        }
    }
}

// =============================================================================
// File Config Structs (all fields optional for partial configs)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Tenant-level override authorities
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TenantOverridesFileConfig {
    pub admin: Option<String>,
    pub user: Option<String>,
    pub viewer: Option<String>,
}

/// Identity provider section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IdentityFileConfig {
    pub provider: Option<ProviderKind>,
    pub issuer: Option<String>,
    pub jwks_url: Option<String>,
    pub audiences: Option<Vec<String>>,
    pub allowed_tenants: Option<Vec<String>>,
    pub roles_claim: Option<String>,
    pub principal_claim: Option<String>,
    pub mail_claim: Option<String>,
    pub algorithms: Option<Vec<Algorithm>>,
    pub jwks_ttl_secs: Option<u64>,
    pub jwks_timeout_secs: Option<u64>,
    pub leeway_secs: Option<u64>,
    pub static_jwks: Option<JwkSet>,
    pub tenant_overrides: Option<TenantOverridesFileConfig>,
}

/// Endpoint matrix section; each list replaces the lower layer as a whole
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EndpointsFileConfig {
    pub public_paths: Option<Vec<String>>,
    pub policies: Option<Vec<EndpointPolicyConfig>>,
}

/// Role catalog section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RbacFileConfig {
    pub admin_role: Option<String>,
    pub default_role: Option<String>,
    pub roles: Option<BTreeMap<String, Vec<String>>>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub identity: Option<IdentityFileConfig>,
    pub api_keys: Option<Vec<ApiKeyConsumerConfig>>,
    pub endpoints: Option<EndpointsFileConfig>,
    pub rbac: Option<RbacFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Replace `current` when the overlay carries a value
fn overlay<T>(current: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *current = other;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        // Server
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            overlay(&mut current.host, server.host);
            overlay(&mut current.port, server.port);
        }

        // Identity
        if let Some(identity) = other.identity {
            let current = self
                .identity
                .get_or_insert_with(IdentityFileConfig::default);
            overlay(&mut current.provider, identity.provider);
            overlay(&mut current.issuer, identity.issuer);
            overlay(&mut current.jwks_url, identity.jwks_url);
            overlay(&mut current.audiences, identity.audiences);
            overlay(&mut current.allowed_tenants, identity.allowed_tenants);
            overlay(&mut current.roles_claim, identity.roles_claim);
            overlay(&mut current.principal_claim, identity.principal_claim);
            overlay(&mut current.mail_claim, identity.mail_claim);
            overlay(&mut current.algorithms, identity.algorithms);
            overlay(&mut current.jwks_ttl_secs, identity.jwks_ttl_secs);
            overlay(&mut current.jwks_timeout_secs, identity.jwks_timeout_secs);
            overlay(&mut current.leeway_secs, identity.leeway_secs);
            overlay(&mut current.static_jwks, identity.static_jwks);
            if let Some(overrides) = identity.tenant_overrides {
                let current_overrides = current
                    .tenant_overrides
                    .get_or_insert_with(TenantOverridesFileConfig::default);
                overlay(&mut current_overrides.admin, overrides.admin);
                overlay(&mut current_overrides.user, overrides.user);
                overlay(&mut current_overrides.viewer, overrides.viewer);
            }
        }

        // API keys: the consumer list is replaced, never concatenated
        if other.api_keys.is_some() {
            tracing::trace!("Merging api_keys");
            self.api_keys = other.api_keys;
        }

        // Endpoints
        if let Some(endpoints) = other.endpoints {
            let current = self
                .endpoints
                .get_or_insert_with(EndpointsFileConfig::default);
            overlay(&mut current.public_paths, endpoints.public_paths);
            overlay(&mut current.policies, endpoints.policies);
        }

        // RBAC
        if let Some(rbac) = other.rbac {
            let current = self.rbac.get_or_insert_with(RbacFileConfig::default);
            overlay(&mut current.admin_role, rbac.admin_role);
            overlay(&mut current.default_role, rbac.default_role);
            overlay(&mut current.roles, rbac.roles);
        }

        overlay(&mut self.debug, other.debug);
    }
}

// =============================================================================
// Final Config Structs
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Authorities that grant tenant-wide access on top of the policy table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantOverrides {
    pub admin: String,
    pub user: String,
    pub viewer: String,
}

impl Default for TenantOverrides {
    fn default() -> Self {
        Self {
            admin: DEFAULT_TENANT_ADMIN.to_string(),
            user: DEFAULT_TENANT_USER.to_string(),
            viewer: DEFAULT_TENANT_VIEWER.to_string(),
        }
    }
}

/// Bearer-token validation settings
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub provider: ProviderKind,
    /// Accepted issuer base; token issuers must start with it
    pub issuer: String,
    /// Overrides the JWKS location derived from the token issuer
    pub jwks_url: Option<String>,
    pub audiences: Vec<String>,
    pub allowed_tenants: Vec<String>,
    pub roles_claim: String,
    pub principal_claim: String,
    pub mail_claim: String,
    pub algorithms: Vec<Algorithm>,
    pub jwks_ttl_secs: u64,
    pub jwks_timeout_secs: u64,
    pub leeway_secs: u64,
    /// Inline key set; when present no remote JWKS is fetched
    pub static_jwks: Option<JwkSet>,
    pub tenant_overrides: TenantOverrides,
}

/// One service account allowed to authenticate with a static header secret
#[derive(Clone, Deserialize)]
pub struct ApiKeyConsumerConfig {
    /// Principal id given to callers authenticated by this consumer
    pub name: String,
    #[serde(default = "default_api_key_header")]
    pub header: String,
    pub secret: String,
    /// Empty list allows every path
    #[serde(default)]
    pub secured_uris: Vec<String>,
    pub role: String,
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

// Secrets never reach logs, including trace-level config dumps
impl fmt::Debug for ApiKeyConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyConsumerConfig")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("secret", &"<redacted>")
            .field("secured_uris", &self.secured_uris)
            .field("role", &self.role)
            .finish()
    }
}

/// Policy row: path templates and the authorities allowed per method class
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointPolicyConfig {
    pub paths: Vec<String>,
    #[serde(default)]
    pub readers: Vec<String>,
    #[serde(default)]
    pub writers: Vec<String>,
    /// Falls back to the identity tenant admin override
    #[serde(default)]
    pub tenant_admin_override: Option<String>,
}

/// Endpoint matrix configuration
#[derive(Debug, Clone)]
pub struct EndpointsConfig {
    pub public_paths: Vec<String>,
    /// `None` selects the built-in policy table
    pub policies: Option<Vec<EndpointPolicyConfig>>,
}

/// Role catalog configuration
#[derive(Debug, Clone)]
pub struct RbacConfig {
    pub admin_role: String,
    pub default_role: String,
    /// `None` selects the built-in catalog
    pub roles: Option<BTreeMap<String, Vec<String>>>,
}

impl RbacConfig {
    /// Build the role catalog described by this section
    pub fn catalog(&self) -> RoleCatalog {
        match &self.roles {
            Some(roles) => RoleCatalog::new(roles.clone(), self.admin_role.clone()),
            None => RoleCatalog::default().with_admin_role(self.admin_role.clone()),
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub api_keys: Vec<ApiKeyConsumerConfig>,
    pub endpoints: EndpointsConfig,
    pub rbac: RbacConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.platform-auth/platform-auth.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        Self::load_from(cli, get_profile_config_path().as_deref())
    }

    /// [`AppConfig::load`] with an explicit profile config location
    pub fn load_from(cli: &CliConfig, profile_path: Option<&Path>) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Profile dir - skip if not exists
        if let Some(profile_path) = profile_path
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_home(path);
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Extract file config values with defaults
        let file_server = file_config.server.unwrap_or_default();
        let file_identity = file_config.identity.unwrap_or_default();
        let file_overrides = file_identity.tenant_overrides.unwrap_or_default();
        let file_endpoints = file_config.endpoints.unwrap_or_default();
        let file_rbac = file_config.rbac.unwrap_or_default();

        // 4. Layer configs: defaults -> file config -> CLI/env overrides
        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let defaults = TenantOverrides::default();
        let tenant_overrides = TenantOverrides {
            admin: file_overrides.admin.unwrap_or(defaults.admin),
            user: file_overrides.user.unwrap_or(defaults.user),
            viewer: file_overrides.viewer.unwrap_or(defaults.viewer),
        };

        let identity = IdentityConfig {
            provider: cli.provider.or(file_identity.provider).unwrap_or_default(),
            issuer: cli
                .issuer
                .clone()
                .or(file_identity.issuer)
                .unwrap_or_default(),
            jwks_url: file_identity.jwks_url,
            audiences: cli
                .audiences
                .clone()
                .or(file_identity.audiences)
                .unwrap_or_default(),
            allowed_tenants: cli
                .allowed_tenants
                .clone()
                .or(file_identity.allowed_tenants)
                .unwrap_or_default(),
            roles_claim: file_identity
                .roles_claim
                .unwrap_or_else(|| DEFAULT_ROLES_CLAIM.to_string()),
            principal_claim: file_identity
                .principal_claim
                .unwrap_or_else(|| DEFAULT_PRINCIPAL_CLAIM.to_string()),
            mail_claim: file_identity
                .mail_claim
                .unwrap_or_else(|| DEFAULT_MAIL_CLAIM.to_string()),
            algorithms: file_identity
                .algorithms
                .unwrap_or_else(|| vec![DEFAULT_JWT_ALGORITHM]),
            jwks_ttl_secs: file_identity
                .jwks_ttl_secs
                .unwrap_or(DEFAULT_JWKS_TTL_SECS),
            jwks_timeout_secs: file_identity
                .jwks_timeout_secs
                .unwrap_or(DEFAULT_JWKS_TIMEOUT_SECS),
            leeway_secs: file_identity
                .leeway_secs
                .unwrap_or(DEFAULT_JWT_LEEWAY_SECS),
            static_jwks: file_identity.static_jwks,
            tenant_overrides,
        };

        let endpoints = EndpointsConfig {
            public_paths: file_endpoints.public_paths.unwrap_or_else(|| {
                DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect()
            }),
            policies: file_endpoints.policies,
        };

        let rbac = RbacConfig {
            admin_role: file_rbac
                .admin_role
                .unwrap_or_else(|| DEFAULT_ADMIN_ROLE.to_string()),
            default_role: file_rbac
                .default_role
                .unwrap_or_else(|| ROLE_NONE.to_string()),
            roles: file_rbac.roles,
        };

        let config = Self {
            server,
            identity,
            api_keys: file_config.api_keys.unwrap_or_default(),
            endpoints,
            rbac,
            debug: cli.debug || file_config.debug.unwrap_or(false),
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            provider = %config.identity.provider,
            issuer = %config.identity.issuer,
            api_keys = config.api_keys.len(),
            debug = config.debug,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        // Port 0 would bind an ephemeral port nobody knows about
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        let identity = &self.identity;
        if identity.issuer.trim().is_empty() {
            anyhow::bail!("Configuration error: identity.issuer must not be empty");
        }
        // Token issuers are the base plus exactly one tenant segment
        if !identity.issuer.ends_with('/') {
            anyhow::bail!(
                "Configuration error: identity.issuer must end with '/' (got '{}')",
                identity.issuer
            );
        }
        if identity.audiences.is_empty() {
            anyhow::bail!("Configuration error: identity.audiences must list at least one audience");
        }
        if identity.audiences.iter().any(|a| a.trim().is_empty()) {
            anyhow::bail!("Configuration error: identity.audiences must not contain blank entries");
        }
        if identity.algorithms.is_empty() {
            anyhow::bail!("Configuration error: identity.algorithms must not be empty");
        }
        if identity.roles_claim.is_empty() || identity.principal_claim.is_empty() {
            anyhow::bail!(
                "Configuration error: identity.roles_claim and identity.principal_claim must not be empty"
            );
        }
        if identity.allowed_tenants.is_empty() {
            tracing::warn!(
                "identity.allowed_tenants is empty: every bearer token will be rejected (use \"*\" to allow all tenants)"
            );
        }

        for (i, consumer) in self.api_keys.iter().enumerate() {
            if consumer.name.is_empty() || consumer.header.is_empty() {
                anyhow::bail!(
                    "Configuration error: api_keys[{}] must have a name and a header",
                    i
                );
            }
            if consumer.secret.is_empty() {
                anyhow::bail!(
                    "Configuration error: api_keys[{}] ({}) has an empty secret",
                    i,
                    consumer.name
                );
            }
            for pattern in &consumer.secured_uris {
                UriPattern::parse(pattern).with_context(|| {
                    format!(
                        "Configuration error: api_keys[{}] ({}) has an invalid secured URI pattern '{}'",
                        i, consumer.name, pattern
                    )
                })?;
            }
        }

        if let Some(policies) = &self.endpoints.policies {
            for (i, policy) in policies.iter().enumerate() {
                if policy.paths.is_empty() {
                    anyhow::bail!(
                        "Configuration error: endpoints.policies[{}] must list at least one path",
                        i
                    );
                }
            }
        }

        if self.rbac.admin_role.is_empty() {
            anyhow::bail!("Configuration error: rbac.admin_role must not be empty");
        }
        let catalog = self.rbac.catalog();
        if !catalog.is_known(&self.rbac.default_role) {
            anyhow::bail!(
                "Configuration error: rbac.default_role '{}' is not a catalog role (known: {})",
                self.rbac.default_role,
                catalog.role_names().join(", ")
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.platform-auth/platform-auth.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid_cli() -> CliConfig {
        CliConfig {
            issuer: Some("https://kc.example.com/realms/".to_string()),
            audiences: Some(vec!["platform-api".to_string()]),
            ..Default::default()
        }
    }

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn load_with_file(json: &str) -> Result<AppConfig> {
        let file = write_config(json);
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..valid_cli()
        };
        AppConfig::load_from(&cli, None)
    }

    #[test]
    fn test_provider_kind_serde() {
        let kind: ProviderKind = serde_json::from_str(r#""okta""#).unwrap();
        assert_eq!(kind, ProviderKind::Okta);
        assert_eq!(ProviderKind::Keycloak.to_string(), "keycloak");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 8080 },
            "identity": {
                "provider": "okta",
                "issuer": "https://acme.okta.com/oauth2/",
                "audiences": ["api://platform"],
                "allowed_tenants": ["*"],
                "algorithms": ["RS256", "ES256"],
                "tenant_overrides": { "admin": "Org.Admin" }
            },
            "api_keys": [
                { "name": "scheduler", "secret": "s3cr3t", "role": "Organization.User" }
            ],
            "endpoints": {
                "policies": [
                    { "paths": ["/organizations"], "readers": ["Organization.Viewer"] }
                ]
            },
            "rbac": { "admin_role": "owner", "roles": { "owner": [] } },
            "debug": true
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let identity = config.identity.as_ref().unwrap();
        assert_eq!(identity.provider, Some(ProviderKind::Okta));
        assert_eq!(
            identity.algorithms,
            Some(vec![Algorithm::RS256, Algorithm::ES256])
        );
        assert_eq!(
            identity.tenant_overrides.as_ref().unwrap().admin.as_deref(),
            Some("Org.Admin")
        );
        let keys = config.api_keys.as_ref().unwrap();
        assert_eq!(keys[0].header, DEFAULT_API_KEY_HEADER);
        assert!(keys[0].secured_uris.is_empty());
        let policies = config.endpoints.as_ref().unwrap().policies.as_ref().unwrap();
        assert!(policies[0].writers.is_empty());
        assert!(policies[0].tenant_admin_override.is_none());
        assert_eq!(config.debug, Some(true));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.identity.is_none());
        assert!(config.api_keys.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "debug": false, "idnetity": {} }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let extra = config.extra.as_object().unwrap();
        assert!(extra.contains_key("idnetity"));
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{
                "server": { "host": "base.host", "port": 9000 },
                "identity": {
                    "issuer": "https://base/realms/",
                    "audiences": ["a"],
                    "tenant_overrides": { "admin": "Base.Admin", "user": "Base.User" }
                },
                "api_keys": [
                    { "name": "one", "secret": "x", "role": "r" },
                    { "name": "two", "secret": "y", "role": "r" }
                ]
            }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{
                "server": { "port": 9100 },
                "identity": {
                    "audiences": ["b", "c"],
                    "tenant_overrides": { "user": "Overlay.User" }
                },
                "api_keys": [ { "name": "three", "secret": "z", "role": "r" } ]
            }"#,
        )
        .unwrap();
        base.merge(overlay);

        let server = base.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("base.host"));
        assert_eq!(server.port, Some(9100));

        let identity = base.identity.unwrap();
        assert_eq!(identity.issuer.as_deref(), Some("https://base/realms/"));
        assert_eq!(
            identity.audiences,
            Some(vec!["b".to_string(), "c".to_string()])
        );
        let overrides = identity.tenant_overrides.unwrap();
        assert_eq!(overrides.admin.as_deref(), Some("Base.Admin"));
        assert_eq!(overrides.user.as_deref(), Some("Overlay.User"));

        let keys = base.api_keys.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "three");
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::load_from(&valid_cli(), None).unwrap();

        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.identity.provider, ProviderKind::Keycloak);
        assert_eq!(config.identity.roles_claim, DEFAULT_ROLES_CLAIM);
        assert_eq!(config.identity.principal_claim, "sub");
        assert_eq!(config.identity.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.identity.leeway_secs, 60);
        assert_eq!(config.identity.tenant_overrides, TenantOverrides::default());
        assert!(config.identity.allowed_tenants.is_empty());
        assert!(config.api_keys.is_empty());
        assert_eq!(config.endpoints.public_paths.len(), DEFAULT_PUBLIC_PATHS.len());
        assert!(config.endpoints.policies.is_none());
        assert_eq!(config.rbac.admin_role, "admin");
        assert_eq!(config.rbac.default_role, "none");
        assert!(!config.debug);
    }

    #[test]
    fn test_app_config_cli_override() {
        let file = write_config(
            r#"{
                "server": { "host": "file.host", "port": 9000 },
                "identity": {
                    "provider": "keycloak",
                    "issuer": "https://file/realms/",
                    "allowed_tenants": ["file-tenant"]
                }
            }"#,
        );
        let cli = CliConfig {
            host: Some("cli.host".to_string()),
            port: Some(3000),
            debug: true,
            config: Some(file.path().to_path_buf()),
            provider: Some(ProviderKind::Okta),
            issuer: Some("https://acme.okta.com/oauth2/".to_string()),
            audiences: Some(vec!["api://platform".to_string()]),
            allowed_tenants: Some(vec!["acme".to_string()]),
        };
        let config = AppConfig::load_from(&cli, None).unwrap();

        assert_eq!(config.server.host, "cli.host");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.identity.provider, ProviderKind::Okta);
        assert_eq!(config.identity.issuer, "https://acme.okta.com/oauth2/");
        assert_eq!(config.identity.allowed_tenants, vec!["acme".to_string()]);
        assert!(config.debug);
    }

    #[test]
    fn test_app_config_profile_then_overlay() {
        let profile = write_config(
            r#"{
                "identity": { "allowed_tenants": ["*"], "leeway_secs": 5 },
                "rbac": { "default_role": "viewer" }
            }"#,
        );
        let overlay = write_config(r#"{ "identity": { "leeway_secs": 30 } }"#);
        let cli = CliConfig {
            config: Some(overlay.path().to_path_buf()),
            ..valid_cli()
        };
        let config = AppConfig::load_from(&cli, Some(profile.path())).unwrap();

        assert_eq!(config.identity.allowed_tenants, vec!["*".to_string()]);
        assert_eq!(config.identity.leeway_secs, 30);
        assert_eq!(config.rbac.default_role, "viewer");
    }

    #[test]
    fn test_app_config_missing_config_file() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/platform-auth.json")),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_app_config_validation_issuer_required() {
        let cli = CliConfig {
            issuer: None,
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("identity.issuer"));
    }

    #[test]
    fn test_app_config_validation_audience_required() {
        let cli = CliConfig {
            audiences: Some(vec![]),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("identity.audiences"));
    }

    #[test]
    fn test_app_config_validation_blank_audience() {
        let cli = CliConfig {
            audiences: Some(vec![String::new(), "platform-api".to_string()]),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("blank entries"));
    }

    #[test]
    fn test_app_config_validation_issuer_needs_trailing_slash() {
        let cli = CliConfig {
            issuer: Some("https://kc.example.com".to_string()),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("must end with '/'"));
    }

    #[test]
    fn test_app_config_validation_server_port_zero() {
        let cli = CliConfig {
            port: Some(0),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_app_config_validation_empty_host() {
        let cli = CliConfig {
            host: Some(String::new()),
            ..valid_cli()
        };
        let err = AppConfig::load_from(&cli, None).unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_app_config_validation_bad_api_key_pattern() {
        let err = load_with_file(
            r#"{ "api_keys": [
                { "name": "svc", "secret": "x", "role": "r", "secured_uris": ["/foo/(unclosed"] }
            ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid secured URI pattern"));
    }

    #[test]
    fn test_app_config_validation_empty_api_key_secret() {
        let err = load_with_file(
            r#"{ "api_keys": [ { "name": "svc", "secret": "", "role": "r" } ] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty secret"));
    }

    #[test]
    fn test_app_config_validation_unknown_default_role() {
        let err = load_with_file(r#"{ "rbac": { "default_role": "superuser" } }"#).unwrap_err();
        assert!(err.to_string().contains("rbac.default_role"));

        // Custom catalogs are checked against their own roles
        let config =
            load_with_file(r#"{ "rbac": { "default_role": "reader", "roles": { "reader": ["read"] } } }"#)
                .unwrap();
        assert_eq!(config.rbac.default_role, "reader");
    }

    #[test]
    fn test_app_config_validation_empty_admin_role() {
        let err = load_with_file(r#"{ "rbac": { "admin_role": "" } }"#).unwrap_err();
        assert!(err.to_string().contains("rbac.admin_role"));
    }

    #[test]
    fn test_rbac_catalog_keeps_admin_role() {
        let config = load_with_file(r#"{ "rbac": { "admin_role": "owner" } }"#).unwrap();
        let catalog = config.rbac.catalog();
        assert!(catalog.is_admin_role("owner"));
        assert!(catalog.grants("viewer", "read"));
    }

    #[test]
    fn test_api_key_debug_redacts_secret() {
        let consumer: ApiKeyConsumerConfig =
            serde_json::from_str(r#"{ "name": "svc", "secret": "hunter2", "role": "r" }"#).unwrap();
        let dbg = format!("{:?}", consumer);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("svc"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(
            expand_home(Path::new("/etc/platform-auth.json")),
            PathBuf::from("/etc/platform-auth.json")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(Path::new("~/cfg.json")),
                home.join("cfg.json")
            );
        }
    }
}
