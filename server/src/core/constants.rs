use jsonwebtoken::Algorithm;

// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "PlatformAuth";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "platform_auth_server";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".platform-auth";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "platform-auth.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "PLATFORM_AUTH_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "PLATFORM_AUTH_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "PLATFORM_AUTH_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "PLATFORM_AUTH_LOG";

/// Environment variable for debug mode (logs every authorization decision)
pub const ENV_DEBUG: &str = "PLATFORM_AUTH_DEBUG";

// =============================================================================
// Environment Variables - Identity
// =============================================================================

/// Environment variable for the identity provider variant
pub const ENV_IDENTITY_PROVIDER: &str = "PLATFORM_AUTH_IDENTITY_PROVIDER";

/// Environment variable for the allowed tenant list (comma separated)
pub const ENV_ALLOWED_TENANTS: &str = "PLATFORM_AUTH_ALLOWED_TENANTS";

/// Environment variable for the accepted issuer base
pub const ENV_ISSUER: &str = "PLATFORM_AUTH_ISSUER";

/// Environment variable for the accepted audiences (comma separated)
pub const ENV_AUDIENCES: &str = "PLATFORM_AUTH_AUDIENCES";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 8087;

/// Default request body limit (1MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Graceful shutdown timeout for background tasks
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Identity Defaults
// =============================================================================

/// Claim holding the principal identifier
pub const DEFAULT_PRINCIPAL_CLAIM: &str = "sub";

/// Claim holding the principal e-mail address
pub const DEFAULT_MAIL_CLAIM: &str = "email";

/// Claim holding the array of platform roles
pub const DEFAULT_ROLES_CLAIM: &str = "userRoles";

/// Default signature algorithm accepted from identity providers
pub const DEFAULT_JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// JWKS cache TTL
pub const DEFAULT_JWKS_TTL_SECS: u64 = 300;

/// JWKS fetch timeout
pub const DEFAULT_JWKS_TIMEOUT_SECS: u64 = 5;

/// Allowed clock skew for exp/nbf/iat
pub const DEFAULT_JWT_LEEWAY_SECS: u64 = 60;

/// Maximum number of distinct JWKS URLs kept in the key cache
pub const JWKS_CACHE_MAX_ENTRIES: u64 = 64;

/// Header carrying the API-key secret when a consumer does not name one
pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// Wildcard entry in the allowed tenant list
pub const TENANT_WILDCARD: &str = "*";

/// Prefix applied to authorities derived from the scope claim
pub const SCOPE_AUTHORITY_PREFIX: &str = "SCOPE_";

// =============================================================================
// Authorities
// =============================================================================

/// Platform administrator; satisfies every endpoint and resource check
pub const ROLE_PLATFORM_ADMIN: &str = "Platform.Admin";

/// Organization user (read + write on organization resources)
pub const ROLE_ORGANIZATION_USER: &str = "Organization.User";

/// Organization viewer (read-only on organization resources)
pub const ROLE_ORGANIZATION_VIEWER: &str = "Organization.Viewer";

/// Default tenant admin override authority
pub const DEFAULT_TENANT_ADMIN: &str = "Tenant.Admin";

/// Default tenant user override authority
pub const DEFAULT_TENANT_USER: &str = "Tenant.User";

/// Default tenant viewer override authority
pub const DEFAULT_TENANT_VIEWER: &str = "Tenant.Viewer";

// =============================================================================
// RBAC
// =============================================================================

/// Default admin role name in the role catalog
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Reserved role granting nothing
pub const ROLE_NONE: &str = "none";

pub const PERMISSION_READ: &str = "read";
pub const PERMISSION_READ_SECURITY: &str = "read_security";
pub const PERMISSION_CREATE_CHILDREN: &str = "create_children";
pub const PERMISSION_WRITE: &str = "write";
pub const PERMISSION_WRITE_SECURITY: &str = "write_security";
pub const PERMISSION_DELETE: &str = "delete";

// =============================================================================
// Endpoint Matrix
// =============================================================================

/// Paths readable without authentication
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/",
    "/health",
    "/api/v1/health",
    "/openapi",
    "/openapi.json",
    "/openapi.yaml",
    "/swagger-ui/*",
    "/error",
];

/// Id prefix of API-key principals, reserved so bearer ids cannot collide
pub const API_KEY_PRINCIPAL_PREFIX: &str = "apikey:";

/// Audit log target for authorization decisions
pub const AUDIT_TARGET: &str = "audit";
