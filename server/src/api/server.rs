//! API server initialization

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::auth::{AuthState, require_auth};
use super::middleware::{self, AllowedOrigins};
use super::routes::{health, me, rbac};
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::core::{ServerConfig, ShutdownService};
use crate::domain::rbac::ResourceSecurityStore;

pub struct ApiServer {
    config: ServerConfig,
    auth: AuthState,
    shutdown: ShutdownService,
}

impl ApiServer {
    pub fn new(config: ServerConfig, auth: AuthState, shutdown: ShutdownService) -> Self {
        Self {
            config,
            auth,
            shutdown,
        }
    }

    /// Serve until shutdown is triggered
    pub async fn start(self) -> Result<()> {
        let Self {
            config,
            auth,
            shutdown,
        } = self;

        let allowed_origins = AllowedOrigins::new(&config.host, config.port);
        let app = router(auth, &allowed_origins);

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
        tracing::info!(addr = %listener.local_addr()?, "Listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;
        Ok(())
    }
}

/// Full application router
///
/// Authentication wraps every route and the 404 fallback, so unknown paths
/// are only reported to authorized callers. The resource registry is decided
/// against whichever policy is active when each request arrives.
pub fn router(auth: AuthState, allowed_origins: &AllowedOrigins) -> Router {
    let policy = auth.policy.current();
    let api_key_headers = policy.gate().headers();

    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/me", get(me::me))
        .nest(
            "/api/v1/rbac",
            rbac::routes(auth.policy.clone(), ResourceSecurityStore::new()),
        )
        .fallback(middleware::handle_404)
        .layer(axum::middleware::from_fn_with_state(auth, require_auth))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors(allowed_origins, &api_key_headers))
}
