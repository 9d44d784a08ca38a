//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::api::auth::{AuthPolicy, AuthState, IdentityClaimsExtractor, PolicyHandle};
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, ConfigCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub policy: PolicyHandle,
    pub identity: Arc<IdentityClaimsExtractor>,
    cli: CliConfig,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Config {
                command: ConfigCommands::Check,
            }) => return Self::check_config(cli_config),
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(cli_config)?;
        Self::start_server(app).await
    }

    /// Load configuration and build everything a request needs
    pub fn init(cli: CliConfig) -> Result<Self> {
        let config = AppConfig::load(&cli)?;
        let identity = IdentityClaimsExtractor::from_config(&config.identity)
            .context("Failed to initialize signing key source")?;
        let policy =
            AuthPolicy::from_config(&config).context("Failed to build authorization policy")?;

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            policy: PolicyHandle::new(policy),
            identity: Arc::new(identity),
            cli,
        })
    }

    fn check_config(cli: CliConfig) -> Result<()> {
        let app = Self::init(cli)?;
        println!("Configuration OK");
        banner::print_banner(&app.config, app.policy.current().matrix().policies().len());
        Ok(())
    }

    /// Rebuild the authorization policy from configuration
    ///
    /// The identity provider settings are fixed at startup. On failure the
    /// active policy stays in place.
    pub fn reload(&self) -> Result<()> {
        reload_policy(&self.policy, || AppConfig::load(&self.cli))
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        #[cfg(unix)]
        app.shutdown.register(app.spawn_reload_task()).await;

        banner::print_banner(&app.config, app.policy.current().matrix().policies().len());

        let auth = AuthState {
            policy: app.policy.clone(),
            identity: app.identity.clone(),
        };
        let server = ApiServer::new(app.config.server.clone(), auth, app.shutdown.clone());
        let result = server.start().await;

        app.shutdown.shutdown().await;
        result
    }

    /// Reload the policy on SIGHUP until shutdown
    #[cfg(unix)]
    fn spawn_reload_task(&self) -> tokio::task::JoinHandle<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let policy = self.policy.clone();
        let cli = self.cli.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown_rx.wait_for(|&v| v) => break,
                    received = hangup.recv() => {
                        if received.is_none() {
                            break;
                        }
                        tracing::info!("Received SIGHUP, reloading authorization policy");
                        if let Err(e) = reload_policy(&policy, || AppConfig::load(&cli)) {
                            tracing::error!(error = %e, "Policy reload failed, keeping the active policy");
                        }
                    }
                }
            }
            tracing::debug!("Reload task stopped");
        })
    }
}

fn reload_policy(handle: &PolicyHandle, load: impl FnOnce() -> Result<AppConfig>) -> Result<()> {
    let config = load()?;
    let policy =
        AuthPolicy::from_config(&config).context("Failed to build authorization policy")?;
    handle.replace(policy);
    tracing::info!(
        api_keys = config.api_keys.len(),
        debug = config.debug,
        "Authorization policy reloaded"
    );
    Ok(())
}
