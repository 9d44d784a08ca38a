use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::ProviderKind;
use super::constants::{
    ENV_ALLOWED_TENANTS, ENV_AUDIENCES, ENV_CONFIG, ENV_DEBUG, ENV_HOST, ENV_IDENTITY_PROVIDER,
    ENV_ISSUER, ENV_PORT,
};

#[derive(Parser)]
#[command(name = "platform-auth")]
#[command(version, about = "Platform API authentication and authorization gate", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Log every authorization decision (allowed ones included)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Identity provider (keycloak or okta)
    #[arg(long, global = true, env = ENV_IDENTITY_PROVIDER, value_parser = parse_provider_kind)]
    pub provider: Option<ProviderKind>,

    /// Accepted token issuer base URL
    #[arg(long, global = true, env = ENV_ISSUER)]
    pub issuer: Option<String>,

    /// Accepted token audiences
    #[arg(long, global = true, env = ENV_AUDIENCES, value_delimiter = ',')]
    pub audiences: Option<Vec<String>>,

    /// Allowed tenants ("*" allows every tenant)
    #[arg(long, global = true, env = ENV_ALLOWED_TENANTS, value_delimiter = ',')]
    pub allowed_tenants: Option<Vec<String>>,
}

/// Parse identity provider from CLI/env string
fn parse_provider_kind(s: &str) -> Result<ProviderKind, String> {
    match s.to_lowercase().as_str() {
        "keycloak" => Ok(ProviderKind::Keycloak),
        "okta" => Ok(ProviderKind::Okta),
        _ => Err(format!(
            "Invalid identity provider '{}'. Valid options: keycloak, okta",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigCommands {
    /// Load and validate the configuration, then print a summary
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub provider: Option<ProviderKind>,
    pub issuer: Option<String>,
    pub audiences: Option<Vec<String>>,
    pub allowed_tenants: Option<Vec<String>>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        debug: cli.debug,
        config: cli.config,
        provider: cli.provider,
        issuer: cli.issuer,
        audiences: cli.audiences,
        allowed_tenants: cli.allowed_tenants,
    };
    (config, cli.command)
}
