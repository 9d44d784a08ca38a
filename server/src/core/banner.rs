//! Startup banner

use super::config::{AppConfig, is_all_interfaces};
use super::constants::APP_NAME;

/// Print the startup banner with the listen URL and identity settings
pub fn print_banner(config: &AppConfig, endpoint_policies: usize) {
    // Use localhost for display when binding to all interfaces
    let display_host = if is_all_interfaces(&config.server.host) {
        "localhost"
    } else {
        config.server.host.as_str()
    };
    let identity = &config.identity;
    let keys = match (&identity.static_jwks, &identity.jwks_url) {
        (Some(jwks), _) => format!("inline ({} keys)", jwks.keys.len()),
        (None, Some(url)) => url.clone(),
        (None, None) => "derived from token issuer".to_string(),
    };
    let tenants = if identity.allowed_tenants.is_empty() {
        "\x1b[31mnone\x1b[0m".to_string()
    } else {
        identity.allowed_tenants.join(", ")
    };

    const W: usize = 14;
    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m \x1b[36mhttp://{}:{}\x1b[0m",
        "Listening:", display_host, config.server.port
    );
    println!(
        "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {} {}",
        "Identity:", identity.provider, identity.issuer
    );
    println!("  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}", "Keys:", keys);
    println!("  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}", "Tenants:", tenants);
    println!(
        "  \x1b[90m➜  {:<W$} {} API-key consumers, {} endpoint policies\x1b[0m",
        "Policy:",
        config.api_keys.len(),
        endpoint_policies
    );
    if config.debug {
        println!(
            "  \x1b[90m➜  {:<W$} every authorization decision is logged\x1b[0m",
            "Debug:"
        );
    }
    println!();
}
