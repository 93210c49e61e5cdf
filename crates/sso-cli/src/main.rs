//! Command-line driver for the SSO client.
//!
//! Run with: `cargo run -p sso-cli -- <command>`
//!
//! This is a CLI tool for developers, so `println!` and `eprintln!` are
//! intentionally used for user-facing output rather than structured logging.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use sso_core::auth::provider::ProviderProfile;
use sso_core::config::loader;
use sso_core::{SessionStores, SsoConfig, SsoService, TokenChannel};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEMO_REDIRECT_URI: &str = "http://localhost:3000/auth/callback";
const DEMO_LOGOUT_URI: &str = "http://localhost:3000";

/// Level used when `RUST_LOG` is unset or unparsable
const DEFAULT_LOG_LEVEL: &str = "info";

fn log_filter(var: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(EnvFilter::DEFAULT_ENV))
        .with_writer(std::io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) => debug!(error = %e, "No .env file loaded"),
    }

    let command = env::args().nth(1);

    let result = match command.as_deref() {
        Some("demo") => run_demo().await,
        Some("login-url") => run_login_url().await,
        Some("check-config") => run_check_config(),
        Some("help") | None => {
            print_help();
            Ok(())
        }
        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!();
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Command failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("SSO client");
    println!();
    println!("USAGE:");
    println!("    sso-cli <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    demo          Run the full login/refresh/logout flow against the mock provider");
    println!("    login-url     Print the authorization URL for the configured provider");
    println!("    check-config  Validate configuration and print the provider endpoints");
    println!("    help          Show this help message");
    println!();
    println!("Configuration is read from SSO_* environment variables (a .env file is");
    println!("honoured) or from sso.toml / sso.json.");
}

/// Mock provider round trip
async fn run_demo() -> anyhow::Result<()> {
    let config = SsoConfig::mock(DEMO_REDIRECT_URI, DEMO_LOGOUT_URI);
    let service = SsoService::new(config, SessionStores::in_memory(), TokenChannel::new())
        .context("building mock SSO service")?;

    println!("==> Step 1/4: Starting login with {}...", service.provider_name());
    let request = service.login().await?;
    println!("    redirect: {}", request.url);

    println!("==> Step 2/4: Handling callback...");
    let user = service.handle_callback_url(&request.url).await?;
    println!("    signed in as {} <{}>", user.name, user.email);
    println!("    roles: {}", user.roles.iter().cloned().collect::<Vec<_>>().join(", "));

    println!("==> Step 3/4: Refreshing tokens...");
    let tokens = service.refresh_access_token().await?;
    println!("    new token expires at {}", tokens.expires_at);
    anyhow::ensure!(service.validate_session().await?, "session should be valid after refresh");

    println!("==> Step 4/4: Logging out...");
    let logout_url = service.logout().await?;
    println!("    redirect: {logout_url}");
    anyhow::ensure!(!service.is_authenticated().await, "session should be cleared");

    println!("\n==> Mock flow completed");
    Ok(())
}

/// Authorization URL for the configured provider
async fn run_login_url() -> anyhow::Result<()> {
    let config = loader::load().context("loading SSO configuration")?;
    if !config.enabled {
        warn!("SSO is disabled in configuration");
    }

    let service = SsoService::new(config, SessionStores::in_memory(), TokenChannel::new())?;
    let request = service.login().await?;
    println!("{}", request.url);
    Ok(())
}

/// Validate configuration and show the resolved endpoints
fn run_check_config() -> anyhow::Result<()> {
    let config = loader::load().context("loading SSO configuration")?;
    config.validate()?;
    let profile = ProviderProfile::for_config(&config)?;

    println!("provider:   {}", config.provider.display_name());
    println!("enabled:    {}", config.enabled);
    println!("client id:  {}", config.client_id);
    println!("authorize:  {}", profile.endpoints.authorize);
    println!("token:      {}", profile.endpoints.token);
    println!("userinfo:   {}", profile.endpoints.userinfo);
    if let Some(logout) = &profile.endpoints.logout {
        println!("logout:     {logout}");
    }
    if let Some(revoke) = &profile.endpoints.revoke {
        println!("revoke:     {revoke}");
    }
    println!("pkce:       {}", config.use_pkce);
    Ok(())
}
