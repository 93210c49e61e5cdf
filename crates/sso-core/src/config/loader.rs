//! Configuration loader
//!
//! Loads [`SsoConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `SSO_PROVIDER` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `SSO_PROVIDER` (required): `auth0`, `okta`, `keycloak`, `azure-ad`,
//!   `google` or `mock`
//! - `SSO_CLIENT_ID`, `SSO_DOMAIN`, `SSO_AUDIENCE`
//! - `SSO_REDIRECT_URI`, `SSO_LOGOUT_REDIRECT_URI`
//! - `SSO_SCOPE`: defaults to `openid profile email`
//! - `SSO_USE_PKCE`: true/false, default true
//! - `SSO_REFRESH_BEFORE_EXPIRY_SECS`, `SSO_SESSION_TIMEOUT_SECS`,
//!   `SSO_HTTP_TIMEOUT_SECS`
//! - `SSO_CUSTOM_CLAIMS_NAMESPACE`
//! - `SSO_ENABLED`: true/false, default false
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./sso.toml` or `./sso.json`
//! 2. `./config/sso.toml` or `./config/sso.json`
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::SsoConfig;
use crate::auth::provider::ProviderKind;
use crate::error::{SsoError, SsoResult};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `SsoError::ConfigInvalid` if configuration cannot be loaded from
/// either source or a value cannot be parsed.
pub fn load() -> SsoResult<SsoConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!(provider = %config.provider, "SSO configuration loaded from environment");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load SSO config from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `SSO_*` environment variables
///
/// Only `SSO_PROVIDER` is required; everything else falls back to
/// [`SsoConfig::default`].
///
/// # Errors
/// Returns `SsoError::ConfigInvalid` if `SSO_PROVIDER` is missing or a value
/// has an invalid format.
pub fn load_from_env() -> SsoResult<SsoConfig> {
    let defaults = SsoConfig::default();

    let provider = ProviderKind::from_str(&env_var("SSO_PROVIDER")?)?;

    Ok(SsoConfig {
        provider,
        client_id: env_opt("SSO_CLIENT_ID").unwrap_or(defaults.client_id),
        domain: env_opt("SSO_DOMAIN").unwrap_or(defaults.domain),
        redirect_uri: env_opt("SSO_REDIRECT_URI").unwrap_or(defaults.redirect_uri),
        logout_redirect_uri: env_opt("SSO_LOGOUT_REDIRECT_URI")
            .unwrap_or(defaults.logout_redirect_uri),
        audience: env_opt("SSO_AUDIENCE"),
        scope: env_opt("SSO_SCOPE").unwrap_or(defaults.scope),
        response_type: defaults.response_type,
        use_pkce: env_bool("SSO_USE_PKCE", defaults.use_pkce),
        refresh_before_expiry_secs: env_u64(
            "SSO_REFRESH_BEFORE_EXPIRY_SECS",
            defaults.refresh_before_expiry_secs,
        )?,
        session_timeout_secs: env_u64("SSO_SESSION_TIMEOUT_SECS", defaults.session_timeout_secs)?,
        custom_claims_namespace: env_opt("SSO_CUSTOM_CLAIMS_NAMESPACE"),
        http_timeout_secs: env_u64("SSO_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
        enabled: env_bool("SSO_ENABLED", defaults.enabled),
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `SsoError::ConfigInvalid` if the file is missing, unreadable, or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> SsoResult<SsoConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(config_error(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            config_error("No SSO config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading SSO configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| config_error(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, choosing the format by extension
fn parse_config(contents: &str, path: &Path) -> SsoResult<SsoConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => {
            toml::from_str(contents).map_err(|e| config_error(format!("Invalid TOML format: {e}")))
        }
        "json" => serde_json::from_str(contents)
            .map_err(|e| config_error(format!("Invalid JSON format: {e}"))),
        _ => Err(config_error(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe standard paths for an SSO config file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["sso.toml", "sso.json", "config/sso.toml", "config/sso.json"];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn config_error(message: impl Into<String>) -> SsoError {
    SsoError::ConfigInvalid(vec![message.into()])
}

/// Get required environment variable
fn env_var(key: &str) -> SsoResult<String> {
    std::env::var(key)
        .map_err(|_| config_error(format!("Missing required environment variable: {key}")))
}

/// Get optional, non-empty environment variable
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> SsoResult<u64> {
    env_opt(key).map_or(Ok(default), |raw| {
        raw.trim().parse::<u64>().map_err(|e| config_error(format!("Invalid {key}: {e}")))
    })
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
