//! SSO configuration
//!
//! [`SsoConfig`] is built once at startup (see [`loader`]) and validated
//! before a [`crate::auth::SsoService`] is constructed. It stays immutable
//! for the lifetime of an authenticated session.

pub mod loader;

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::provider::ProviderKind;
use crate::error::{SsoError, SsoResult};

/// Default OIDC scope requested at login
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Default claims namespace for providers that namespace custom claims
pub const DEFAULT_CLAIMS_NAMESPACE: &str = "https://your-app.com";

/// Single-sign-on client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoConfig {
    /// Identity provider variant
    pub provider: ProviderKind,
    /// OAuth client identifier
    pub client_id: String,
    /// Provider domain or issuer; Azure AD tenant; Keycloak realm URL
    pub domain: String,
    /// Callback URI registered with the provider
    pub redirect_uri: String,
    /// Where the provider sends the browser after logout
    pub logout_redirect_uri: String,
    /// API audience (Auth0)
    pub audience: Option<String>,
    /// Space separated scopes
    pub scope: String,
    /// OAuth response type; only `code` is supported
    pub response_type: String,
    /// Send a PKCE challenge with the authorization request
    pub use_pkce: bool,
    /// Refresh this many seconds before the access token expires
    pub refresh_before_expiry_secs: u64,
    /// Maximum session length in seconds, measured from login
    pub session_timeout_secs: u64,
    /// Namespace prefix for custom role/permission claims
    pub custom_claims_namespace: Option<String>,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
    /// Whether SSO is enabled for this deployment
    pub enabled: bool,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            client_id: String::new(),
            domain: String::new(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
            logout_redirect_uri: "http://localhost:3000".to_string(),
            audience: None,
            scope: DEFAULT_SCOPE.to_string(),
            response_type: "code".to_string(),
            use_pkce: true,
            refresh_before_expiry_secs: 300,
            session_timeout_secs: 3600,
            custom_claims_namespace: None,
            http_timeout_secs: 30,
            enabled: false,
        }
    }
}

impl SsoConfig {
    /// Configuration for the built-in mock provider
    #[must_use]
    pub fn mock(redirect_uri: impl Into<String>, logout_redirect_uri: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Mock,
            redirect_uri: redirect_uri.into(),
            logout_redirect_uri: logout_redirect_uri.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Validate the configuration, collecting every problem found
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` listing each problem.
    pub fn validate(&self) -> SsoResult<()> {
        let mut problems = Vec::new();

        if self.provider != ProviderKind::Mock {
            if self.client_id.trim().is_empty() {
                problems.push(format!("client_id is required for provider '{}'", self.provider));
            }
            if self.domain.trim().is_empty() {
                problems.push(format!("domain is required for provider '{}'", self.provider));
            }
        }

        for (field, value) in
            [("redirect_uri", &self.redirect_uri), ("logout_redirect_uri", &self.logout_redirect_uri)]
        {
            if value.trim().is_empty() {
                problems.push(format!("{field} is required"));
            } else if let Err(e) = Url::parse(value) {
                problems.push(format!("{field} is not a valid URL: {e}"));
            }
        }

        if self.response_type != "code" {
            problems.push(format!(
                "response_type must be 'code', got '{}'",
                self.response_type
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SsoError::ConfigInvalid(problems))
        }
    }

    /// Claims namespace, falling back to [`DEFAULT_CLAIMS_NAMESPACE`]
    #[must_use]
    pub fn claims_namespace(&self) -> &str {
        self.custom_claims_namespace.as_deref().unwrap_or(DEFAULT_CLAIMS_NAMESPACE)
    }

    /// Maximum session length
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        seconds(self.session_timeout_secs)
    }

    /// HTTP request timeout
    #[must_use]
    pub const fn http_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.http_timeout_secs)
    }

    /// Refresh timing derived from this configuration
    ///
    /// A session timeout of zero disables the session limit.
    #[must_use]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            refresh_before_expiry: seconds(self.refresh_before_expiry_secs),
            session_timeout: (self.session_timeout_secs > 0).then(|| self.session_timeout()),
            ..RefreshPolicy::default()
        }
    }
}

fn seconds(value: u64) -> Duration {
    i64::try_from(value).ok().and_then(Duration::try_seconds).unwrap_or(Duration::MAX)
}

/// Token refresh and session timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Refresh when this close to expiry
    pub refresh_before_expiry: Duration,
    /// A token is valid only while it has more than this left
    pub validity_margin: Duration,
    /// Delay between failed scheduled refresh attempts
    pub retry_delay: StdDuration,
    /// Retries after the first failed scheduled refresh
    pub max_retries: u32,
    /// Maximum session length counted from sign-in, `None` for no limit
    pub session_timeout: Option<Duration>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            refresh_before_expiry: Duration::seconds(300),
            validity_margin: Duration::seconds(60),
            retry_delay: StdDuration::from_millis(1000),
            max_retries: 3,
            session_timeout: None,
        }
    }
}
