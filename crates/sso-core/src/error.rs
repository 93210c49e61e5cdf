//! Error types for the SSO client
//!
//! Every fallible operation in this crate returns [`SsoResult`]. Variants are
//! grouped by the stage of the login/refresh lifecycle that produced them and
//! carry only what a caller may safely see: HTTP status codes and the OAuth
//! `error`/`error_description` fields, never raw provider response bodies.
//!
//! ## ErrorClassification
//!
//! [`SsoError`] implements [`ErrorClassification`] so the refresh scheduler can
//! decide whether a failure deserves another attempt:
//!
//! | Variant | Retryable | Severity |
//! |---------|-----------|----------|
//! | `InvalidState` / `ExpiredState` | no | Warning |
//! | `TokenExchangeFailed` | no | Error |
//! | `TokenRefreshFailed` (400/401) | no | Error |
//! | `TokenRefreshFailed` (other) | yes | Warning |
//! | `UserInfoFetchFailed` | yes | Warning |
//! | `RevokeFailed` | no | Warning |
//! | `ConfigInvalid` | no | Error |
//! | `Entropy` | no | Critical |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate
pub type SsoResult<T> = Result<T, SsoError>;

/// Errors produced by the SSO client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsoError {
    /// Callback `state` did not match a pending login attempt
    #[error("authentication failed")]
    InvalidState,

    /// Callback arrived after the pending state's TTL elapsed
    #[error("authentication failed")]
    ExpiredState,

    /// PKCE verifier was not found in the persistent store
    #[error("PKCE verifier missing for pending login")]
    PkceVerifierMissing,

    /// Authorization code exchange was rejected or failed in transit
    #[error("token exchange failed{}", describe(.status_code, .provider_message))]
    TokenExchangeFailed {
        /// HTTP status, `None` when the request never completed
        status_code: Option<u16>,
        /// OAuth `error_description` (or `error`) returned by the provider
        provider_message: Option<String>,
    },

    /// Refresh-token grant was rejected or failed in transit
    #[error("token refresh failed{}", describe(.status_code, .provider_message))]
    TokenRefreshFailed {
        /// HTTP status, `None` when the request never completed
        status_code: Option<u16>,
        /// OAuth `error_description` (or `error`) returned by the provider
        provider_message: Option<String>,
    },

    /// User-info endpoint failed or returned an unusable document
    #[error("user info fetch failed{}", describe(.status_code, &None))]
    UserInfoFetchFailed {
        /// HTTP status, `None` when the request never completed
        status_code: Option<u16>,
    },

    /// Token revocation failed (best-effort, never fatal)
    #[error("token revocation failed: {0}")]
    RevokeFailed(String),

    /// Configuration failed validation; one entry per problem
    #[error("invalid SSO configuration: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),

    /// Provider redirected back with an OAuth `error` parameter
    #[error("identity provider returned '{error}'")]
    ProviderError {
        /// OAuth error code, e.g. `access_denied`
        error: String,
        /// Optional `error_description`
        description: Option<String>,
    },

    /// Callback URL was missing required parameters
    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    /// No token record is stored
    #[error("not authenticated")]
    NotAuthenticated,

    /// Token record has no refresh token
    #[error("no refresh token available")]
    NoRefreshToken,

    /// Session outlived the configured session timeout
    #[error("session expired")]
    SessionExpired,

    /// Persistent or ephemeral store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored record or provider document could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// HTTP request could not be completed
    #[error("transport error: {0}")]
    Transport(String),

    /// Operating system random source failed
    #[error("random source unavailable: {0}")]
    Entropy(String),
}

fn describe(status_code: &Option<u16>, provider_message: &Option<String>) -> String {
    match (status_code, provider_message) {
        (Some(status), Some(message)) => format!(" (HTTP {status}): {message}"),
        (Some(status), None) => format!(" (HTTP {status})"),
        (None, Some(message)) => format!(": {message}"),
        (None, None) => String::new(),
    }
}

impl SsoError {
    /// Message safe to show an end user
    ///
    /// State failures collapse into a generic message so the UI never
    /// reveals which check rejected the callback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidState | Self::ExpiredState | Self::PkceVerifierMissing => {
                "Authentication failed. Please sign in again.".to_string()
            }
            Self::ProviderError { description: Some(description), .. } => description.clone(),
            Self::SessionExpired | Self::NotAuthenticated => {
                "Your session has ended. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the provider rejected the grant itself (as opposed to a
    /// transient failure)
    #[must_use]
    pub fn is_grant_rejected(&self) -> bool {
        matches!(
            self,
            Self::TokenRefreshFailed { status_code: Some(400 | 401), .. }
                | Self::TokenExchangeFailed { status_code: Some(400 | 401), .. }
        )
    }
}

impl From<std::io::Error> for SsoError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SsoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rand::Error> for SsoError {
    fn from(err: rand::Error) -> Self {
        Self::Entropy(err.to_string())
    }
}

/// Error classification trait for consistent retry and alerting decisions
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network failures or provider 5xx responses.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `None` when the caller's own retry policy should apply.
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, expected conditions
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// Security or integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for SsoError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::TokenRefreshFailed { .. } => !self.is_grant_rejected(),
            Self::UserInfoFetchFailed { status_code } => {
                !matches!(status_code, Some(400 | 401 | 403 | 404))
            }
            Self::Storage(_) | Self::Transport(_) => true,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotAuthenticated | Self::NoRefreshToken | Self::SessionExpired => {
                ErrorSeverity::Info
            }
            Self::InvalidState
            | Self::ExpiredState
            | Self::PkceVerifierMissing
            | Self::ProviderError { .. }
            | Self::InvalidCallback(_)
            | Self::RevokeFailed(_)
            | Self::Transport(_)
            | Self::UserInfoFetchFailed { .. } => ErrorSeverity::Warning,
            Self::TokenRefreshFailed { .. } if self.is_retryable() => ErrorSeverity::Warning,
            Self::TokenExchangeFailed { .. }
            | Self::TokenRefreshFailed { .. }
            | Self::ConfigInvalid(_)
            | Self::Storage(_)
            | Self::Serialization(_) => ErrorSeverity::Error,
            Self::Entropy(_) => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error display and classification.

    use super::*;

    /// Validates that state failures never reveal which check failed.
    ///
    /// Assertions:
    /// - Confirms `InvalidState` and `ExpiredState` share one display string.
    /// - Confirms the user-facing message is generic.
    #[test]
    fn test_state_errors_are_indistinguishable() {
        assert_eq!(SsoError::InvalidState.to_string(), SsoError::ExpiredState.to_string());
        assert_eq!(SsoError::InvalidState.to_string(), "authentication failed");
        assert_eq!(
            SsoError::ExpiredState.user_message(),
            "Authentication failed. Please sign in again."
        );
    }

    /// Validates display formatting of exchange failures.
    ///
    /// Assertions:
    /// - Confirms status and provider message are both rendered.
    /// - Confirms a transport failure renders without a status.
    #[test]
    fn test_exchange_failure_display() {
        let err = SsoError::TokenExchangeFailed {
            status_code: Some(400),
            provider_message: Some("invalid_grant".to_string()),
        };
        assert_eq!(err.to_string(), "token exchange failed (HTTP 400): invalid_grant");

        let err = SsoError::TokenExchangeFailed { status_code: None, provider_message: None };
        assert_eq!(err.to_string(), "token exchange failed");
    }

    /// Validates refresh retryability rules.
    ///
    /// Assertions:
    /// - Ensures 400 and 401 refresh failures are not retryable.
    /// - Ensures 5xx and transport failures are retryable.
    /// - Ensures exchange failures are never retryable.
    #[test]
    fn test_refresh_retryability() {
        let rejected =
            SsoError::TokenRefreshFailed { status_code: Some(401), provider_message: None };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.severity(), ErrorSeverity::Error);

        let transient =
            SsoError::TokenRefreshFailed { status_code: Some(503), provider_message: None };
        assert!(transient.is_retryable());
        assert_eq!(transient.severity(), ErrorSeverity::Warning);

        let offline = SsoError::TokenRefreshFailed { status_code: None, provider_message: None };
        assert!(offline.is_retryable());

        let exchange =
            SsoError::TokenExchangeFailed { status_code: Some(500), provider_message: None };
        assert!(!exchange.is_retryable());
    }

    /// Validates config error aggregation and severity ordering.
    ///
    /// Assertions:
    /// - Confirms all problems appear in the display string.
    /// - Ensures entropy failures are critical.
    #[test]
    fn test_config_invalid_and_severity() {
        let err = SsoError::ConfigInvalid(vec![
            "client_id is required".to_string(),
            "domain is required".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid SSO configuration: client_id is required; domain is required"
        );
        assert!(SsoError::Entropy("no device".to_string()).is_critical());
        assert!(ErrorSeverity::Critical > ErrorSeverity::Warning);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
