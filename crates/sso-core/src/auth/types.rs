//! SSO data types
//!
//! Token records, user profiles and login-attempt state shared by the
//! provider adapter, token manager and orchestrator.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default `expires_in` when the provider omits it
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Token record persisted by the token manager
///
/// `expires_at` is derived from `expires_in` at the moment the record is
/// stored and is recomputed on every store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoTokens {
    /// Access token for API calls
    pub access_token: String,
    /// OIDC ID token
    pub id_token: Option<String>,
    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Lifetime in seconds as reported by the provider
    pub expires_in: i64,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Granted scopes
    pub scope: Option<String>,
    /// Absolute expiry, stamped on store
    pub expires_at: DateTime<Utc>,
    /// When the authenticated session began; carried across refreshes
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
}

impl SsoTokens {
    /// Build a token record from a provider token response received at `now`
    #[must_use]
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            access_token: response.access_token,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_in,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
            expires_at: expiry(now, expires_in),
            session_started_at: None,
        }
    }

    /// Recompute `expires_at` relative to `now`
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.expires_at = expiry(now, self.expires_in);
    }

    /// True while more than `margin` remains before expiry
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at > now + margin
    }

    /// True once `now` is within `refresh_before_expiry` of expiry and a
    /// refresh token is available
    #[must_use]
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, refresh_before_expiry: Duration) -> bool {
        self.refresh_token.is_some() && now >= self.refresh_due_at(refresh_before_expiry)
    }

    /// Instant at which a refresh should run
    ///
    /// The refresh window is capped at half the token lifetime, so a token
    /// that lives no longer than the window is still used before it is
    /// refreshed.
    #[must_use]
    pub fn refresh_due_at(&self, refresh_before_expiry: Duration) -> DateTime<Utc> {
        refresh_instant(self.expires_at, self.expires_in, refresh_before_expiry)
    }

    /// Seconds until expiry (negative once expired)
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

fn expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `expires_at` minus the refresh window, saturating at the earliest instant
///
/// The window never exceeds half of `expires_in`.
#[must_use]
pub fn refresh_instant(
    expires_at: DateTime<Utc>,
    expires_in: i64,
    refresh_before_expiry: Duration,
) -> DateTime<Utc> {
    let half_life = Duration::try_seconds(expires_in.max(0) / 2).unwrap_or(refresh_before_expiry);
    let window = refresh_before_expiry.min(half_life);
    expires_at.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Debug for SsoTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoTokens")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("session_started_at", &self.session_started_at)
            .finish()
    }
}

/// Token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// OIDC ID token
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Token type
    #[serde(default)]
    pub token_type: Option<String>,
    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error body (RFC 6749 §5.2)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthErrorBody {
    /// Error code
    pub error: String,
    /// Human-readable description
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// The description when present, otherwise the error code
    #[must_use]
    pub fn message(&self) -> String {
        self.error_description.clone().unwrap_or_else(|| self.error.clone())
    }
}

/// Authenticated user profile mapped from a provider's user-info response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SsoUser {
    /// Subject identifier
    pub id: String,
    /// Email address
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub picture: Option<String>,
    /// Role names
    pub roles: BTreeSet<String>,
    /// Permission names
    pub permissions: BTreeSet<String>,
}

impl SsoUser {
    /// Whether the user holds `role`
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the user holds `permission`
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Pending login attempt issued by the state guard
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoState {
    /// Opaque anti-CSRF token echoed back by the provider
    pub state: String,
    /// OIDC nonce sent with the authorization request
    pub nonce: Option<String>,
    /// Where to send the user once login completes
    pub return_url: Option<String>,
    /// Issuance time
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for SsoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoState")
            .field("state", &"<redacted>")
            .field("nonce", &self.nonce.as_ref().map(|_| "<redacted>"))
            .field("return_url", &self.return_url)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Result of [`crate::auth::SsoService::login`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// URL to send the browser to
    pub url: Url,
    /// State value the callback must echo
    pub state: String,
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.

    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn tokens(expires_in: i64, refresh: Option<&str>) -> SsoTokens {
        SsoTokens::from_response(
            TokenResponse {
                access_token: "access".to_string(),
                id_token: Some("id".to_string()),
                refresh_token: refresh.map(String::from),
                expires_in: Some(expires_in),
                token_type: None,
                scope: Some("openid".to_string()),
            },
            t0(),
        )
    }

    /// Validates expiry arithmetic for a one-hour token.
    ///
    /// Assertions:
    /// - Ensures the token is valid at T+3000 s and invalid at T+3600 s.
    /// - Ensures refresh is due from T+3300 s with a 300 s margin.
    #[test]
    fn test_expiry_windows() {
        let tokens = tokens(3600, Some("refresh"));
        let margin = Duration::seconds(60);
        let before = Duration::seconds(300);

        assert!(tokens.is_valid_at(t0() + Duration::seconds(3000), margin));
        assert!(!tokens.is_valid_at(t0() + Duration::seconds(3600), margin));
        assert!(!tokens.is_valid_at(t0() + Duration::seconds(3540), margin));

        assert!(!tokens.needs_refresh_at(t0() + Duration::seconds(3299), before));
        assert!(tokens.needs_refresh_at(t0() + Duration::seconds(3300), before));
        assert_eq!(tokens.seconds_until_expiry(t0()), 3600);
    }

    /// Validates the refresh window for tokens shorter than the window.
    ///
    /// Assertions:
    /// - Ensures a 300 s token with a 300 s window is due at half-life.
    /// - Ensures a zero-lifetime token is due at its expiry.
    #[test]
    fn test_short_lifetime_refreshes_at_half_life() {
        let before = Duration::seconds(300);

        let short = tokens(300, Some("refresh"));
        assert_eq!(short.refresh_due_at(before), t0() + Duration::seconds(150));
        assert!(!short.needs_refresh_at(t0() + Duration::seconds(149), before));
        assert!(short.needs_refresh_at(t0() + Duration::seconds(150), before));

        let instant = tokens(0, Some("refresh"));
        assert_eq!(instant.refresh_due_at(before), t0());
    }

    /// Validates refresh is never due without a refresh token.
    ///
    /// Assertions:
    /// - Ensures `needs_refresh_at` is false even after expiry.
    #[test]
    fn test_needs_refresh_requires_refresh_token() {
        let tokens = tokens(3600, None);
        assert!(!tokens.needs_refresh_at(t0() + Duration::seconds(7200), Duration::seconds(300)));
    }

    /// Validates `stamp` recomputes the absolute expiry.
    ///
    /// Assertions:
    /// - Confirms `expires_at` moves with the store time.
    /// - Confirms the token type defaults to Bearer.
    #[test]
    fn test_stamp_recomputes_expiry() {
        let mut tokens = tokens(600, None);
        let later = t0() + Duration::seconds(100);
        tokens.stamp(later);
        assert_eq!(tokens.expires_at, later + Duration::seconds(600));
        assert_eq!(tokens.token_type, "Bearer");
    }

    /// Validates debug output never includes token material.
    ///
    /// Assertions:
    /// - Ensures the access and refresh tokens are redacted.
    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", tokens(60, Some("super-secret-refresh")));
        assert!(!rendered.contains("super-secret-refresh"));
        assert!(!rendered.contains("\"access\""));
        assert!(rendered.contains("<redacted>"));
    }
}
