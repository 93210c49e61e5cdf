//! Mock identity provider
//!
//! [`MockTransport`] answers the mock profile's `/mock/*` endpoints in
//! process, so the full login, refresh and logout flow runs without a
//! network. Failures can be injected to exercise retry paths.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::auth::jwt::encode_unsigned;
use crate::auth::traits::{HttpTransport, TransportResponse};
use crate::clock::Clock;
use crate::error::SsoResult;

/// Prefix of codes the mock provider accepts
pub const MOCK_CODE_PREFIX: &str = "mock_authorization_code_";
/// Subject of the mock user
pub const MOCK_USER_ID: &str = "mock_user_1";

const MOCK_ACCESS_PREFIX: &str = "mock_access_token_";
const MOCK_REFRESH_PREFIX: &str = "mock_refresh_token_";
const MOCK_EXPIRES_IN: i64 = 3600;

/// Authorization code the mock provider will hand back at `millis`
#[must_use]
pub fn authorization_code(millis: i64) -> String {
    format!("{MOCK_CODE_PREFIX}{millis}")
}

/// In-process transport implementing the mock provider
#[derive(Debug)]
pub struct MockTransport {
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    token_lifetime: AtomicI64,
    failing_refreshes: AtomicU32,
    fail_revoke: AtomicBool,
    token_requests: AtomicU32,
    refresh_requests: AtomicU32,
    revoke_requests: AtomicU32,
}

impl MockTransport {
    /// Create a mock provider stamping tokens with `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequence: AtomicU64::new(0),
            token_lifetime: AtomicI64::new(MOCK_EXPIRES_IN),
            failing_refreshes: AtomicU32::new(0),
            fail_revoke: AtomicBool::new(false),
            token_requests: AtomicU32::new(0),
            refresh_requests: AtomicU32::new(0),
            revoke_requests: AtomicU32::new(0),
        }
    }

    /// Issue tokens living `seconds` from now on
    pub fn set_token_lifetime(&self, seconds: i64) {
        self.token_lifetime.store(seconds, Ordering::SeqCst);
    }

    fn lifetime(&self) -> i64 {
        self.token_lifetime.load(Ordering::SeqCst)
    }

    /// Answer the next `count` refresh requests with HTTP 503
    pub fn fail_next_refreshes(&self, count: u32) {
        self.failing_refreshes.store(count, Ordering::SeqCst);
    }

    /// Make revocation requests fail with HTTP 500
    pub fn set_revoke_fails(&self, fails: bool) {
        self.fail_revoke.store(fails, Ordering::SeqCst);
    }

    /// Authorization-code grants served
    #[must_use]
    pub fn token_requests(&self) -> u32 {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// Refresh grants received (including failed ones)
    #[must_use]
    pub fn refresh_requests(&self) -> u32 {
        self.refresh_requests.load(Ordering::SeqCst)
    }

    /// Revocation requests received
    #[must_use]
    pub fn revoke_requests(&self) -> u32 {
        self.revoke_requests.load(Ordering::SeqCst)
    }

    fn stamp(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{}_{seq}", self.clock.millis_since_epoch())
    }

    fn id_token(&self) -> String {
        let iat = self.clock.now().timestamp();
        encode_unsigned(&json!({
            "sub": MOCK_USER_ID,
            "email": "admin@techcorp.com",
            "name": "John Admin",
            "iat": iat,
            "exp": iat.saturating_add(self.lifetime()),
        }))
    }

    fn token(&self, form: &[(&str, String)]) -> TransportResponse {
        match field(form, "grant_type") {
            Some("authorization_code") => {
                let valid = field(form, "code").is_some_and(|c| c.starts_with(MOCK_CODE_PREFIX));
                if !valid {
                    return invalid_grant("Invalid authorization code");
                }
                self.token_requests.fetch_add(1, Ordering::SeqCst);
                let stamp = self.stamp();
                ok(json!({
                    "access_token": format!("{MOCK_ACCESS_PREFIX}{stamp}"),
                    "id_token": self.id_token(),
                    "refresh_token": format!("{MOCK_REFRESH_PREFIX}{stamp}"),
                    "expires_in": self.lifetime(),
                    "token_type": "Bearer",
                    "scope": "openid profile email",
                }))
            }
            Some("refresh_token") => {
                self.refresh_requests.fetch_add(1, Ordering::SeqCst);
                let failing = self
                    .failing_refreshes
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    return TransportResponse::new(
                        503,
                        json!({"error": "temporarily_unavailable"}).to_string(),
                    );
                }
                let valid = field(form, "refresh_token")
                    .is_some_and(|t| t.starts_with(MOCK_REFRESH_PREFIX));
                if !valid {
                    return invalid_grant("Invalid refresh token");
                }
                // Refresh responses omit refresh_token; callers keep the old one.
                ok(json!({
                    "access_token": format!("{MOCK_ACCESS_PREFIX}{}", self.stamp()),
                    "id_token": self.id_token(),
                    "expires_in": self.lifetime(),
                    "token_type": "Bearer",
                }))
            }
            _ => TransportResponse::new(
                400,
                json!({"error": "unsupported_grant_type"}).to_string(),
            ),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> SsoResult<TransportResponse> {
        debug!(path = url.path(), "Mock provider POST");
        let response = if url.path().ends_with("/mock/token") {
            self.token(form)
        } else if url.path().ends_with("/mock/revoke") {
            self.revoke_requests.fetch_add(1, Ordering::SeqCst);
            if self.fail_revoke.load(Ordering::SeqCst) {
                TransportResponse::new(500, "")
            } else {
                TransportResponse::new(200, "")
            }
        } else {
            TransportResponse::new(404, "")
        };
        Ok(response)
    }

    async fn get_bearer(&self, url: &Url, access_token: &str) -> SsoResult<TransportResponse> {
        debug!(path = url.path(), "Mock provider GET");
        if !url.path().ends_with("/mock/userinfo") {
            return Ok(TransportResponse::new(404, ""));
        }
        if !access_token.starts_with(MOCK_ACCESS_PREFIX) {
            return Ok(TransportResponse::new(401, json!({"error": "invalid_token"}).to_string()));
        }
        Ok(ok(json!({
            "sub": MOCK_USER_ID,
            "email": "admin@techcorp.com",
            "given_name": "John",
            "family_name": "Admin",
            "name": "John Admin",
            "picture": "https://placehold.co/100x100?text=JA",
            "roles": ["admin"],
            "permissions": ["read", "write", "delete", "admin"],
        })))
    }
}

fn field<'a>(form: &'a [(&str, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
}

fn ok(body: serde_json::Value) -> TransportResponse {
    TransportResponse::new(200, body.to_string())
}

fn invalid_grant(description: &str) -> TransportResponse {
    TransportResponse::new(
        400,
        json!({"error": "invalid_grant", "error_description": description}).to_string(),
    )
}
