//! Generic provider adapter
//!
//! Handles the protocol mechanics shared by every provider:
//! - Authorization URL building (state, nonce, PKCE challenge)
//! - Authorization code exchange
//! - Token refresh (carrying the refresh token forward)
//! - User-info fetch and claim mapping
//! - Best-effort revocation and logout redirect building
//!
//! Provider differences come from the [`ProviderProfile`] table.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::mock::authorization_code;
use super::profile::{LogoutStyle, ProviderProfile, RevokeStyle};
use super::ProviderKind;
use crate::auth::jwt;
use crate::auth::pkce::PkceChallenge;
use crate::auth::traits::{HttpTransport, TransportResponse};
use crate::auth::types::{OAuthErrorBody, SsoState, SsoTokens, SsoUser, TokenResponse};
use crate::clock::Clock;
use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};

/// Table-configured OAuth2/OIDC client for one provider
#[derive(Debug, Clone)]
pub struct ProviderAdapter {
    profile: ProviderProfile,
    client_id: String,
    redirect_uri: String,
    logout_redirect_uri: String,
    scope: String,
    response_type: String,
    claims_namespace: String,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl ProviderAdapter {
    /// Create an adapter for the configured provider
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` if the provider endpoints cannot be
    /// built from the configuration.
    pub fn new(
        config: &SsoConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> SsoResult<Self> {
        Ok(Self {
            profile: ProviderProfile::for_config(config)?,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            logout_redirect_uri: config.logout_redirect_uri.clone(),
            scope: config.scope.clone(),
            response_type: config.response_type.clone(),
            claims_namespace: config.claims_namespace().to_string(),
            transport,
            clock,
        })
    }

    /// Provider variant
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.profile.kind
    }

    /// Provider table row
    #[must_use]
    pub const fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Build the URL the browser is sent to for login
    ///
    /// For the mock provider this is the callback URL itself, carrying a
    /// mock authorization code and the issued state.
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` if the resulting URL is malformed.
    pub fn build_authorization_url(
        &self,
        pkce: Option<&PkceChallenge>,
        state: &SsoState,
    ) -> SsoResult<Url> {
        if self.profile.direct_callback {
            let code = authorization_code(self.clock.millis_since_epoch());
            return with_query(
                &self.redirect_uri,
                &[("code", code), ("state", state.state.clone())],
            );
        }

        let mut params = vec![
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("response_type", self.response_type.clone()),
            ("scope", self.scope.clone()),
            ("state", state.state.clone()),
        ];

        if let Some(nonce) = &state.nonce {
            params.push(("nonce", nonce.clone()));
        }

        if let Some(pkce) = pkce {
            params.push(("code_challenge", pkce.challenge.clone()));
            params.push(("code_challenge_method", pkce.method().to_string()));
        }

        params.extend(self.profile.extra_authorize_params.iter().cloned());

        with_query(self.profile.endpoints.authorize.as_str(), &params)
    }

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    /// Returns `SsoError::TokenExchangeFailed` with the HTTP status and the
    /// provider's OAuth error message.
    pub async fn exchange_code(&self, code: &str, verifier: Option<&str>) -> SsoResult<SsoTokens> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.client_id.clone()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
        ];
        if let Some(verifier) = verifier {
            form.push(("code_verifier", verifier.to_string()));
        }
        if self.profile.scope_on_token_request {
            form.push(("scope", self.scope.clone()));
        }

        let response = self
            .transport
            .post_form(&self.profile.endpoints.token, &form)
            .await
            .map_err(|e| {
                warn!(provider = %self.kind(), error = %e, "Token exchange request failed");
                SsoError::TokenExchangeFailed { status_code: None, provider_message: None }
            })?;

        if !response.is_success() {
            let provider_message = oauth_error_message(&response);
            warn!(provider = %self.kind(), status = response.status, "Token exchange rejected");
            return Err(SsoError::TokenExchangeFailed {
                status_code: Some(response.status),
                provider_message,
            });
        }

        let token_response: TokenResponse =
            response.json().map_err(|_| SsoError::TokenExchangeFailed {
                status_code: Some(response.status),
                provider_message: Some("malformed token response".to_string()),
            })?;

        info!(provider = %self.kind(), "Authorization code exchanged");
        Ok(SsoTokens::from_response(token_response, self.clock.now()))
    }

    /// Obtain fresh tokens with a refresh token
    ///
    /// When the provider does not rotate the refresh token, the one passed
    /// in is carried forward.
    ///
    /// # Errors
    /// Returns `SsoError::TokenRefreshFailed` with the HTTP status and the
    /// provider's OAuth error message.
    pub async fn refresh(&self, refresh_token: &str) -> SsoResult<SsoTokens> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.client_id.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if self.profile.scope_on_token_request {
            form.push(("scope", self.scope.clone()));
        }

        let response = self
            .transport
            .post_form(&self.profile.endpoints.token, &form)
            .await
            .map_err(|e| {
                warn!(provider = %self.kind(), error = %e, "Token refresh request failed");
                SsoError::TokenRefreshFailed { status_code: None, provider_message: None }
            })?;

        if !response.is_success() {
            let provider_message = oauth_error_message(&response);
            warn!(provider = %self.kind(), status = response.status, "Token refresh rejected");
            return Err(SsoError::TokenRefreshFailed {
                status_code: Some(response.status),
                provider_message,
            });
        }

        let token_response: TokenResponse =
            response.json().map_err(|_| SsoError::TokenRefreshFailed {
                status_code: Some(response.status),
                provider_message: Some("malformed token response".to_string()),
            })?;

        let mut tokens = SsoTokens::from_response(token_response, self.clock.now());
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }

        debug!(provider = %self.kind(), expires_in = tokens.expires_in, "Tokens refreshed");
        Ok(tokens)
    }

    /// Fetch and map the user profile
    ///
    /// # Errors
    /// Returns `SsoError::UserInfoFetchFailed` if the request fails or the
    /// document has no subject.
    pub async fn fetch_user_info(&self, access_token: &str) -> SsoResult<SsoUser> {
        let response = self
            .transport
            .get_bearer(&self.profile.endpoints.userinfo, access_token)
            .await
            .map_err(|e| {
                warn!(provider = %self.kind(), error = %e, "User info request failed");
                SsoError::UserInfoFetchFailed { status_code: None }
            })?;

        if !response.is_success() {
            warn!(provider = %self.kind(), status = response.status, "User info rejected");
            return Err(SsoError::UserInfoFetchFailed { status_code: Some(response.status) });
        }

        let document: Value = response
            .json()
            .map_err(|_| SsoError::UserInfoFetchFailed { status_code: Some(response.status) })?;

        self.profile.claims.map_user(&document, &self.claims_namespace)
    }

    /// Revoke a token at the provider
    ///
    /// Providers without a revocation endpoint report success.
    ///
    /// # Errors
    /// Returns `SsoError::RevokeFailed`; callers treat it as best-effort.
    pub async fn revoke(&self, token: &str) -> SsoResult<()> {
        let (RevokeStyle::ClientAndToken | RevokeStyle::TokenOnly, Some(endpoint)) =
            (self.profile.revoke_style, self.profile.endpoints.revoke.as_ref())
        else {
            debug!(provider = %self.kind(), "Provider does not support revocation");
            return Ok(());
        };

        let mut form = Vec::with_capacity(2);
        if self.profile.revoke_style == RevokeStyle::ClientAndToken {
            form.push(("client_id", self.client_id.clone()));
        }
        form.push(("token", token.to_string()));

        let response = self
            .transport
            .post_form(endpoint, &form)
            .await
            .map_err(|e| SsoError::RevokeFailed(e.to_string()))?;

        if response.is_success() {
            debug!(provider = %self.kind(), "Token revoked");
            Ok(())
        } else {
            Err(SsoError::RevokeFailed(format!("HTTP {}", response.status)))
        }
    }

    /// Build the post-logout redirect
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` if the resulting URL is malformed.
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> SsoResult<Url> {
        let Some(endpoint) = self.profile.endpoints.logout.as_ref() else {
            return with_query(&self.logout_redirect_uri, &[]);
        };

        let params = match self.profile.logout_style {
            LogoutStyle::Local => return with_query(&self.logout_redirect_uri, &[]),
            LogoutStyle::ReturnTo => vec![
                ("client_id", self.client_id.clone()),
                ("returnTo", self.logout_redirect_uri.clone()),
            ],
            LogoutStyle::PostLogoutRedirect => {
                let mut params = Vec::with_capacity(3);
                if let Some(hint) = id_token_hint {
                    params.push(("id_token_hint", hint.to_string()));
                }
                params.push(("post_logout_redirect_uri", self.logout_redirect_uri.clone()));
                params
            }
            LogoutStyle::RedirectUri => vec![("redirect_uri", self.logout_redirect_uri.clone())],
        };

        with_query(endpoint.as_str(), &params)
    }

    /// Structural JWT check (three segments, `exp` and `iat` claims)
    #[must_use]
    pub fn validate_token_structure(&self, token: &str) -> bool {
        jwt::validate_token_structure(token)
    }
}

/// Append percent-encoded parameters to `base`
fn with_query(base: &str, params: &[(&str, String)]) -> SsoResult<Url> {
    let raw = if params.is_empty() {
        base.to_string()
    } else {
        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}{query_string}")
    };

    Url::parse(&raw).map_err(|e| SsoError::ConfigInvalid(vec![format!("invalid URL: {e}")]))
}

/// The provider's OAuth error description, never the raw body
fn oauth_error_message(response: &TransportResponse) -> Option<String> {
    response.json::<OAuthErrorBody>().ok().map(|body| body.message())
}
