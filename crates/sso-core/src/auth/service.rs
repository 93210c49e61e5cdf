//! High-level SSO service orchestrator
//!
//! Combines the state guard, PKCE helper, provider adapter and token
//! manager into a single per-session service for easy integration.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::callback::CallbackParams;
use super::channel::{Subscription, TokenChannel};
use super::pkce::{self, PkceChallenge};
use super::provider::{MockTransport, ProviderAdapter, ProviderKind};
use super::state::StateGuard;
use super::storage::SessionStores;
use super::token_manager::{RefreshCallback, TokenManager};
use super::traits::HttpTransport;
use super::transport::ReqwestTransport;
use super::types::{AuthorizationRequest, SsoTokens, SsoUser};
use crate::clock::{Clock, SystemClock};
use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};

/// SSO service for one browser/app session
///
/// High-level service that orchestrates:
/// - Authorization redirect with state, nonce and PKCE
/// - Callback validation and code exchange
/// - Token storage and automatic refresh
/// - Session validation and logout
#[derive(Clone)]
pub struct SsoService {
    config: Arc<SsoConfig>,
    adapter: Arc<ProviderAdapter>,
    state_guard: StateGuard,
    stores: SessionStores,
    tokens: TokenManager,
    clock: Arc<dyn Clock>,
    refresh_callback: Arc<Mutex<Option<RefreshCallback>>>,
}

impl SsoService {
    /// Create a service talking to the configured provider
    ///
    /// The mock provider is served in process; every other provider goes
    /// over HTTPS with the configured timeout.
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` listing every configuration problem,
    /// or `SsoError::Transport` if the HTTP client cannot be built.
    pub fn new(config: SsoConfig, stores: SessionStores, channel: TokenChannel) -> SsoResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport: Arc<dyn HttpTransport> = if config.provider == ProviderKind::Mock {
            Arc::new(MockTransport::new(Arc::clone(&clock)))
        } else {
            Arc::new(ReqwestTransport::new(config.http_timeout())?)
        };
        Self::with_transport(config, stores, channel, transport, clock)
    }

    /// Create a service with an explicit transport and clock
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` listing every configuration problem.
    pub fn with_transport(
        config: SsoConfig,
        stores: SessionStores,
        channel: TokenChannel,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> SsoResult<Self> {
        config.validate()?;

        let adapter = Arc::new(ProviderAdapter::new(&config, transport, Arc::clone(&clock))?);
        let state_guard = StateGuard::new(Arc::clone(&stores.ephemeral), Arc::clone(&clock));
        let tokens = TokenManager::new(
            Arc::clone(&adapter),
            Arc::clone(&stores.persistent),
            channel,
            Arc::clone(&clock),
            config.refresh_policy(),
        );

        info!(provider = %config.provider, "SSO service initialized");

        Ok(Self {
            config: Arc::new(config),
            adapter,
            state_guard,
            stores,
            tokens,
            clock,
            refresh_callback: Arc::new(Mutex::new(None)),
        })
    }

    /// Start a login
    ///
    /// Caller is responsible for sending the browser to the returned URL.
    ///
    /// # Errors
    /// Returns `SsoError::Entropy` if state or PKCE generation fails, or a
    /// storage error if the pending attempt cannot be saved.
    pub async fn login(&self) -> SsoResult<AuthorizationRequest> {
        self.login_with_return(None).await
    }

    /// Start a login remembering where to send the user afterwards
    ///
    /// # Errors
    /// Same as [`SsoService::login`].
    pub async fn login_with_return(
        &self,
        return_url: Option<String>,
    ) -> SsoResult<AuthorizationRequest> {
        self.discard_pending_login().await?;
        let state = self.state_guard.issue(return_url).await?;

        let pkce = if self.config.use_pkce {
            let challenge = PkceChallenge::generate()?;
            let store = self.stores.persistent.as_ref();
            pkce::store_verifier(store, &state.state, &challenge).await?;
            Some(challenge)
        } else {
            None
        };

        let url = self.adapter.build_authorization_url(pkce.as_ref(), &state)?;
        info!(provider = %self.config.provider, pkce = pkce.is_some(), "Generated authorization URL");

        Ok(AuthorizationRequest { url, state: state.state })
    }

    /// Complete a login from the provider's redirect
    ///
    /// Tokens are persisted only after the state check, code exchange and
    /// user-info fetch have all succeeded. Failing to arm the refresh timer
    /// afterwards is logged and does not fail the login.
    ///
    /// # Errors
    /// - `SsoError::InvalidState` / `SsoError::ExpiredState` on a bad state
    /// - `SsoError::PkceVerifierMissing` if the verifier was lost
    /// - `SsoError::TokenExchangeFailed` if the provider rejects the code
    /// - `SsoError::UserInfoFetchFailed` if the profile cannot be fetched
    pub async fn handle_callback(&self, code: &str, state: &str) -> SsoResult<SsoUser> {
        // The pending attempt and its verifier are erased whatever the outcome.
        let pending = self.state_guard.take_pending().await?;
        let verifier = match &pending {
            Some(attempt) => {
                pkce::take_verifier(self.stores.persistent.as_ref(), &attempt.state).await?
            }
            None => None,
        };
        let pending = self.state_guard.validate(pending, state)?;

        if self.config.use_pkce && verifier.is_none() {
            warn!("PKCE verifier missing for pending login");
            return Err(SsoError::PkceVerifierMissing);
        }

        let tokens =
            self.adapter.exchange_code(code, verifier.as_ref().map(|v| v.as_str())).await?;
        let user = self.adapter.fetch_user_info(&tokens.access_token).await?;

        self.tokens.store(tokens).await?;
        if let Err(e) = self.tokens.schedule_refresh(Some(self.refresh_dispatcher())).await {
            warn!(error = %e, "Could not arm token refresh after login");
        }

        info!(
            provider = %self.config.provider,
            user_id = %user.id,
            return_url = pending.return_url.as_deref().unwrap_or_default(),
            "SSO login completed"
        );
        Ok(user)
    }

    /// Complete a login from the full redirect URL
    ///
    /// # Errors
    /// `SsoError::ProviderError` / `SsoError::InvalidCallback` for a bad
    /// URL, otherwise the same as [`SsoService::handle_callback`].
    pub async fn handle_callback_url(&self, url: &Url) -> SsoResult<SsoUser> {
        let params = CallbackParams::from_url(url)?;
        self.handle_callback(&params.code, &params.state).await
    }

    /// Profile of the signed-in user, `None` when signed out or unreachable
    pub async fn get_current_user(&self) -> Option<SsoUser> {
        let access_token = self.get_access_token().await?;
        match self.adapter.fetch_user_info(&access_token).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Failed to fetch current user");
                None
            }
        }
    }

    /// Refresh the tokens now
    ///
    /// # Errors
    /// - `SsoError::NotAuthenticated` if signed out
    /// - `SsoError::NoRefreshToken` if the provider issued none
    /// - `SsoError::TokenRefreshFailed` if the provider rejects the grant
    pub async fn refresh_access_token(&self) -> SsoResult<SsoTokens> {
        let tokens = self.tokens.refresh().await?;
        (self.refresh_dispatcher())(&tokens);
        Ok(tokens)
    }

    /// Whether the session is still usable
    ///
    /// Expired tokens get exactly one refresh attempt. A session older than
    /// the configured session timeout is cleared.
    ///
    /// # Errors
    /// Returns a storage error if the token record cannot be read or cleared.
    pub async fn validate_session(&self) -> SsoResult<bool> {
        let Some(tokens) = self.tokens.load().await? else {
            return Ok(false);
        };
        let now = self.clock.now();

        if self.tokens.session_expired(&tokens) {
            info!("SSO session timed out");
            self.tokens.clear().await?;
            return Ok(false);
        }

        if tokens.is_valid_at(now, self.tokens.policy().validity_margin) {
            return Ok(true);
        }
        if tokens.refresh_token.is_none() {
            return Ok(false);
        }

        match self.refresh_access_token().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                Ok(false)
            }
        }
    }

    /// Sign out
    ///
    /// Revokes at the provider on a best-effort basis, always clears the
    /// local session, and returns where to send the browser.
    ///
    /// # Errors
    /// Returns a storage error if local tokens cannot be cleared, or
    /// `SsoError::ConfigInvalid` if the logout URL is malformed.
    pub async fn logout(&self) -> SsoResult<Url> {
        self.tokens.cancel_refresh();

        let tokens = self.tokens.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read tokens during logout");
            None
        });

        if let Some(tokens) = &tokens {
            let token = tokens.refresh_token.as_deref().unwrap_or(&tokens.access_token);
            if let Err(e) = self.adapter.revoke(token).await {
                warn!(provider = %self.config.provider, error = %e, "Token revocation failed");
            }
        }

        if let Err(e) = self.discard_pending_login().await {
            debug!(error = %e, "Could not clear pending login state");
        }
        self.tokens.clear().await?;

        let url = self.adapter.logout_url(tokens.as_ref().and_then(|t| t.id_token.as_deref()))?;
        info!(provider = %self.config.provider, "SSO logout completed");
        Ok(url)
    }

    /// Whether valid tokens are stored and the session has not timed out
    pub async fn is_authenticated(&self) -> bool {
        self.tokens.is_valid().await
    }

    /// Current access token, refreshing first when a refresh is due
    pub async fn get_access_token(&self) -> Option<String> {
        if self.tokens.needs_refresh().await {
            if let Err(e) = self.refresh_access_token().await {
                warn!(error = %e, "Token refresh before use failed");
            }
        }
        self.tokens.access_token().await
    }

    /// Be notified when another session signs in, refreshes or signs out
    pub fn on_token_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<SsoTokens>) + Send + Sync + 'static,
    {
        self.tokens.on_change(callback)
    }

    /// Run `callback` after every successful refresh in this session
    ///
    /// Replaces any previously registered callback.
    pub fn on_token_refresh<F>(&self, callback: F)
    where
        F: Fn(&SsoTokens) + Send + Sync + 'static,
    {
        *self.refresh_callback.lock() = Some(Arc::new(callback));
    }

    /// Arm automatic refresh for the stored tokens
    ///
    /// Returns `false` when there is nothing to refresh.
    ///
    /// # Errors
    /// Returns a storage error if the token record cannot be read.
    pub async fn start_token_refresh(&self) -> SsoResult<bool> {
        self.tokens.schedule_refresh(Some(self.refresh_dispatcher())).await
    }

    /// Stop automatic refresh
    pub fn stop_token_refresh(&self) {
        self.tokens.cancel_refresh();
    }

    /// Display name of the provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.display_name()
    }

    /// Provider variant
    #[must_use]
    pub fn provider_kind(&self) -> ProviderKind {
        self.config.provider
    }

    /// Whether SSO is switched on in configuration
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether a login attempt is waiting for its callback
    ///
    /// # Errors
    /// Returns a storage error if the session store cannot be read.
    pub async fn has_pending_login(&self) -> SsoResult<bool> {
        self.state_guard.has_pending().await
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// Token manager for advanced operations
    #[must_use]
    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// Drop the pending login attempt of this session and its verifier
    async fn discard_pending_login(&self) -> SsoResult<()> {
        if let Some(previous) = self.state_guard.take_pending().await? {
            pkce::take_verifier(self.stores.persistent.as_ref(), &previous.state).await?;
        }
        Ok(())
    }

    /// Forwards to whichever refresh callback is registered when it fires
    fn refresh_dispatcher(&self) -> RefreshCallback {
        let slot = Arc::clone(&self.refresh_callback);
        Arc::new(move |tokens: &SsoTokens| {
            let callback = slot.lock().clone();
            if let Some(callback) = callback {
                callback(tokens);
            }
        })
    }
}

impl std::fmt::Debug for SsoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoService")
            .field("provider", &self.config.provider)
            .field("adapter", &"ProviderAdapter")
            .field("token_manager", &self.tokens)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::service.

    use super::*;
    use crate::auth::provider::mock::MOCK_USER_ID;
    use async_trait::async_trait;

    use crate::auth::pkce::verifier_key;
    use crate::auth::storage::{MemoryStore, TOKENS_KEY};
    use crate::auth::traits::SessionStore;
    use crate::auth::token_manager::TokenState;
    use crate::clock::MockClock;

    struct Harness {
        service: SsoService,
        clock: MockClock,
        transport: Arc<MockTransport>,
        stores: SessionStores,
    }

    fn harness() -> Harness {
        let clock = MockClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let transport = Arc::new(MockTransport::new(Arc::clone(&shared_clock)));
        let stores = SessionStores::in_memory();
        let config = SsoConfig::mock("http://localhost:3000/auth/callback", "http://localhost:3000");
        let service = SsoService::with_transport(
            config,
            stores.clone(),
            TokenChannel::new(),
            transport.clone(),
            shared_clock,
        )
        .unwrap();
        Harness { service, clock, transport, stores }
    }

    async fn sign_in(service: &SsoService) -> SsoUser {
        let request = service.login().await.unwrap();
        service.handle_callback_url(&request.url).await.unwrap()
    }

    /// Validates construction rejects bad configuration.
    ///
    /// Assertions:
    /// - Confirms a non-mock provider without client id fails with
    ///   `ConfigInvalid`.
    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SsoConfig { provider: ProviderKind::Okta, ..SsoConfig::default() };
        let result = SsoService::new(config, SessionStores::in_memory(), TokenChannel::new());
        assert!(matches!(result, Err(SsoError::ConfigInvalid(_))));
    }

    /// Validates the mock login round trip.
    ///
    /// Assertions:
    /// - Confirms the verifier is stored under the attempt's state.
    /// - Confirms the mock user is returned and the session is valid.
    /// - Confirms the PKCE verifier is consumed.
    /// - Confirms a refresh timer is armed.
    #[tokio::test]
    async fn test_mock_login_round_trip() {
        let h = harness();
        let request = h.service.login().await.unwrap();
        let key = verifier_key(&request.state);
        assert!(h.stores.persistent.get(&key).await.unwrap().is_some());

        let user = h.service.handle_callback_url(&request.url).await.unwrap();

        assert_eq!(user.id, MOCK_USER_ID);
        assert!(h.service.is_authenticated().await);
        assert!(h.stores.persistent.get(&key).await.unwrap().is_none());
        assert!(h.service.token_manager().is_refresh_scheduled());
        assert!(!h.service.has_pending_login().await.unwrap());
        assert_eq!(h.service.provider_name(), "Mock SSO");
        assert!(h.service.is_enabled());
    }

    /// Validates a forged state never reaches the provider.
    ///
    /// Assertions:
    /// - Confirms `InvalidState` and no token request.
    /// - Confirms the verifier is erased anyway.
    #[tokio::test]
    async fn test_bad_state_aborts_before_exchange() {
        let h = harness();
        let request = h.service.login().await.unwrap();

        let err = h.service.handle_callback("mock_authorization_code_1", "forged").await;
        assert_eq!(err.unwrap_err(), SsoError::InvalidState);
        assert_eq!(h.transport.token_requests(), 0);
        let key = verifier_key(&request.state);
        assert!(h.stores.persistent.get(&key).await.unwrap().is_none());
        assert!(!h.service.is_authenticated().await);
    }

    /// Validates a lost verifier fails the callback.
    ///
    /// Assertions:
    /// - Confirms `PkceVerifierMissing` when the verifier was removed.
    #[tokio::test]
    async fn test_missing_verifier() {
        let h = harness();
        let request = h.service.login().await.unwrap();
        h.stores.persistent.remove(&verifier_key(&request.state)).await.unwrap();

        let params = CallbackParams::from_url(&request.url).unwrap();
        let err = h.service.handle_callback(&params.code, &params.state).await.unwrap_err();
        assert_eq!(err, SsoError::PkceVerifierMissing);
    }

    /// Validates a rejected code leaves no tokens behind.
    ///
    /// Assertions:
    /// - Confirms `TokenExchangeFailed` and an unauthenticated session.
    #[tokio::test]
    async fn test_rejected_code_persists_nothing() {
        let h = harness();
        let request = h.service.login().await.unwrap();

        let err = h.service.handle_callback("bogus", &request.state).await.unwrap_err();
        assert!(matches!(err, SsoError::TokenExchangeFailed { status_code: Some(400), .. }));
        assert_eq!(h.service.token_manager().state().await, TokenState::Absent);
    }

    /// Validates session validation with refresh.
    ///
    /// Assertions:
    /// - Confirms an expired session is refreshed once and reported valid.
    /// - Confirms the refresh callback ran.
    #[tokio::test]
    async fn test_validate_session_refreshes_expired_tokens() {
        let h = harness();
        sign_in(&h.service).await;
        h.service.stop_token_refresh();

        let refreshed = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&refreshed);
        h.service.on_token_refresh(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        h.clock.advance_secs(3590);
        assert!(h.service.validate_session().await.unwrap());
        assert_eq!(h.transport.refresh_requests(), 1);
        assert_eq!(refreshed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    /// Validates the session timeout.
    ///
    /// Assertions:
    /// - Ensures a timed-out session is unauthenticated and hands out no
    ///   access token even though its tokens were refreshed.
    /// - Ensures a refresh of it fails with `SessionExpired`.
    /// - Confirms `validate_session` clears it.
    #[tokio::test]
    async fn test_session_timeout_clears_tokens() {
        let h = harness();
        sign_in(&h.service).await;
        h.service.stop_token_refresh();

        h.clock.advance_secs(3000);
        h.service.refresh_access_token().await.unwrap();
        h.clock.advance_secs(601);

        assert!(!h.service.is_authenticated().await);
        assert_eq!(h.service.get_access_token().await, None);
        assert_eq!(h.service.token_manager().state().await, TokenState::Expired);

        assert!(!h.service.validate_session().await.unwrap());
        assert_eq!(h.service.token_manager().state().await, TokenState::Absent);
        assert_eq!(h.transport.refresh_requests(), 1);
    }

    /// Validates a refresh after the session timeout ends the session.
    ///
    /// Assertions:
    /// - Confirms `SessionExpired` without contacting the provider.
    /// - Confirms the tokens are cleared.
    #[tokio::test]
    async fn test_refresh_after_timeout_is_rejected() {
        let h = harness();
        sign_in(&h.service).await;
        h.service.stop_token_refresh();

        h.clock.advance_secs(3601);
        let err = h.service.refresh_access_token().await.unwrap_err();
        assert_eq!(err, SsoError::SessionExpired);
        assert_eq!(h.transport.refresh_requests(), 0);
        assert_eq!(h.service.token_manager().state().await, TokenState::Absent);
    }

    /// Validates logout.
    ///
    /// Assertions:
    /// - Confirms the refresh token is revoked and local tokens cleared.
    /// - Confirms the mock logout target is returned.
    #[tokio::test]
    async fn test_logout() {
        let h = harness();
        sign_in(&h.service).await;

        let url = h.service.logout().await.unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/");
        assert_eq!(h.transport.revoke_requests(), 1);
        assert!(!h.service.is_authenticated().await);
        assert!(!h.service.token_manager().is_refresh_scheduled());
        assert_eq!(h.service.get_current_user().await, None);
    }

    /// Validates a new login discards the verifier of the attempt it replaces.
    ///
    /// Assertions:
    /// - Ensures the first attempt's verifier is gone after a second login.
    /// - Confirms the second attempt completes.
    #[tokio::test]
    async fn test_relogin_discards_replaced_verifier() {
        let h = harness();
        let first = h.service.login().await.unwrap();
        let second = h.service.login().await.unwrap();

        assert!(h.stores.persistent.get(&verifier_key(&first.state)).await.unwrap().is_none());
        assert!(h.stores.persistent.get(&verifier_key(&second.state)).await.unwrap().is_some());

        let err = h.service.handle_callback_url(&first.url).await.unwrap_err();
        assert_eq!(err, SsoError::InvalidState);
        assert!(h.stores.persistent.get(&verifier_key(&second.state)).await.unwrap().is_none());
    }

    /// Store whose token reads fail
    #[derive(Debug, Default)]
    struct UnreadableTokens {
        inner: MemoryStore,
    }

    #[async_trait]
    impl SessionStore for UnreadableTokens {
        async fn get(&self, key: &str) -> SsoResult<Option<String>> {
            if key == TOKENS_KEY {
                return Err(SsoError::Storage("read failed".to_string()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> SsoResult<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> SsoResult<()> {
            self.inner.remove(key).await
        }

        async fn take(&self, key: &str) -> SsoResult<Option<String>> {
            self.inner.take(key).await
        }
    }

    /// Validates a login whose refresh timer cannot be armed still succeeds.
    ///
    /// Assertions:
    /// - Confirms the callback returns the user with the tokens stored.
    /// - Ensures no refresh timer is armed.
    #[tokio::test]
    async fn test_callback_survives_refresh_arming_failure() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
        let transport = Arc::new(MockTransport::new(Arc::clone(&clock)));
        let persistent = Arc::new(UnreadableTokens::default());
        let stores = SessionStores::new(persistent.clone(), Arc::new(MemoryStore::new()));
        let config = SsoConfig::mock("http://localhost:3000/auth/callback", "http://localhost:3000");
        let service =
            SsoService::with_transport(config, stores, TokenChannel::new(), transport, clock)
                .unwrap();

        let user = sign_in(&service).await;
        assert_eq!(user.id, MOCK_USER_ID);
        assert!(persistent.inner.get(TOKENS_KEY).await.unwrap().is_some());
        assert!(!service.token_manager().is_refresh_scheduled());
    }
}
