//! Token manager with automatic refresh
//!
//! Manages the token record lifecycle for one session:
//! - Persisting and loading the record from the persistent store
//! - Validity and refresh-due checks against the injected clock
//! - De-duplicated refresh (concurrent callers join one exchange)
//! - A single background refresh timer with bounded retry
//! - Cross-session change notification through the [`TokenChannel`]
//!
//! ```text
//! Absent ──store──▶ Valid ──refresh due──▶ NeedsRefresh ──▶ Refreshing
//!   ▲                 ▲                                      │
//!   │                 └───────────────ok─────────────────────┤
//!   └─────────────clear / retries exhausted──────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::channel::{Subscription, TokenChange, TokenChannel};
use super::provider::ProviderAdapter;
use super::storage::TOKENS_KEY;
use super::traits::SessionStore;
use super::types::SsoTokens;
use crate::clock::Clock;
use crate::config::RefreshPolicy;
use crate::error::{ErrorClassification, SsoError, SsoResult};

/// Callback run after every successful refresh in this session
pub type RefreshCallback = Arc<dyn Fn(&SsoTokens) + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, SsoResult<SsoTokens>>>;

/// Where the token record is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No record stored
    Absent,
    /// Usable and not yet due for refresh
    Valid,
    /// Refresh is due and a refresh token is present
    NeedsRefresh,
    /// A refresh exchange is in flight
    Refreshing,
    /// Unusable and cannot be refreshed
    Expired,
}

/// Per-session token manager
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    adapter: Arc<ProviderAdapter>,
    store: Arc<dyn SessionStore>,
    channel: TokenChannel,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    session_id: Uuid,
    inflight: Mutex<Option<RefreshFuture>>,
    timer: Mutex<Option<(u64, JoinHandle<()>)>>,
    timer_seq: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

impl TokenManager {
    /// Create a manager for one session
    #[must_use]
    pub fn new(
        adapter: Arc<ProviderAdapter>,
        store: Arc<dyn SessionStore>,
        channel: TokenChannel,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter,
                store,
                channel,
                clock,
                policy,
                session_id: Uuid::new_v4(),
                inflight: Mutex::new(None),
                timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Identifier of this session on the change channel
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Refresh timing in effect
    #[must_use]
    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy
    }

    /// Load the stored record
    ///
    /// An unreadable record is removed and reported as absent.
    ///
    /// # Errors
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> SsoResult<Option<SsoTokens>> {
        let Some(raw) = self.inner.store.get(TOKENS_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable token record");
                self.inner.store.remove(TOKENS_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Stamp, persist and broadcast a token record
    ///
    /// Returns the record as stored.
    ///
    /// # Errors
    /// Returns a storage or serialization error if persisting fails.
    pub async fn store(&self, mut tokens: SsoTokens) -> SsoResult<SsoTokens> {
        let now = self.inner.clock.now();
        tokens.stamp(now);
        if tokens.session_started_at.is_none() {
            tokens.session_started_at = Some(now);
        }

        self.inner.store.set(TOKENS_KEY, serde_json::to_string(&tokens)?).await?;
        debug!(expires_at = %tokens.expires_at, "Stored tokens");

        self.inner.channel.publish(TokenChange {
            origin: self.inner.session_id,
            tokens: Some(tokens.clone()),
        });
        Ok(tokens)
    }

    /// Delete the record, cancel the timer and broadcast the clear
    ///
    /// # Errors
    /// Returns a storage error if the record cannot be removed.
    pub async fn clear(&self) -> SsoResult<()> {
        self.cancel_refresh();
        self.clear_record().await
    }

    async fn clear_record(&self) -> SsoResult<()> {
        // Bump first so an in-flight refresh cannot write the record back.
        self.inner.channel.bump_generation();
        self.inner.store.remove(TOKENS_KEY).await?;
        self.inner.channel.publish(TokenChange { origin: self.inner.session_id, tokens: None });
        info!("Cleared tokens");
        Ok(())
    }

    /// Whether the session behind `tokens` has outlived the session timeout
    #[must_use]
    pub fn session_expired(&self, tokens: &SsoTokens) -> bool {
        match (self.inner.policy.session_timeout, tokens.session_started_at) {
            (Some(timeout), Some(started)) => self.inner.clock.now() - started > timeout,
            _ => false,
        }
    }

    /// True when a record exists with more than the validity margin left
    /// and the session has not timed out
    pub async fn is_valid(&self) -> bool {
        let now = self.inner.clock.now();
        matches!(
            self.load().await,
            Ok(Some(tokens)) if !self.session_expired(&tokens)
                && tokens.is_valid_at(now, self.inner.policy.validity_margin)
        )
    }

    /// True when a refresh is due and a refresh token is present
    pub async fn needs_refresh(&self) -> bool {
        let now = self.inner.clock.now();
        matches!(
            self.load().await,
            Ok(Some(tokens)) if !self.session_expired(&tokens)
                && tokens.needs_refresh_at(now, self.inner.policy.refresh_before_expiry)
        )
    }

    /// Access token of a valid record
    pub async fn access_token(&self) -> Option<String> {
        let now = self.inner.clock.now();
        match self.load().await {
            Ok(Some(tokens))
                if !self.session_expired(&tokens)
                    && tokens.is_valid_at(now, self.inner.policy.validity_margin) =>
            {
                Some(tokens.access_token)
            }
            _ => None,
        }
    }

    /// Delay until the refresh instant, `None` when nothing can be refreshed
    pub async fn time_until_refresh(&self) -> Option<Duration> {
        match self.load().await {
            Ok(Some(tokens)) if tokens.refresh_token.is_some() => {
                Some(self.delay_until_due(&tokens))
            }
            _ => None,
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> TokenState {
        if self.is_refreshing() {
            return TokenState::Refreshing;
        }

        let Ok(Some(tokens)) = self.load().await else {
            return TokenState::Absent;
        };

        let now = self.inner.clock.now();
        if self.session_expired(&tokens) {
            TokenState::Expired
        } else if tokens.needs_refresh_at(now, self.inner.policy.refresh_before_expiry) {
            TokenState::NeedsRefresh
        } else if tokens.is_valid_at(now, self.inner.policy.validity_margin) {
            TokenState::Valid
        } else {
            TokenState::Expired
        }
    }

    fn is_refreshing(&self) -> bool {
        self.inner.inflight.lock().as_ref().is_some_and(|inflight| inflight.peek().is_none())
    }

    /// Refresh the tokens, joining an in-flight refresh if there is one
    ///
    /// # Errors
    /// - `SsoError::NotAuthenticated` if no record is stored or the record
    ///   was cleared while the exchange was in flight
    /// - `SsoError::NoRefreshToken` if the record has no refresh token
    /// - `SsoError::SessionExpired` if the session timed out; the record is
    ///   cleared
    /// - `SsoError::TokenRefreshFailed` if the provider rejects the grant
    pub async fn refresh(&self) -> SsoResult<SsoTokens> {
        let shared = {
            let mut slot = self.inner.inflight.lock();
            match slot.as_ref() {
                Some(inflight) if inflight.peek().is_none() => {
                    debug!("Joining in-flight token refresh");
                    inflight.clone()
                }
                _ => {
                    let weak = Arc::downgrade(&self.inner);
                    let future = async move {
                        let inner = weak.upgrade().ok_or(SsoError::NotAuthenticated)?;
                        TokenManager { inner }.refresh_once().await
                    }
                    .boxed()
                    .shared();
                    *slot = Some(future.clone());
                    future
                }
            }
        };

        let result = shared.clone().await;

        let mut slot = self.inner.inflight.lock();
        if slot.as_ref().is_some_and(|inflight| inflight.ptr_eq(&shared)) {
            *slot = None;
        }
        result
    }

    async fn refresh_once(&self) -> SsoResult<SsoTokens> {
        let generation = self.inner.channel.generation();
        let current = self.load().await?.ok_or(SsoError::NotAuthenticated)?;
        if self.session_expired(&current) {
            info!("SSO session timed out");
            self.clear_record().await?;
            return Err(SsoError::SessionExpired);
        }
        let refresh_token = current.refresh_token.clone().ok_or(SsoError::NoRefreshToken)?;

        let mut tokens = self.inner.adapter.refresh(&refresh_token).await?;

        if self.inner.channel.generation() != generation {
            debug!("Discarding refresh result for cleared tokens");
            return Err(SsoError::NotAuthenticated);
        }

        tokens.session_started_at = current.session_started_at;
        self.store(tokens).await
    }

    /// Arm the background refresh timer, replacing any armed one
    ///
    /// Returns `false` (and leaves no timer) when there is nothing to
    /// refresh. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns a storage error if the record cannot be read.
    pub async fn schedule_refresh(&self, on_refresh: Option<RefreshCallback>) -> SsoResult<bool> {
        let armed = match self.load().await? {
            Some(tokens) if tokens.refresh_token.is_some() => tokens,
            _ => {
                self.cancel_refresh();
                return Ok(false);
            }
        };

        let delay = self.delay_until_due(&armed);
        let id = self.inner.timer_seq.fetch_add(1, Ordering::SeqCst);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_timer(weak, id, armed, on_refresh));

        if let Some((_, previous)) = self.inner.timer.lock().replace((id, handle)) {
            previous.abort();
        }

        debug!(refresh_in_secs = delay.as_secs(), "Armed token refresh");
        Ok(true)
    }

    /// Cancel the pending refresh timer
    pub fn cancel_refresh(&self) {
        if let Some((_, handle)) = self.inner.timer.lock().take() {
            handle.abort();
            debug!("Cancelled token refresh timer");
        }
    }

    /// Whether a refresh timer is armed
    #[must_use]
    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner.timer.lock().as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Be notified when another session stores or clears tokens
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<SsoTokens>) + Send + Sync + 'static,
    {
        self.inner.channel.listen(self.inner.session_id, callback)
    }

    fn delay_until_due(&self, tokens: &SsoTokens) -> Duration {
        let due = tokens.refresh_due_at(self.inner.policy.refresh_before_expiry);
        (due - self.inner.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Drop the timer slot held by timer `id` without aborting it
    fn release_timer(&self, id: u64) {
        let mut slot = self.inner.timer.lock();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
    }

    async fn refresh_with_retry(&self) -> SsoResult<SsoTokens> {
        let max_retries = self.inner.policy.max_retries;
        let mut attempt = 0;

        loop {
            match self.refresh().await {
                Ok(tokens) => return Ok(tokens),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    warn!(attempt, max_retries, error = %e, "Scheduled token refresh failed, retrying");
                    tokio::time::sleep(e.retry_after().unwrap_or(self.inner.policy.retry_delay))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Background refresh loop for one armed timer
///
/// `armed` is the record the timer was armed for. If the stored record has
/// moved on by the time it fires (another session refreshed), the timer
/// re-arms for the new expiry instead of refreshing again. A refresh that
/// returns tokens already due for refresh stops the timer.
async fn run_timer(
    weak: Weak<Inner>,
    id: u64,
    mut armed: SsoTokens,
    on_refresh: Option<RefreshCallback>,
) {
    loop {
        let delay = match weak.upgrade() {
            Some(inner) => TokenManager { inner }.delay_until_due(&armed),
            None => return,
        };
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let manager = TokenManager { inner };

        match manager.load().await {
            Ok(Some(tokens)) if tokens.refresh_token.is_none() => {
                manager.release_timer(id);
                return;
            }
            Ok(Some(tokens)) if tokens.expires_at != armed.expires_at => {
                debug!("Tokens changed since timer was armed, re-arming");
                armed = tokens;
                continue;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Tokens gone, stopping refresh timer");
                manager.release_timer(id);
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read tokens for scheduled refresh");
            }
        }

        info!("Refreshing tokens before expiry");
        match manager.refresh_with_retry().await {
            Ok(tokens) => {
                if let Some(callback) = &on_refresh {
                    callback(&tokens);
                }
                if manager.delay_until_due(&tokens).is_zero() {
                    warn!(
                        expires_in = tokens.expires_in,
                        "Refreshed tokens are already due for refresh, stopping refresh timer"
                    );
                    manager.release_timer(id);
                    return;
                }
                armed = tokens;
            }
            Err(
                SsoError::NotAuthenticated | SsoError::NoRefreshToken | SsoError::SessionExpired,
            ) => {
                manager.release_timer(id);
                return;
            }
            Err(e) => {
                error!(error = %e, severity = %e.severity(), "Token refresh failed, ending session");
                manager.release_timer(id);
                if let Err(e) = manager.clear_record().await {
                    error!(error = %e, "Failed to clear tokens after refresh failure");
                }
                return;
            }
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("provider", &self.inner.adapter.kind())
            .field("session_id", &self.inner.session_id)
            .field("policy", &self.inner.policy)
            .field("refresh_scheduled", &self.is_refresh_scheduled())
            .finish_non_exhaustive()
    }
}
