//! CSRF state guard
//!
//! Issues the opaque `state` (and OIDC `nonce`) for a login attempt and
//! validates the callback exactly once. Only one attempt can be pending per
//! session: the record lives in a fixed slot of the ephemeral store and is
//! deleted on the first `consume`, whatever the outcome.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use super::pkce::random_string;
use super::storage::STATE_KEY;
use super::traits::SessionStore;
use super::types::SsoState;
use crate::clock::Clock;
use crate::error::{SsoError, SsoResult};

/// Seconds a pending state stays valid
pub const STATE_TTL_SECS: i64 = 300;

/// Length of generated state and nonce values
pub const STATE_LENGTH: usize = 32;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Issues and validates anti-CSRF state for one session
#[derive(Debug, Clone)]
pub struct StateGuard {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl StateGuard {
    /// Create a guard over the session's ephemeral store
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, ttl: Duration::seconds(STATE_TTL_SECS) }
    }

    /// Issue a new state/nonce pair, replacing any pending attempt
    ///
    /// # Errors
    /// Returns `SsoError::Entropy` if the random source fails, or a storage
    /// error if the record cannot be written.
    pub async fn issue(&self, return_url: Option<String>) -> SsoResult<SsoState> {
        let record = SsoState {
            state: random_string(ALPHANUMERIC, STATE_LENGTH)?,
            nonce: Some(random_string(ALPHANUMERIC, STATE_LENGTH)?),
            return_url,
            created_at: self.clock.now(),
        };

        self.store.set(STATE_KEY, serde_json::to_string(&record)?).await?;
        debug!("Issued login state");
        Ok(record)
    }

    /// Validate `received` against the pending attempt and invalidate it
    ///
    /// The pending record is deleted before any comparison, so a state can
    /// be consumed at most once.
    ///
    /// # Errors
    /// - `SsoError::InvalidState` if nothing is pending or the value differs
    /// - `SsoError::ExpiredState` if more than the TTL has elapsed
    pub async fn consume(&self, received: &str) -> SsoResult<SsoState> {
        let pending = self.take_pending().await?;
        self.validate(pending, received)
    }

    /// Remove and return the pending attempt without validating it
    ///
    /// An unreadable record is removed and reported as nothing pending.
    ///
    /// # Errors
    /// Returns a storage error if the store cannot be read.
    pub async fn take_pending(&self) -> SsoResult<Option<SsoState>> {
        let Some(raw) = self.store.take(STATE_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable login state");
                Ok(None)
            }
        }
    }

    /// Check `received` against an attempt taken with [`StateGuard::take_pending`]
    ///
    /// # Errors
    /// - `SsoError::InvalidState` if nothing was pending or the value differs
    /// - `SsoError::ExpiredState` if more than the TTL has elapsed
    pub fn validate(&self, pending: Option<SsoState>, received: &str) -> SsoResult<SsoState> {
        let Some(record) = pending else {
            warn!("Callback received with no pending login state");
            return Err(SsoError::InvalidState);
        };

        if record.state != received {
            warn!("Callback state does not match pending login");
            return Err(SsoError::InvalidState);
        }

        let age = self.clock.now() - record.created_at;
        if age > self.ttl {
            warn!(age_secs = age.num_seconds(), "Login state expired");
            return Err(SsoError::ExpiredState);
        }

        Ok(record)
    }

    /// Whether a login attempt is pending
    ///
    /// # Errors
    /// Returns a storage error if the store cannot be read.
    pub async fn has_pending(&self) -> SsoResult<bool> {
        Ok(self.store.get(STATE_KEY).await?.is_some())
    }
}
