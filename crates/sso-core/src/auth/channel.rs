//! Cross-session token change channel
//!
//! Sessions of the same principal share one [`TokenChannel`]. Every store or
//! clear is published with the originating session id; listeners only see
//! changes made by *other* sessions, since their own already know.
//!
//! The channel also carries the principal's generation counter. A clear
//! bumps it, and an in-flight refresh that started under an older generation
//! discards its result instead of resurrecting a logged-out session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::SsoTokens;

const CHANNEL_CAPACITY: usize = 32;

/// A token record change
#[derive(Debug, Clone)]
pub struct TokenChange {
    /// Session that made the change
    pub origin: Uuid,
    /// New record, `None` when tokens were cleared
    pub tokens: Option<SsoTokens>,
}

/// Broadcast channel shared by every session of one principal
#[derive(Debug, Clone)]
pub struct TokenChannel {
    sender: broadcast::Sender<TokenChange>,
    generation: Arc<AtomicU64>,
}

impl TokenChannel {
    /// Create a channel
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, generation: Arc::new(AtomicU64::new(0)) }
    }

    /// Publish a change to every listener
    pub fn publish(&self, change: TokenChange) {
        if self.sender.send(change).is_err() {
            debug!("No token change listeners");
        }
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new generation, invalidating in-flight refreshes
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Deliver changes from sessions other than `own_origin` to `callback`
    ///
    /// Must be called from within a tokio runtime. Delivery stops when the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn listen<F>(&self, own_origin: Uuid, callback: F) -> Subscription
    where
        F: Fn(Option<SsoTokens>) + Send + Sync + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(change) if change.origin != own_origin => callback(change.tokens),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Token change listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

impl Default for TokenChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a change listener; dropping it stops delivery
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the listener is still running
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
