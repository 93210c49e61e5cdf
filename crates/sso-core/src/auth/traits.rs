//! Trait definitions for SSO collaborators
//!
//! Storage and HTTP sit behind traits so the orchestrator can be wired with
//! in-memory fakes in tests and with the mock provider in development.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{SsoError, SsoResult};

/// Scoped key/value store for session data
///
/// Values are opaque strings; callers serialize their own records.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Read a value
    async fn get(&self, key: &str) -> SsoResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> SsoResult<()>;

    /// Delete a value (no-op when absent)
    async fn remove(&self, key: &str) -> SsoResult<()>;

    /// Read and delete a value in one step
    async fn take(&self, key: &str) -> SsoResult<Option<String>>;
}

/// Completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl TransportResponse {
    /// Construct a response
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    /// True for 2xx statuses
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    /// Returns `SsoError::Serialization` if the body is not the expected JSON.
    pub fn json<T: DeserializeOwned>(&self) -> SsoResult<T> {
        serde_json::from_str(&self.body).map_err(SsoError::from)
    }
}

/// HTTP transport used by the provider adapter
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    /// POST an `application/x-www-form-urlencoded` body
    ///
    /// # Errors
    /// Returns `SsoError::Transport` when no response was received.
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> SsoResult<TransportResponse>;

    /// GET with an `Authorization: Bearer` header
    ///
    /// # Errors
    /// Returns `SsoError::Transport` when no response was received.
    async fn get_bearer(&self, url: &Url, access_token: &str) -> SsoResult<TransportResponse>;
}
