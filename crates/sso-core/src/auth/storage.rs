//! Session store implementations
//!
//! - [`MemoryStore`]: process-local map, used as the ephemeral store and in
//!   tests
//! - [`FileStore`]: JSON file on disk, used as the persistent store so tokens
//!   and the PKCE verifier survive a restart between redirect and callback

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::traits::SessionStore;
use crate::error::{SsoError, SsoResult};

/// Persistent slot holding the token record
pub const TOKENS_KEY: &str = "sso_tokens";
/// Prefix of the persistent slots holding PKCE verifiers between redirect
/// and callback, one per login attempt
pub const PKCE_VERIFIER_KEY: &str = "pkce_verifier";
/// Ephemeral slot holding the pending login state
pub const STATE_KEY: &str = "sso_state";

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> SsoResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> SsoResult<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> SsoResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> SsoResult<Option<String>> {
        Ok(self.entries.lock().remove(key))
    }
}

/// File-backed session store
///
/// The whole map is rewritten on every mutation through a temp file and
/// rename. A process-wide async lock serializes read-modify-write cycles
/// for this handle; share one `Arc<FileStore>` between sessions.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: tokio::sync::Mutex::new(()) }
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> SsoResult<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(SsoError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> SsoResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = map.len(), "Session store flushed");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> SsoResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> SsoResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> SsoResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }

    async fn take(&self, key: &str) -> SsoResult<Option<String>> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        let value = map.remove(key);
        if value.is_some() {
            self.write_map(&map).await?;
        }
        Ok(value)
    }
}

/// The two scoped stores a session works against
///
/// `persistent` is shared by every session of the same principal (tokens,
/// PKCE verifiers keyed by login attempt); `ephemeral` belongs to a single
/// session (CSRF state).
#[derive(Debug, Clone)]
pub struct SessionStores {
    /// Survives restarts and is shared between sessions
    pub persistent: Arc<dyn SessionStore>,
    /// Scoped to one session
    pub ephemeral: Arc<dyn SessionStore>,
}

impl SessionStores {
    /// Pair the given stores
    #[must_use]
    pub fn new(persistent: Arc<dyn SessionStore>, ephemeral: Arc<dyn SessionStore>) -> Self {
        Self { persistent, ephemeral }
    }

    /// Both stores in memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// New session sharing this session's persistent store
    #[must_use]
    pub fn sibling(&self) -> Self {
        Self::new(Arc::clone(&self.persistent), Arc::new(MemoryStore::new()))
    }
}
