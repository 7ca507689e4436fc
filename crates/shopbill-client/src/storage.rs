//! # Session Storage
//!
//! The narrow key-value seam the session manager persists through. The
//! device build uses the SQLite [`KvRepository`]; tests use [`MemoryStore`].

use async_trait::async_trait;
use shopbill_store::KvRepository;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::ClientResult;

/// Persisted string storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> ClientResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Removes all `keys`; absent keys are not an error.
    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()>;
}

#[async_trait]
impl SessionStore for KvRepository {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(KvRepository::get(self, key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        Ok(KvRepository::set(self, key, value).await?)
    }

    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()> {
        KvRepository::remove_many(self, keys).await?;
        Ok(())
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `entries`.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MemoryStore {
            entries: RwLock::new(map),
        }
    }

    /// Copy of everything stored.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> ClientResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
