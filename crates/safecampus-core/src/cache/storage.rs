//! Cache storage trait and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::CacheEntry;
use crate::error::{Result, WorkerError};

/// Named, asynchronous key-value partitions holding stored responses.
///
/// Writes are atomic per entry. There is no locking across concurrent writes
/// to the same key; the last write wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the tier if it does not exist yet.
    async fn open(&self, tier: &str) -> Result<()>;

    /// Names of all existing tiers.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove a tier and everything in it. Returns whether it existed.
    async fn delete(&self, tier: &str) -> Result<bool>;

    async fn lookup(&self, tier: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, creating the tier if needed.
    async fn put(&self, tier: &str, entry: CacheEntry) -> Result<()>;

    /// Store a batch of entries. Callers fetch the whole batch before writing.
    async fn put_all(&self, tier: &str, entries: Vec<CacheEntry>) -> Result<()> {
        for entry in entries {
            self.put(tier, entry).await?;
        }
        Ok(())
    }
}

/// Storage held entirely in memory. Used by tests and as a fake platform store.
#[derive(Default)]
pub struct MemoryCacheStorage {
    tiers: RwLock<BTreeMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self, tier: &str) -> usize {
        self.tiers
            .read()
            .map(|tiers| tiers.get(tier).map(|t| t.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn poisoned() -> WorkerError {
        WorkerError::storage("cache storage lock poisoned")
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, tier: &str) -> Result<()> {
        let mut tiers = self.tiers.write().map_err(|_| Self::poisoned())?;
        tiers.entry(tier.to_string()).or_default();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let tiers = self.tiers.read().map_err(|_| Self::poisoned())?;
        Ok(tiers.keys().cloned().collect())
    }

    async fn delete(&self, tier: &str) -> Result<bool> {
        let mut tiers = self.tiers.write().map_err(|_| Self::poisoned())?;
        Ok(tiers.remove(tier).is_some())
    }

    async fn lookup(&self, tier: &str, key: &str) -> Result<Option<CacheEntry>> {
        let tiers = self.tiers.read().map_err(|_| Self::poisoned())?;
        Ok(tiers.get(tier).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, tier: &str, entry: CacheEntry) -> Result<()> {
        let mut tiers = self.tiers.write().map_err(|_| Self::poisoned())?;
        tiers
            .entry(tier.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Response;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let storage = MemoryCacheStorage::new();
        storage.open("static").await.unwrap();
        storage
            .put("static", CacheEntry::new("k", Response::ok("a")))
            .await
            .unwrap();
        storage.open("static").await.unwrap();
        assert_eq!(storage.entry_count("static"), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_whole_entry() {
        let storage = MemoryCacheStorage::new();
        storage.put("t", CacheEntry::new("k", Response::ok("old"))).await.unwrap();
        storage.put("t", CacheEntry::new("k", Response::ok("new"))).await.unwrap();
        let entry = storage.lookup("t", "k").await.unwrap().unwrap();
        assert_eq!(entry.body(), b"new");
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let storage = MemoryCacheStorage::new();
        storage.open("old").await.unwrap();
        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_missing_tier_is_miss() {
        let storage = MemoryCacheStorage::new();
        assert!(storage.lookup("nope", "k").await.unwrap().is_none());
    }
}
