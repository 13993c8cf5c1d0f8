//! File-backed cache storage.
//!
//! Each tier is a directory under `<root>/tiers/`, each entry a JSON file
//! named by the SHA-256 of its key. Entries are written to a temporary file
//! and renamed into place, so readers see either the old or the new entry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::{CacheEntry, CacheStorage};
use crate::error::{Result, WorkerError};

const TIERS_DIR: &str = "tiers";

pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into().join(TIERS_DIR);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn tier_path(&self, tier: &str) -> Result<PathBuf> {
        if tier.is_empty() || tier.contains(['/', '\\']) || tier.starts_with('.') {
            return Err(WorkerError::storage(format!("invalid tier name: {:?}", tier)));
        }
        Ok(self.root.join(tier))
    }

    fn entry_file(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}.json", hex::encode(hasher.finalize()))
    }

    async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<()> {
        // Unique per writer so concurrent puts of one key never share a temp file
        let tmp = path.with_extension(format!("{:08x}.tmp", rand::random::<u32>()));
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, tier: &str) -> Result<()> {
        fs::create_dir_all(self.tier_path(tier)?).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                names.push(item.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, tier: &str) -> Result<bool> {
        let path = self.tier_path(tier)?;
        if fs::metadata(&path).await.is_err() {
            return Ok(false);
        }
        fs::remove_dir_all(&path).await?;
        Ok(true)
    }

    async fn lookup(&self, tier: &str, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.tier_path(tier)?.join(Self::entry_file(key));
        let contents = match fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&contents)?;
        Ok(Some(entry))
    }

    async fn put(&self, tier: &str, entry: CacheEntry) -> Result<()> {
        let dir = self.tier_path(tier)?;
        fs::create_dir_all(&dir).await?;
        let path = dir.join(Self::entry_file(&entry.key));
        let contents = serde_json::to_vec(&entry)?;
        Self::write_atomic(&path, contents).await?;
        debug!(tier = tier, key = %entry.key, "Wrote cache entry");
        Ok(())
    }
}
