use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CacheEntry, CacheStorage};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::models::{Request, Response};

/// The two logical tiers a worker version owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierKind {
    Static,
    Dynamic,
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierKind::Static => write!(f, "static"),
            TierKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A named partition bound to its backing storage.
#[derive(Clone)]
pub struct CacheTier {
    name: Arc<str>,
    storage: Arc<dyn CacheStorage>,
}

impl CacheTier {
    pub fn new(name: &str, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            name: Arc::from(name),
            storage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn open(&self) -> Result<()> {
        self.storage.open(&self.name).await
    }

    pub async fn entry(&self, request: &Request) -> Result<Option<CacheEntry>> {
        self.storage.lookup(&self.name, &request.cache_key()).await
    }

    pub async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        Ok(self.entry(request).await?.map(|e| e.response))
    }

    pub async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        let entry = CacheEntry::new(request.cache_key(), response.clone());
        self.storage.put(&self.name, entry).await
    }

    pub async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        let entries = batch
            .into_iter()
            .map(|(req, resp)| CacheEntry::new(req.cache_key(), resp))
            .collect();
        self.storage.put_all(&self.name, entries).await
    }
}

impl std::fmt::Debug for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheTier").field(&self.name).finish()
    }
}

/// The current version's static and dynamic tiers.
#[derive(Clone, Debug)]
pub struct TierSet {
    pub static_tier: CacheTier,
    pub dynamic_tier: CacheTier,
}

impl TierSet {
    pub fn new(config: &WorkerConfig, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            static_tier: CacheTier::new(&config.static_tier(), Arc::clone(&storage)),
            dynamic_tier: CacheTier::new(&config.dynamic_tier(), storage),
        }
    }

    pub fn get(&self, kind: TierKind) -> &CacheTier {
        match kind {
            TierKind::Static => &self.static_tier,
            TierKind::Dynamic => &self.dynamic_tier,
        }
    }
}
