//! The three caching strategies.
//!
//! Each variant carries the tier it reads and writes, so there is no lookup
//! by name at request time. All network calls are awaited by the caller
//! except the stale-while-revalidate refresh, which is registered with the
//! event's `Lifetime`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::CacheTier;
use crate::error::{Result, WorkerError};
use crate::lifetime::Lifetime;
use crate::models::{Request, Response};
use crate::network::Network;
use crate::routing::StrategyKind;

#[derive(Clone, Debug)]
pub enum Strategy {
    CacheFirst(CacheTier),
    NetworkFirst(CacheTier),
    StaleWhileRevalidate(CacheTier),
}

impl Strategy {
    pub fn new(kind: StrategyKind, tier: CacheTier) -> Self {
        match kind {
            StrategyKind::CacheFirst => Strategy::CacheFirst(tier),
            StrategyKind::NetworkFirst => Strategy::NetworkFirst(tier),
            StrategyKind::StaleWhileRevalidate => Strategy::StaleWhileRevalidate(tier),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::CacheFirst(_) => StrategyKind::CacheFirst,
            Strategy::NetworkFirst(_) => StrategyKind::NetworkFirst,
            Strategy::StaleWhileRevalidate(_) => StrategyKind::StaleWhileRevalidate,
        }
    }

    pub fn tier(&self) -> &CacheTier {
        match self {
            Strategy::CacheFirst(t) | Strategy::NetworkFirst(t) | Strategy::StaleWhileRevalidate(t) => t,
        }
    }

    pub async fn execute(
        &self,
        request: &Request,
        network: &Arc<dyn Network>,
        lifetime: &Lifetime,
    ) -> Result<Response> {
        match self {
            Strategy::CacheFirst(tier) => cache_first(request, tier, network.as_ref()).await,
            Strategy::NetworkFirst(tier) => network_first(request, tier, network.as_ref()).await,
            Strategy::StaleWhileRevalidate(tier) => {
                stale_while_revalidate(request, tier, network, lifetime).await
            }
        }
    }
}

/// Tier lookup where a storage failure counts as a miss.
async fn lookup(tier: &CacheTier, request: &Request) -> Option<Response> {
    match tier.lookup(request).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(tier = tier.name(), url = %request.url, error = %e, "Cache lookup failed, treating as miss");
            None
        }
    }
}

/// Store a 200 response. Failing to cache never fails the request.
async fn write_through(tier: &CacheTier, request: &Request, response: &Response) {
    if !response.is_cacheable() {
        return;
    }
    if let Err(e) = tier.put(request, response).await {
        warn!(tier = tier.name(), url = %request.url, error = %e, "Failed to write cache entry");
    }
}

async fn cache_first(request: &Request, tier: &CacheTier, network: &dyn Network) -> Result<Response> {
    if let Some(cached) = lookup(tier, request).await {
        debug!(tier = tier.name(), url = %request.url, "Cache hit");
        return Ok(cached);
    }

    let response = network.fetch(request).await?;
    if !response.is_cacheable() {
        return Err(WorkerError::HttpStatus {
            status: response.status,
            url: request.url.to_string(),
        });
    }
    write_through(tier, request, &response).await;
    Ok(response)
}

async fn network_first(request: &Request, tier: &CacheTier, network: &dyn Network) -> Result<Response> {
    match network.fetch(request).await {
        Ok(response) => {
            write_through(tier, request, &response).await;
            Ok(response)
        }
        Err(e) => match lookup(tier, request).await {
            Some(cached) => {
                debug!(tier = tier.name(), url = %request.url, error = %e, "Network failed, serving cached entry");
                Ok(cached)
            }
            None => Err(e),
        },
    }
}

async fn stale_while_revalidate(
    request: &Request,
    tier: &CacheTier,
    network: &Arc<dyn Network>,
    lifetime: &Lifetime,
) -> Result<Response> {
    let Some(cached) = lookup(tier, request).await else {
        let response = network.fetch(request).await?;
        write_through(tier, request, &response).await;
        return Ok(response);
    };

    debug!(tier = tier.name(), url = %request.url, "Serving cached entry while revalidating");
    let request = request.clone();
    let tier = tier.clone();
    let network = Arc::clone(network);
    lifetime.wait_until(async move {
        match network.fetch(&request).await {
            Ok(response) => write_through(&tier, &request, &response).await,
            Err(e) => {
                warn!(tier = tier.name(), url = %request.url, error = %e, "Background revalidation failed");
            }
        }
    });

    Ok(cached)
}
