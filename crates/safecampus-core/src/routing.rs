//! Route classification: which strategy and tier handle a request.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cache::TierKind;
use crate::config::WorkerConfig;
use crate::models::{Method, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::CacheFirst => write!(f, "cache-first"),
            StrategyKind::NetworkFirst => write!(f, "network-first"),
            StrategyKind::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub strategy: StrategyKind,
    pub tier: TierKind,
}

impl RoutePolicy {
    const fn new(strategy: StrategyKind, tier: TierKind) -> Self {
        Self { strategy, tier }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; goes straight to the network untouched.
    Skip,
    Handle(RoutePolicy),
}

/// Extensions served stale-while-revalidate from the static tier.
const SHELL_EXTENSIONS: [&str; 3] = [".html", ".js", ".css"];

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    manifest: HashSet<String>,
    uploads_prefix: String,
    api_prefix: String,
}

impl RouteClassifier {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            manifest: config.static_manifest.iter().cloned().collect(),
            uploads_prefix: config.uploads_prefix.clone(),
            api_prefix: config.api_prefix.clone(),
        }
    }

    pub fn classify(&self, request: &Request) -> Route {
        if request.method != Method::Get || !request.is_http() {
            return Route::Skip;
        }
        Route::Handle(self.classify_path(request.path()))
    }

    /// Policy for a GET over http(s). First matching row wins.
    pub fn classify_path(&self, path: &str) -> RoutePolicy {
        if self.manifest.contains(path) || path.starts_with(&self.uploads_prefix) {
            RoutePolicy::new(StrategyKind::CacheFirst, TierKind::Static)
        } else if path.starts_with(&self.api_prefix) {
            RoutePolicy::new(StrategyKind::NetworkFirst, TierKind::Dynamic)
        } else if path == "/" || SHELL_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            RoutePolicy::new(StrategyKind::StaleWhileRevalidate, TierKind::Static)
        } else {
            RoutePolicy::new(StrategyKind::NetworkFirst, TierKind::Dynamic)
        }
    }
}
