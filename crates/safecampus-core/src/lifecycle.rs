//! Install/activate lifecycle of one worker version.
//!
//! Install precaches the static manifest as a single all-or-nothing batch
//! and provisions the dynamic tier. Activate deletes every tier that does not
//! belong to this version and takes control of open pages. A failed install
//! leaves the version redundant; whichever version was active keeps serving.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, TierSet};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::models::{Request, Response};
use crate::network::Network;
use crate::platform::{Clients, Registration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for the previous version to release its pages.
    Installed,
    Activating,
    Activated,
    /// Install failed or the version was replaced.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub claimed: usize,
}

pub struct LifecycleController {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    tiers: TierSet,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    controller_changed: AtomicBool,
}

impl LifecycleController {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn Clients>,
    ) -> Self {
        let tiers = TierSet::new(&config, Arc::clone(&storage));
        Self {
            config,
            storage,
            tiers,
            network,
            clients,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controller_changed: AtomicBool::new(false),
        }
    }

    pub fn tiers(&self) -> &TierSet {
        &self.tiers
    }

    pub fn state(&self) -> WorkerState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(from = %*state, to = %next, version = %self.config.version, "Worker state change");
        *state = next;
    }

    /// Activate as soon as install finishes instead of waiting for pages to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Whether this version replaced an earlier controller of open pages.
    pub fn controller_changed(&self) -> bool {
        self.controller_changed.load(Ordering::SeqCst)
    }

    async fn fetch_asset(&self, origin: &Request, path: &str) -> Result<(Request, Response)> {
        let request = origin.sibling(path)?;
        let failure = |reason: String| WorkerError::AssetInstallFailure {
            url: request.url.to_string(),
            reason,
        };
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !response.is_cacheable() {
            return Err(failure(format!("status {}", response.status)));
        }
        Ok((request, response))
    }

    /// Precache the manifest under `origin`. Nothing is written unless every
    /// asset was fetched with a 200.
    pub async fn install(&self, origin: &Request) -> Result<()> {
        info!(version = %self.config.version, assets = self.config.static_manifest.len(), "Installing worker");
        self.set_state(WorkerState::Installing);

        let fetches = self
            .config
            .static_manifest
            .iter()
            .map(|path| self.fetch_asset(origin, path));
        let batch = match futures::future::try_join_all(fetches).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(version = %self.config.version, error = %e, "Install failed, version is redundant");
                self.set_state(WorkerState::Redundant);
                return Err(e);
            }
        };

        let provisioned = async {
            self.tiers.static_tier.open().await?;
            self.tiers.static_tier.put_all(batch).await?;
            self.tiers.dynamic_tier.open().await
        }
        .await;
        if let Err(e) = provisioned {
            self.set_state(WorkerState::Redundant);
            return Err(e);
        }

        self.skip_waiting();
        self.set_state(WorkerState::Installed);
        info!(version = %self.config.version, "Worker installed");
        Ok(())
    }

    pub async fn activate(&self) -> Result<ActivateReport> {
        info!(version = %self.config.version, "Activating worker");
        self.set_state(WorkerState::Activating);

        let mut report = ActivateReport::default();
        for name in self.storage.keys().await? {
            if self.config.is_current_tier(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    info!(tier = %name, "Deleted stale cache tier");
                    report.deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(tier = %name, error = %e, "Failed to delete stale cache tier"),
            }
        }

        let claim = self.clients.claim().await?;
        report.claimed = claim.claimed;
        if claim.replaced_controller {
            self.controller_changed.store(true, Ordering::SeqCst);
        }

        self.set_state(WorkerState::Activated);
        info!(version = %self.config.version, claimed = report.claimed, "Worker activated");
        Ok(report)
    }

    /// Mark this version replaced by a newer one.
    pub fn retire(&self) {
        self.set_state(WorkerState::Redundant);
    }
}

/// Ask the platform to re-fetch the worker script every `interval`. The
/// first check happens one interval after spawning. Abort the handle to stop.
pub fn spawn_update_checker(registration: Arc<dyn Registration>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match registration.update().await {
                Ok(true) => info!("New worker version found"),
                Ok(false) => debug!("Worker script unchanged"),
                Err(e) => warn!(error = %e, "Update check failed"),
            }
        }
    })
}
