//! In-memory fakes of the platform capabilities.
//!
//! Used by unit tests, the integration tests and anyone embedding the worker
//! without a real browser runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{LocationError, Result, WorkerError};
use crate::install::{InstallOffer, InstallOutcome};
use crate::models::{Coordinates, QueuedAlert, Request, Response};
use crate::network::Network;
use crate::notify::NotificationOptions;
use crate::platform::{
    BackgroundTask, ClaimReport, Clients, LocationProvider, NotificationSink, PositionOptions,
    Registration, SyncRegistrar,
};
use crate::sync::AlertDelivery;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Fail(String),
}

/// Network with scripted replies keyed by URL path.
///
/// Unscripted paths fail as if the host were unreachable. A held path
/// blocks its fetches until `release` is called.
#[derive(Default)]
pub struct FakeNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: Response) {
        lock(&self.replies).insert(path.to_string(), Reply::Respond(response));
    }

    pub fn fail(&self, path: &str, error: &str) {
        lock(&self.replies).insert(path.to_string(), Reply::Fail(error.to_string()));
    }

    /// Every fetch fails regardless of script.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Block fetches of `path` until `release(path)`.
    pub fn hold(&self, path: &str) {
        lock(&self.gates).insert(path.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, path: &str) {
        if let Some(gate) = lock(&self.gates).remove(path) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        lock(&self.calls).iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let path = request.path().to_string();
        lock(&self.calls).push(path.clone());

        let gate = lock(&self.gates).get(&path).cloned();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| WorkerError::network("gate closed"))?;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(WorkerError::network("Network unavailable"));
        }
        let reply = lock(&self.replies).get(&path).cloned();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(WorkerError::network(error)),
            None => Err(WorkerError::network(format!("no route to {}", request.url))),
        }
    }
}

/// Delivery that fails or succeeds on command and remembers what it delivered.
#[derive(Default)]
pub struct FakeDelivery {
    failing: Mutex<Option<String>>,
    fail_ids: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl FakeDelivery {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(error: &str) -> Self {
        let delivery = Self::default();
        delivery.set_failing(Some(error));
        delivery
    }

    pub fn set_failing(&self, error: Option<&str>) {
        *lock(&self.failing) = error.map(str::to_string);
    }

    pub fn fail_only(&self, id: &str, error: &str) {
        lock(&self.fail_ids).insert(id.to_string(), error.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        lock(&self.delivered).clone()
    }
}

#[async_trait]
impl AlertDelivery for FakeDelivery {
    async fn deliver(&self, alert: &QueuedAlert) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(error) = lock(&self.failing).clone() {
            return Err(WorkerError::delivery(error));
        }
        if let Some(error) = lock(&self.fail_ids).get(&alert.id).cloned() {
            return Err(WorkerError::delivery(error));
        }
        lock(&self.delivered).push(alert.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeClients {
    focused: AtomicBool,
    open_pages: AtomicUsize,
    replaced_controller: AtomicBool,
    claims: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl FakeClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    pub fn set_open_pages(&self, pages: usize, controlled_by_previous: bool) {
        self.open_pages.store(pages, Ordering::SeqCst);
        self.replaced_controller.store(controlled_by_previous, Ordering::SeqCst);
    }

    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl Clients for FakeClients {
    async fn claim(&self) -> Result<ClaimReport> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        let claimed = self.open_pages.load(Ordering::SeqCst);
        Ok(ClaimReport {
            claimed,
            replaced_controller: claimed > 0 && self.replaced_controller.load(Ordering::SeqCst),
        })
    }

    async fn has_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    async fn focus_or_open(&self, url: &str) -> Result<()> {
        lock(&self.opened).push(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotificationSink {
    shown: Mutex<Vec<(String, NotificationOptions)>>,
    closed: Mutex<Vec<String>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<(String, NotificationOptions)> {
        lock(&self.shown).clone()
    }

    pub fn closed(&self) -> Vec<String> {
        lock(&self.closed).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        lock(&self.shown).push((title.to_string(), options.clone()));
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        lock(&self.closed).push(tag.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistration {
    checks: AtomicUsize,
    changed: AtomicBool,
}

impl FakeRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_changed(&self, changed: bool) {
        self.changed.store(changed, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registration for FakeRegistration {
    async fn update(&self) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.changed.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct FakeSyncRegistrar {
    registered: Mutex<Vec<String>>,
    unsupported: AtomicBool,
}

impl FakeSyncRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration fails, as on platforms without background sync.
    pub fn set_unsupported(&self, unsupported: bool) {
        self.unsupported.store(unsupported, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<String> {
        lock(&self.registered).clone()
    }
}

#[async_trait]
impl SyncRegistrar for FakeSyncRegistrar {
    async fn register(&self, tag: &str) -> Result<()> {
        if self.unsupported.load(Ordering::SeqCst) {
            return Err(WorkerError::InvalidRequest("background sync unsupported".to_string()));
        }
        lock(&self.registered).push(tag.to_string());
        Ok(())
    }
}

pub struct FakeLocation {
    result: Mutex<std::result::Result<Coordinates, LocationError>>,
    requests: Mutex<Vec<PositionOptions>>,
}

impl FakeLocation {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            result: Mutex::new(Ok(Coordinates { latitude, longitude })),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: LocationError) -> Self {
        Self {
            result: Mutex::new(Err(error)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PositionOptions> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<Coordinates, LocationError> {
        lock(&self.requests).push(options);
        *lock(&self.result)
    }
}

pub struct FakeInstallOffer {
    outcome: Mutex<InstallOutcome>,
    prompts: AtomicUsize,
}

impl FakeInstallOffer {
    pub fn new(outcome: InstallOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: InstallOutcome) {
        *lock(&self.outcome) = outcome;
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstallOffer for FakeInstallOffer {
    async fn prompt(&self) -> Result<InstallOutcome> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(*lock(&self.outcome))
    }
}

/// Background task that counts its runs.
#[derive(Default)]
pub struct CountingTask {
    runs: AtomicUsize,
}

impl CountingTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundTask for CountingTask {
    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
