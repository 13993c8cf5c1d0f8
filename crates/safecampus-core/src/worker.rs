//! Event dispatcher for the worker.
//!
//! Built once from its collaborators; the host feeds it platform events.
//! Every event returns a `Lifetime` that the host must settle before the
//! worker may be suspended. Handler errors are logged at this boundary and
//! never returned, except for the fetch path which has its own degrade rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::lifecycle::{LifecycleController, WorkerState};
use crate::lifetime::Lifetime;
use crate::messages::{reply_version, ReplyPort, WorkerMessage};
use crate::models::{Request, Response};
use crate::network::Network;
use crate::notify::{NotificationAction, NotificationDispatcher};
use crate::platform::{BackgroundTask, Clients, LoggingTask, NotificationSink};
use crate::routing::{Route, RouteClassifier};
use crate::strategy::Strategy;
use crate::sync::{SyncQueue, SyncTag};

/// Everything the worker calls out to.
pub struct WorkerParts {
    pub config: Arc<WorkerConfig>,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub clients: Arc<dyn Clients>,
    pub notifications: Arc<dyn NotificationSink>,
    pub queue: SyncQueue,
    pub contact_sync: Arc<dyn BackgroundTask>,
    pub emergency_check: Arc<dyn BackgroundTask>,
}

impl WorkerParts {
    /// Parts with the external background tasks left unattached.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn Clients>,
        notifications: Arc<dyn NotificationSink>,
        queue: SyncQueue,
    ) -> Self {
        Self {
            config,
            storage,
            network,
            clients,
            notifications,
            queue,
            contact_sync: Arc::new(LoggingTask::new("contact-sync")),
            emergency_check: Arc::new(LoggingTask::new("emergency-check")),
        }
    }
}

#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync(String),
    PeriodicSync(String),
    Push(Option<Vec<u8>>),
    NotificationClick { action: Option<NotificationAction>, tag: String },
    Message { data: serde_json::Value, reply: Option<ReplyPort> },
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Sync(_) => "sync",
            WorkerEvent::PeriodicSync(_) => "periodicsync",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message { .. } => "message",
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// Work was registered on the lifetime; nothing to hand back.
    Handled,
    /// Fetch was not intercepted; the platform fetches it untouched.
    Passthrough,
    Response(Response),
    /// Fetch failed for a non-navigation request.
    Failed(WorkerError),
}

/// What a dispatched event hands back to the host.
pub struct Dispatch {
    pub outcome: Outcome,
    pub lifetime: Lifetime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct WorkerStatus {
    pub version: String,
    pub state: WorkerState,
    pub skip_waiting: bool,
    /// A new version took over pages controlled by an older one.
    pub controller_changed: bool,
    pub queued_alerts: usize,
    /// Age of the cached app shell, e.g. `"12m ago"`; `None` before install.
    pub shell_cached: Option<String>,
}

struct Inner {
    config: Arc<WorkerConfig>,
    root: Request,
    lifecycle: LifecycleController,
    classifier: RouteClassifier,
    network: Arc<dyn Network>,
    queue: SyncQueue,
    notifications: NotificationDispatcher,
    contact_sync: Arc<dyn BackgroundTask>,
    emergency_check: Arc<dyn BackgroundTask>,
}

#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    /// `origin` is the scope root the manifest and fallbacks resolve against.
    pub fn new(parts: WorkerParts, origin: &str) -> Result<Self> {
        let root = Request::get(origin)?.sibling("/")?;
        let lifecycle = LifecycleController::new(
            Arc::clone(&parts.config),
            parts.storage,
            Arc::clone(&parts.network),
            Arc::clone(&parts.clients),
        );
        let notifications =
            NotificationDispatcher::new(parts.notifications, parts.clients, root.url.as_str());
        let classifier = RouteClassifier::new(&parts.config);
        Ok(Self {
            inner: Arc::new(Inner {
                config: parts.config,
                root,
                lifecycle,
                classifier,
                network: parts.network,
                queue: parts.queue,
                notifications,
                contact_sync: parts.contact_sync,
                emergency_check: parts.emergency_check,
            }),
        })
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.inner.lifecycle
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    pub fn version(&self) -> &str {
        &self.inner.config.version
    }

    pub async fn status(&self) -> WorkerStatus {
        let queued_alerts = match self.inner.queue.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to read alert queue");
                0
            }
        };
        let shell_cached = match self.inner.lifecycle.tiers().static_tier.entry(&self.inner.root).await {
            Ok(entry) => entry.map(|entry| entry.age_display()),
            Err(e) => {
                warn!(error = %e, "Failed to read cached shell");
                None
            }
        };
        WorkerStatus {
            version: self.inner.config.version.clone(),
            state: self.inner.lifecycle.state(),
            skip_waiting: self.inner.lifecycle.skip_waiting_requested(),
            controller_changed: self.inner.lifecycle.controller_changed(),
            queued_alerts,
            shell_cached,
        }
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> Dispatch {
        debug!(event = event.name(), "Dispatching event");
        let lifetime = Lifetime::new();
        let outcome = match event {
            WorkerEvent::Fetch(request) => self.handle_fetch(request, &lifetime).await,
            WorkerEvent::Install => {
                let worker = self.clone();
                lifetime.wait_until(async move {
                    if let Err(e) = worker.inner.lifecycle.install(&worker.inner.root).await {
                        error!(error = %e, "Install handler failed");
                    }
                });
                Outcome::Handled
            }
            WorkerEvent::Activate => {
                let worker = self.clone();
                lifetime.wait_until(async move {
                    if let Err(e) = worker.inner.lifecycle.activate().await {
                        error!(error = %e, "Activate handler failed");
                    }
                });
                Outcome::Handled
            }
            WorkerEvent::Sync(tag) => {
                self.handle_sync(SyncTag::parse(&tag), false, &lifetime);
                Outcome::Handled
            }
            WorkerEvent::PeriodicSync(tag) => {
                self.handle_sync(SyncTag::parse(&tag), true, &lifetime);
                Outcome::Handled
            }
            WorkerEvent::Push(payload) => {
                let worker = self.clone();
                lifetime.wait_until(async move {
                    if let Err(e) = worker.inner.notifications.on_push(payload.as_deref()).await {
                        error!(error = %e, "Push handler failed");
                    }
                });
                Outcome::Handled
            }
            WorkerEvent::NotificationClick { action, tag } => {
                let worker = self.clone();
                lifetime.wait_until(async move {
                    if let Err(e) = worker.inner.notifications.on_click(action, &tag).await {
                        error!(error = %e, "Notification click handler failed");
                    }
                });
                Outcome::Handled
            }
            WorkerEvent::Message { data, reply } => {
                self.handle_message(&data, reply, &lifetime);
                Outcome::Handled
            }
        };
        Dispatch { outcome, lifetime }
    }

    async fn handle_fetch(&self, request: Request, lifetime: &Lifetime) -> Outcome {
        let policy = match self.inner.classifier.classify(&request) {
            Route::Skip => return Outcome::Passthrough,
            Route::Handle(policy) => policy,
        };
        let tier = self.inner.lifecycle.tiers().get(policy.tier).clone();
        let strategy = Strategy::new(policy.strategy, tier);
        debug!(url = %request.url, strategy = %policy.strategy, tier = %policy.tier, "Routing fetch");

        match strategy.execute(&request, &self.inner.network, lifetime).await {
            Ok(response) => Outcome::Response(response),
            Err(e) if request.is_navigation() => {
                warn!(url = %request.url, error = %e, "Navigation failed, serving offline fallback");
                Outcome::Response(self.offline_fallback().await)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed");
                Outcome::Failed(e)
            }
        }
    }

    /// The cached root document, or a synthesized offline response.
    async fn offline_fallback(&self) -> Response {
        match self.inner.lifecycle.tiers().static_tier.lookup(&self.inner.root).await {
            Ok(Some(shell)) => shell,
            Ok(None) => Response::offline(),
            Err(e) => {
                warn!(error = %e, "Offline shell lookup failed");
                Response::offline()
            }
        }
    }

    fn handle_sync(&self, tag: SyncTag, periodic: bool, lifetime: &Lifetime) {
        info!(tag = ?tag, periodic = periodic, "Sync triggered");
        let worker = self.clone();
        match tag {
            SyncTag::EmergencyAlert => lifetime.wait_until(async move { worker.drain().await }),
            SyncTag::ContactSync if !periodic => lifetime.wait_until(async move {
                if let Err(e) = worker.inner.contact_sync.run().await {
                    error!(error = %e, "Contact sync failed");
                }
            }),
            SyncTag::EmergencyCheck if periodic => lifetime.wait_until(async move {
                if let Err(e) = worker.inner.emergency_check.run().await {
                    error!(error = %e, "Emergency status check failed");
                }
                worker.drain().await;
            }),
            other => debug!(tag = ?other, periodic = periodic, "No handler for sync tag"),
        }
    }

    async fn drain(&self) {
        if let Err(e) = self.inner.queue.drain().await {
            error!(error = %e, "Alert queue drain failed");
        }
    }

    fn handle_message(&self, data: &serde_json::Value, reply: Option<ReplyPort>, lifetime: &Lifetime) {
        match WorkerMessage::parse(data) {
            Some(WorkerMessage::SkipWaiting) => {
                info!("Skip waiting requested by page");
                self.inner.lifecycle.skip_waiting();
                // A waiting version takes over right away
                if self.inner.lifecycle.state() == WorkerState::Installed {
                    let worker = self.clone();
                    lifetime.wait_until(async move {
                        if let Err(e) = worker.inner.lifecycle.activate().await {
                            error!(error = %e, "Activation after skip waiting failed");
                        }
                    });
                }
            }
            Some(WorkerMessage::GetVersion) => reply_version(reply, &self.inner.config.version),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::sync::{AlertDelivery, MemoryAlertStore};
    use crate::testing::{
        CountingTask, FakeClients, FakeDelivery, FakeNetwork, RecordingNotificationSink,
    };
    use serde_json::json;
    use tokio::sync::oneshot;

    const ORIGIN: &str = "https://campus.test";

    struct Harness {
        worker: Worker,
        network: Arc<FakeNetwork>,
        storage: Arc<MemoryCacheStorage>,
        sink: Arc<RecordingNotificationSink>,
        clients: Arc<FakeClients>,
        contact_sync: Arc<CountingTask>,
        emergency_check: Arc<CountingTask>,
    }

    fn harness() -> Harness {
        let network = Arc::new(FakeNetwork::new());
        let storage = Arc::new(MemoryCacheStorage::new());
        let sink = Arc::new(RecordingNotificationSink::new());
        let clients = Arc::new(FakeClients::new());
        let contact_sync = Arc::new(CountingTask::new());
        let emergency_check = Arc::new(CountingTask::new());
        let queue = SyncQueue::new(
            Arc::new(MemoryAlertStore::new()),
            Arc::new(FakeDelivery::succeeding()) as Arc<dyn AlertDelivery>,
        );
        let mut parts = WorkerParts::new(
            Arc::new(WorkerConfig::default()),
            Arc::clone(&storage) as Arc<dyn CacheStorage>,
            Arc::clone(&network) as Arc<dyn Network>,
            Arc::clone(&clients) as Arc<dyn Clients>,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            queue,
        );
        parts.contact_sync = Arc::clone(&contact_sync) as Arc<dyn BackgroundTask>;
        parts.emergency_check = Arc::clone(&emergency_check) as Arc<dyn BackgroundTask>;
        Harness {
            worker: Worker::new(parts, ORIGIN).unwrap(),
            network,
            storage,
            sink,
            clients,
            contact_sync,
            emergency_check,
        }
    }

    fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let h = harness();
        let mut request = Request::get(&url("/api/alerts")).unwrap();
        request.method = crate::models::Method::Post;
        let dispatch = h.worker.dispatch(WorkerEvent::Fetch(request)).await;
        assert!(matches!(dispatch.outcome, Outcome::Passthrough));
        assert_eq!(h.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_cached_shell() {
        let h = harness();
        h.storage.open("safecampus-static-v2.1").await.unwrap();
        h.worker
            .lifecycle()
            .tiers()
            .static_tier
            .put(&Request::get(&url("/")).unwrap(), &Response::ok("<html>shell</html>"))
            .await
            .unwrap();

        let request = Request::navigate(&url("/residence")).unwrap();
        let dispatch = h.worker.dispatch(WorkerEvent::Fetch(request)).await;
        let Outcome::Response(response) = dispatch.outcome else {
            panic!("expected a response");
        };
        assert_eq!(response.text(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_shell_is_503() {
        let h = harness();
        let request = Request::navigate(&url("/residence")).unwrap();
        let dispatch = h.worker.dispatch(WorkerEvent::Fetch(request)).await;
        let Outcome::Response(response) = dispatch.outcome else {
            panic!("expected a response");
        };
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_offline_subresource_propagates_error() {
        let h = harness();
        let request = Request::get(&url("/api/status")).unwrap();
        let dispatch = h.worker.dispatch(WorkerEvent::Fetch(request)).await;
        assert!(matches!(
            dispatch.outcome,
            Outcome::Failed(WorkerError::NetworkUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_install_work_is_held_by_lifetime() {
        let h = harness();
        for path in WorkerConfig::default().static_manifest {
            h.network.respond(&path, Response::ok("asset"));
        }
        let dispatch = h.worker.dispatch(WorkerEvent::Install).await;
        assert!(matches!(dispatch.outcome, Outcome::Handled));
        let settled = dispatch.lifetime.settle().await;
        assert_eq!(settled.completed, 1);
        assert_eq!(h.worker.lifecycle().state(), WorkerState::Installed);
        assert_eq!(h.storage.entry_count("safecampus-static-v2.1"), 4);
    }

    #[tokio::test]
    async fn test_get_version_replies_on_port() {
        let h = harness();
        let (tx, rx) = oneshot::channel();
        h.worker
            .dispatch(WorkerEvent::Message {
                data: json!({"type": "GET_VERSION"}),
                reply: Some(tx),
            })
            .await;
        assert_eq!(rx.await.unwrap(), json!({"version": "v2.1"}));
    }

    fn serve_manifest(h: &Harness) {
        for path in WorkerConfig::default().static_manifest {
            h.network.respond(&path, Response::ok("asset"));
        }
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let h = harness();
        h.worker
            .dispatch(WorkerEvent::Message {
                data: json!({"type": "SKIP_WAITING"}),
                reply: None,
            })
            .await
            .lifetime
            .settle()
            .await;
        let status = h.worker.status().await;
        assert!(status.skip_waiting);
        // Nothing installed yet, so there is nothing to activate
        assert_eq!(status.state, WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_installed_version() {
        let h = harness();
        serve_manifest(&h);
        h.storage.open("safecampus-static-v2.0").await.unwrap();
        h.worker.dispatch(WorkerEvent::Install).await.lifetime.settle().await;
        assert_eq!(h.worker.lifecycle().state(), WorkerState::Installed);

        let dispatch = h
            .worker
            .dispatch(WorkerEvent::Message {
                data: json!({"type": "SKIP_WAITING"}),
                reply: None,
            })
            .await;
        assert!(matches!(dispatch.outcome, Outcome::Handled));
        assert_eq!(dispatch.lifetime.settle().await.completed, 1);

        assert_eq!(h.worker.lifecycle().state(), WorkerState::Activated);
        assert!(!h.storage.keys().await.unwrap().contains(&"safecampus-static-v2.0".to_string()));
    }

    #[tokio::test]
    async fn test_status_reports_shell_age() {
        let h = harness();
        assert_eq!(h.worker.status().await.shell_cached, None);

        serve_manifest(&h);
        h.worker.dispatch(WorkerEvent::Install).await.lifetime.settle().await;
        assert_eq!(h.worker.status().await.shell_cached.as_deref(), Some("just now"));
    }

    #[tokio::test]
    async fn test_sync_tags_route_to_tasks() {
        let h = harness();
        h.worker
            .dispatch(WorkerEvent::Sync("contact-sync".to_string()))
            .await
            .lifetime
            .settle()
            .await;
        h.worker
            .dispatch(WorkerEvent::PeriodicSync("emergency-check".to_string()))
            .await
            .lifetime
            .settle()
            .await;
        h.worker
            .dispatch(WorkerEvent::Sync("unknown".to_string()))
            .await
            .lifetime
            .settle()
            .await;
        assert_eq!(h.contact_sync.runs(), 1);
        assert_eq!(h.emergency_check.runs(), 1);
    }

    #[tokio::test]
    async fn test_push_and_view_click() {
        let h = harness();
        h.worker
            .dispatch(WorkerEvent::Push(Some(b"{}".to_vec())))
            .await
            .lifetime
            .settle()
            .await;
        assert_eq!(h.sink.shown().len(), 1);

        h.worker
            .dispatch(WorkerEvent::NotificationClick {
                action: Some(NotificationAction::View),
                tag: "emergency-notification".to_string(),
            })
            .await
            .lifetime
            .settle()
            .await;
        assert_eq!(h.clients.opened(), vec![url("/")]);
    }
}
