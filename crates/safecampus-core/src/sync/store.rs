//! Persistent list backing the offline alert queue.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Result, WorkerError};
use crate::models::QueuedAlert;

/// Queue file name in the state directory
const QUEUE_FILE: &str = "alert-queue.json";

/// FIFO-by-insertion store. Each operation is independent; no lock is held
/// between operations, so concurrent drains interleave per alert.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn append(&self, alert: QueuedAlert) -> Result<()>;

    /// All queued alerts in insertion order.
    async fn list(&self) -> Result<Vec<QueuedAlert>>;

    /// Remove by id. Returns whether the alert was still queued.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Increment `attempts` and set `last_error`. Returns the new attempt
    /// count, or `None` if the alert is no longer queued.
    async fn record_failure(&self, id: &str, error: &str) -> Result<Option<u32>>;
}

fn apply_failure(alerts: &mut [QueuedAlert], id: &str, error: &str) -> Option<u32> {
    alerts.iter_mut().find(|a| a.id == id).map(|alert| {
        alert.attempts += 1;
        alert.last_error = Some(error.to_string());
        alert.attempts
    })
}

fn apply_remove(alerts: &mut Vec<QueuedAlert>, id: &str) -> bool {
    let before = alerts.len();
    alerts.retain(|a| a.id != id);
    alerts.len() != before
}

#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<Vec<QueuedAlert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_alerts<T>(&self, f: impl FnOnce(&mut Vec<QueuedAlert>) -> T) -> Result<T> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|_| WorkerError::storage("alert store lock poisoned"))?;
        Ok(f(&mut alerts))
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn append(&self, alert: QueuedAlert) -> Result<()> {
        self.with_alerts(|alerts| alerts.push(alert))
    }

    async fn list(&self) -> Result<Vec<QueuedAlert>> {
        self.with_alerts(|alerts| alerts.clone())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.with_alerts(|alerts| apply_remove(alerts, id))
    }

    async fn record_failure(&self, id: &str, error: &str) -> Result<Option<u32>> {
        self.with_alerts(|alerts| apply_failure(alerts, id, error))
    }
}

/// Queue persisted as a single JSON array, rewritten atomically on every
/// mutation. The async mutex serializes read-modify-write cycles only; it is
/// never held while an alert is being delivered.
pub struct JsonAlertStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonAlertStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        Ok(Self {
            path: state_dir.join(QUEUE_FILE),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<Vec<QueuedAlert>> {
        match fs::read(&self.path).await {
            Ok(contents) => Ok(serde_json::from_slice(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, alerts: &[QueuedAlert]) -> Result<()> {
        let contents = serde_json::to_vec_pretty(alerts)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut Vec<QueuedAlert>) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut alerts = self.load().await?;
        let result = f(&mut alerts);
        self.save(&alerts).await?;
        Ok(result)
    }
}

#[async_trait]
impl AlertStore for JsonAlertStore {
    async fn append(&self, alert: QueuedAlert) -> Result<()> {
        self.mutate(|alerts| alerts.push(alert)).await
    }

    async fn list(&self) -> Result<Vec<QueuedAlert>> {
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.mutate(|alerts| apply_remove(alerts, id)).await
    }

    async fn record_failure(&self, id: &str, error: &str) -> Result<Option<u32>> {
        self.mutate(|alerts| apply_failure(alerts, id, error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmergencyAlert;

    fn alert() -> QueuedAlert {
        QueuedAlert::new(EmergencyAlert::new(None, serde_json::json!([{"name": "RA on duty"}])))
    }

    #[tokio::test]
    async fn test_memory_store_is_fifo() {
        let store = MemoryAlertStore::new();
        let (a, b) = (alert(), alert());
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();
        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_record_failure_on_removed_alert() {
        let store = MemoryAlertStore::new();
        let a = alert();
        store.append(a.clone()).await.unwrap();
        assert!(store.remove(&a.id).await.unwrap());
        assert_eq!(store.record_failure(&a.id, "offline").await.unwrap(), None);
        assert!(!store.remove(&a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_persists_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = alert();
        {
            let store = JsonAlertStore::new(dir.path()).unwrap();
            store.append(a.clone()).await.unwrap();
            assert_eq!(store.record_failure(&a.id, "Network unavailable").await.unwrap(), Some(1));
            assert_eq!(store.record_failure(&a.id, "Network unavailable").await.unwrap(), Some(2));
        }
        let store = JsonAlertStore::new(dir.path()).unwrap();
        let queued = store.list().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].attempts, 2);
        assert_eq!(queued[0].last_error.as_deref(), Some("Network unavailable"));
    }

    #[tokio::test]
    async fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonAlertStore::new(dir.path()).unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
