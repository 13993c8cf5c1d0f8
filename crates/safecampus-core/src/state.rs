//! Persisted state read and written next to the worker: the contacts list,
//! the residence record and the rolling emergency history.
//!
//! Contacts and residence are opaque JSON owned by the UI. Each surface is
//! one JSON file in the state directory.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::models::Coordinates;

/// Only the most recent events are kept.
pub const HISTORY_LIMIT: usize = 10;

const CONTACTS_FILE: &str = "emergency-contacts";
const RESIDENCE_FILE: &str = "student-residence";
const HISTORY_FILE: &str = "emergency-history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum EventStatus {
    Sent,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct EmergencyEvent {
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub triggered_at: DateTime<Utc>,
    pub location: Option<Coordinates>,
    pub contacts_notified: usize,
    pub status: EventStatus,
    /// Queue id when delivery was deferred.
    #[serde(default)]
    pub alert_id: Option<String>,
}

pub struct LocalState {
    state_dir: PathBuf,
    /// Serializes the read-modify-write of the history file.
    history_lock: Mutex<()>,
}

impl LocalState {
    pub fn new(state_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&state_dir)?;
        Ok(Self {
            state_dir,
            history_lock: Mutex::new(()),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", name))
    }

    async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let contents = match fs::read(self.path(name)).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(file = name, "Saved local state");
        Ok(())
    }

    // ===== Contacts =====

    /// The saved contacts, or an empty list when none were ever saved.
    pub async fn contacts(&self) -> Result<serde_json::Value> {
        Ok(self
            .load(CONTACTS_FILE)
            .await?
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new())))
    }

    pub async fn save_contacts(&self, contacts: &serde_json::Value) -> Result<()> {
        self.save(CONTACTS_FILE, contacts).await
    }

    // ===== Residence =====

    pub async fn residence(&self) -> Result<Option<serde_json::Value>> {
        self.load(RESIDENCE_FILE).await
    }

    pub async fn save_residence(&self, residence: &serde_json::Value) -> Result<()> {
        self.save(RESIDENCE_FILE, residence).await
    }

    pub async fn clear_residence(&self) -> Result<()> {
        match fs::remove_file(self.path(RESIDENCE_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ===== History =====

    /// Newest first.
    pub async fn history(&self) -> Result<Vec<EmergencyEvent>> {
        Ok(self.load(HISTORY_FILE).await?.unwrap_or_default())
    }

    pub async fn record_event(&self, event: EmergencyEvent) -> Result<()> {
        let _guard = self.history_lock.lock().await;
        let mut history = self.history().await?;
        history.insert(0, event);
        history.truncate(HISTORY_LIMIT);
        self.save(HISTORY_FILE, &history).await
    }
}

/// Number of entries in a contacts payload. Anything but an array counts as none.
pub fn contact_count(contacts: &serde_json::Value) -> usize {
    contacts.as_array().map(Vec::len).unwrap_or(0)
}
