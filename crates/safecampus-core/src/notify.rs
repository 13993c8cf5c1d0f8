//! Push notification rendering and click routing.
//!
//! Notification content is fixed by the worker; push payloads are not
//! inspected beyond logging their size.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LOGO_PATH;
use crate::error::Result;
use crate::platform::{Clients, NotificationSink};

pub const NOTIFICATION_TITLE: &str = "SafeCampus Emergency";
pub const NOTIFICATION_TAG: &str = "emergency-notification";

/// Vibration pattern in milliseconds: buzz, pause, buzz.
const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    View,
    Dismiss,
}

impl NotificationAction {
    /// `None` for a click on the notification body or an unknown action.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "view" => Some(NotificationAction::View),
            "dismiss" => Some(NotificationAction::Dismiss),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub action: NotificationAction,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<ActionButton>,
}

impl NotificationOptions {
    pub fn emergency() -> Self {
        Self {
            body: "Emergency alert received".to_string(),
            icon: LOGO_PATH.to_string(),
            badge: LOGO_PATH.to_string(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            tag: NOTIFICATION_TAG.to_string(),
            require_interaction: true,
            actions: vec![
                ActionButton {
                    action: NotificationAction::View,
                    title: "View Alert".to_string(),
                },
                ActionButton {
                    action: NotificationAction::Dismiss,
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    clients: Arc<dyn Clients>,
    root_url: String,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, clients: Arc<dyn Clients>, root_url: impl Into<String>) -> Self {
        Self {
            sink,
            clients,
            root_url: root_url.into(),
        }
    }

    /// Render the emergency notification unless a page is already in the foreground.
    /// Returns whether a notification was shown.
    pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<bool> {
        debug!(payload_bytes = payload.map(|p| p.len()).unwrap_or(0), "Push received");
        if self.clients.has_focused().await {
            debug!("App is in the foreground, not rendering notification");
            return Ok(false);
        }
        self.sink
            .show(NOTIFICATION_TITLE, &NotificationOptions::emergency())
            .await?;
        info!(tag = NOTIFICATION_TAG, "Emergency notification shown");
        Ok(true)
    }

    pub async fn on_click(&self, action: Option<NotificationAction>, tag: &str) -> Result<()> {
        info!(action = ?action, tag = tag, "Notification clicked");
        self.sink.close(tag).await?;
        match action {
            Some(NotificationAction::View) => self.clients.focus_or_open(&self.root_url).await,
            Some(NotificationAction::Dismiss) | None => Ok(()),
        }
    }
}
