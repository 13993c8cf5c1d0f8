//! Platform capabilities the worker calls out to.
//!
//! These are the collaborators a browser would provide: open client pages,
//! the notification tray, the worker registration, background sync
//! registration and geolocation. The host supplies real implementations;
//! tests use the fakes in `crate::testing`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::{LocationError, Result};
use crate::models::Coordinates;
use crate::notify::NotificationOptions;

/// Result of taking control of already-open pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimReport {
    pub claimed: usize,
    /// A previous version was controlling at least one of the pages.
    pub replaced_controller: bool,
}

#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every open page in scope, without waiting for a reload.
    async fn claim(&self) -> Result<ClaimReport>;

    /// Whether any controlled page is visible and focused.
    async fn has_focused(&self) -> bool;

    /// Focus an open window at `url`, or open a new one.
    async fn focus_or_open(&self, url: &str) -> Result<()>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()>;

    async fn close(&self, tag: &str) -> Result<()>;
}

#[async_trait]
pub trait Registration: Send + Sync {
    /// Ask the platform to re-fetch the worker script. Returns whether it changed.
    async fn update(&self) -> Result<bool>;
}

#[async_trait]
pub trait SyncRegistrar: Send + Sync {
    /// Request a background sync carrying `tag` once connectivity returns.
    async fn register(&self, tag: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Option<Duration>,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: None,
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<Coordinates, LocationError>;
}

/// Deferred work owned by a collaborator outside the worker core.
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// Stand-in for a collaborator that has not been wired up; logs and succeeds.
pub struct LoggingTask {
    name: &'static str,
}

impl LoggingTask {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl BackgroundTask for LoggingTask {
    async fn run(&self) -> Result<()> {
        info!(task = self.name, "Background task has no collaborator attached");
        Ok(())
    }
}
