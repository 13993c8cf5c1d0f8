//! Platform capabilities for a headless host.
//!
//! There are no pages, no notification tray and no background sync
//! scheduler outside a browser, so these log what a browser would do.

use async_trait::async_trait;
use tracing::{debug, info};

use safecampus_core::error::{LocationError, Result, WorkerError};
use safecampus_core::models::Coordinates;
use safecampus_core::notify::NotificationOptions;
use safecampus_core::platform::{
    ClaimReport, Clients, LocationProvider, NotificationSink, PositionOptions, Registration,
    SyncRegistrar,
};
use safecampus_core::WorkerConfig;

/// Env var holding a fixed `lat,lng` fix for the emergency flow.
pub const LOCATION_ENV: &str = "SAFECAMPUS_LOCATION";

pub struct HeadlessClients;

#[async_trait]
impl Clients for HeadlessClients {
    async fn claim(&self) -> Result<ClaimReport> {
        Ok(ClaimReport::default())
    }

    async fn has_focused(&self) -> bool {
        false
    }

    async fn focus_or_open(&self, url: &str) -> Result<()> {
        info!(url = url, "Would open window");
        Ok(())
    }
}

pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        info!(title = title, body = %options.body, tag = %options.tag, "Notification");
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        info!(tag = tag, "Notification closed");
        Ok(())
    }
}

pub struct DeferredSync;

#[async_trait]
impl SyncRegistrar for DeferredSync {
    async fn register(&self, tag: &str) -> Result<()> {
        info!(tag = tag, "Background sync requested; run `drain` once back online");
        Ok(())
    }
}

/// Treats the config file as the worker script: a different `version` on
/// disk than the one running means an update is waiting to be installed.
pub struct ConfigRegistration {
    running: String,
}

impl ConfigRegistration {
    pub fn new(running: &str) -> Self {
        Self {
            running: running.to_string(),
        }
    }

    fn changed(&self, on_disk: &WorkerConfig) -> bool {
        on_disk.version != self.running
    }
}

#[async_trait]
impl Registration for ConfigRegistration {
    async fn update(&self) -> Result<bool> {
        let on_disk = tokio::task::spawn_blocking(WorkerConfig::load)
            .await
            .map_err(|e| WorkerError::storage(e.to_string()))?
            .map_err(|e| WorkerError::storage(e.to_string()))?;
        if !self.changed(&on_disk) {
            debug!(version = %self.running, "Config version unchanged");
            return Ok(false);
        }
        println!("update available: {} -> {}, run `install`", self.running, on_disk.version);
        Ok(true)
    }
}

/// Location from `SAFECAMPUS_LOCATION`, unavailable when unset or malformed.
pub struct EnvLocation;

impl EnvLocation {
    fn parse(value: &str) -> Option<Coordinates> {
        let (lat, lng) = value.split_once(',')?;
        Some(Coordinates {
            latitude: lat.trim().parse().ok()?,
            longitude: lng.trim().parse().ok()?,
        })
    }
}

#[async_trait]
impl LocationProvider for EnvLocation {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> std::result::Result<Coordinates, LocationError> {
        std::env::var(LOCATION_ENV)
            .ok()
            .and_then(|value| Self::parse(&value))
            .ok_or(LocationError::PositionUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let coords = EnvLocation::parse("40.11, -88.22").unwrap();
        assert_eq!(coords.latitude, 40.11);
        assert_eq!(coords.longitude, -88.22);
        assert!(EnvLocation::parse("north hall").is_none());
        assert!(EnvLocation::parse("40.1").is_none());
    }

    #[test]
    fn test_registration_detects_version_change() {
        let registration = ConfigRegistration::new("v2.1");
        assert!(!registration.changed(&WorkerConfig::default()));
        let next = WorkerConfig {
            version: "v2.2".to_string(),
            ..WorkerConfig::default()
        };
        assert!(registration.changed(&next));
    }
}
