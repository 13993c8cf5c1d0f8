//! Worker configuration management.
//!
//! This module handles loading and saving the worker configuration, which
//! includes the worker version, the static asset manifest, routing prefixes
//! and the installability prompt delays.
//!
//! Configuration is stored at `~/.config/safecampus/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "safecampus";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Version string reported over `GET_VERSION` and baked into tier names.
pub const DEFAULT_VERSION: &str = "v2.1";

/// App logo, used as a precached upload and as notification iconography.
pub const LOGO_PATH: &str = "/lovable-uploads/d3cad07d-531f-4c17-b4f7-419efa7716f0.png";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub version: String,
    pub cache_prefix: String,
    /// Paths precached into the static tier at install, in order.
    pub static_manifest: Vec<String>,
    pub uploads_prefix: String,
    pub api_prefix: String,
    pub update_interval_secs: u64,
    pub ios_prompt_delay_ms: u64,
    pub native_prompt_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Base URL the host resolves relative paths against.
    pub origin: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            cache_prefix: APP_NAME.to_string(),
            static_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                LOGO_PATH.to_string(),
            ],
            uploads_prefix: "/lovable-uploads/".to_string(),
            api_prefix: "/api/".to_string(),
            update_interval_secs: 60,
            ios_prompt_delay_ms: 3000,
            native_prompt_delay_ms: 5000,
            request_timeout_secs: 30,
            origin: None,
        }
    }
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn static_tier(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.version)
    }

    pub fn dynamic_tier(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.version)
    }

    /// Whether `name` belongs to this version and survives activation.
    pub fn is_current_tier(&self, name: &str) -> bool {
        name == self.static_tier() || name == self.dynamic_tier()
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn ios_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.ios_prompt_delay_ms)
    }

    pub fn native_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.native_prompt_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
