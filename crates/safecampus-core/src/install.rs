//! Installability tracking for the foreground app.
//!
//! State machine over platform install signals:
//!
//! ```text
//! Unknown -> NotInstallable | Installable -> Prompting -> Installed | Dismissed
//! * -> Installed   (platform install confirmation, standalone display mode)
//! ```
//!
//! iOS has no native install offer, so the tracker synthesizes
//! `Installable` and later shows manual instructions. On Android and
//! desktop the native offer is captured, held, and invoked on request.
//! Time is passed in explicitly; the foreground calls `poll` from its own
//! timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::Result;

/// Session storage key recording an explicit dismissal.
pub const DISMISSED_KEY: &str = "pwa-install-dismissed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Platform {
    Ios,
    Android,
    Desktop,
    Unknown,
}

impl Platform {
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ua.trim().is_empty() {
            Platform::Unknown
        } else if ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d)) {
            Platform::Ios
        } else if ua.contains("android") {
            Platform::Android
        } else {
            Platform::Desktop
        }
    }
}

/// What the foreground learns from the platform at page load.
#[derive(Debug, Clone, Default)]
pub struct PlatformSignals {
    pub user_agent: String,
    /// `(display-mode: standalone)` matches.
    pub display_standalone: bool,
    /// iOS `navigator.standalone`.
    pub ios_standalone: bool,
}

impl PlatformSignals {
    pub fn is_standalone(&self) -> bool {
        self.display_standalone || self.ios_standalone
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum InstallPhase {
    Unknown,
    NotInstallable,
    Installable,
    Prompting,
    Installed,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// How the prompt is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum PromptKind {
    /// Numbered manual steps (iOS share sheet).
    ManualInstructions,
    /// Invokes the captured native offer.
    NativeOffer,
}

/// A captured native install offer. Invoking it asks the user to install.
#[async_trait]
pub trait InstallOffer: Send + Sync {
    async fn prompt(&self) -> Result<InstallOutcome>;
}

/// Session-scoped key-value flags, cleared when the browsing session ends.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|v| v.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct InstallState {
    pub platform: Platform,
    pub phase: InstallPhase,
    pub installable: bool,
    pub installed: bool,
    pub standalone: bool,
    pub has_deferred_prompt: bool,
    pub prompt_visible: bool,
    pub prompt_kind: Option<PromptKind>,
}

pub struct InstallabilityTracker {
    platform: Platform,
    phase: InstallPhase,
    standalone: bool,
    deferred: Option<Arc<dyn InstallOffer>>,
    prompt_at: Option<Instant>,
    session: Arc<dyn SessionStore>,
    ios_prompt_delay: Duration,
    native_prompt_delay: Duration,
}

impl InstallabilityTracker {
    /// Derive the state for a fresh page load.
    pub fn initialize(
        signals: &PlatformSignals,
        session: Arc<dyn SessionStore>,
        config: &WorkerConfig,
        now: Instant,
    ) -> Self {
        let platform = Platform::detect(&signals.user_agent);
        let standalone = signals.is_standalone();
        let mut tracker = Self {
            platform,
            phase: InstallPhase::Unknown,
            standalone,
            deferred: None,
            prompt_at: None,
            session,
            ios_prompt_delay: config.ios_prompt_delay(),
            native_prompt_delay: config.native_prompt_delay(),
        };

        tracker.phase = if standalone {
            InstallPhase::Installed
        } else {
            match platform {
                Platform::Ios => {
                    tracker.schedule_prompt(now + tracker.ios_prompt_delay);
                    InstallPhase::Installable
                }
                Platform::Unknown => InstallPhase::NotInstallable,
                // Waits for the native offer
                Platform::Android | Platform::Desktop => InstallPhase::Unknown,
            }
        };
        info!(platform = ?platform, phase = ?tracker.phase, standalone = standalone, "Installability initialized");
        tracker
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    fn is_suppressed(&self) -> bool {
        self.session.get(DISMISSED_KEY).as_deref() == Some("true")
    }

    fn schedule_prompt(&mut self, at: Instant) {
        if !self.is_suppressed() {
            self.prompt_at = Some(at);
        }
    }

    fn mark_installed(&mut self) {
        self.phase = InstallPhase::Installed;
        self.deferred = None;
        self.prompt_at = None;
    }

    /// The platform offered a native install prompt. Its default UI is
    /// suppressed by the caller; the offer is held until invoked.
    pub fn capture(&mut self, offer: Arc<dyn InstallOffer>, now: Instant) {
        if self.phase == InstallPhase::Installed {
            debug!("Ignoring install offer, already installed");
            return;
        }
        info!("Install offer captured");
        self.deferred = Some(offer);
        let dismissed = self.phase == InstallPhase::Dismissed && self.is_suppressed();
        if self.phase != InstallPhase::Prompting && !dismissed {
            self.phase = InstallPhase::Installable;
        }
        self.schedule_prompt(now + self.native_prompt_delay);
    }

    /// Advance timers. Returns whether the phase changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = matches!(self.prompt_at, Some(at) if now >= at);
        if !due {
            return false;
        }
        self.prompt_at = None;
        if self.phase == InstallPhase::Installable && !self.is_suppressed() {
            self.phase = InstallPhase::Prompting;
            debug!(platform = ?self.platform, "Showing install prompt");
            return true;
        }
        false
    }

    /// Invoke the held native offer. `None` when there is nothing to invoke.
    pub async fn invoke(&mut self) -> Result<Option<InstallOutcome>> {
        let Some(offer) = self.deferred.clone() else {
            debug!("No install prompt available");
            return Ok(None);
        };

        let outcome = offer.prompt().await.map_err(|e| {
            warn!(error = %e, "Install prompt failed");
            e
        })?;
        info!(outcome = ?outcome, "Install prompt resolved");

        match outcome {
            InstallOutcome::Accepted => self.mark_installed(),
            InstallOutcome::Dismissed => {
                // Installation may have completed while the prompt was open
                if self.phase != InstallPhase::Installed {
                    self.phase = InstallPhase::Installable;
                }
            }
        }
        Ok(Some(outcome))
    }

    /// The user closed the prompt. Suppresses it for the rest of the session.
    pub fn dismiss(&mut self) {
        if self.phase == InstallPhase::Installed {
            return;
        }
        self.session.set(DISMISSED_KEY, "true");
        self.phase = InstallPhase::Dismissed;
        self.deferred = None;
        self.prompt_at = None;
        info!("Install prompt dismissed for this session");
    }

    /// Install confirmed by the platform, including installs from browser chrome.
    pub fn on_app_installed(&mut self) {
        info!("App was installed");
        self.mark_installed();
    }

    pub fn on_display_mode_change(&mut self, standalone: bool) {
        self.standalone = standalone;
        if standalone {
            debug!(previous = ?self.phase, "Standalone display mode detected");
            self.mark_installed();
        }
    }

    pub fn state(&self) -> InstallState {
        let installed = self.phase == InstallPhase::Installed;
        let held_offer = self.deferred.is_some();
        let installable = (matches!(self.phase, InstallPhase::Installable | InstallPhase::Prompting) && held_offer)
            || (self.platform == Platform::Ios && !installed);
        let prompt_visible = self.phase == InstallPhase::Prompting && !installed && !self.is_suppressed();
        let prompt_kind = match self.platform {
            Platform::Ios => Some(PromptKind::ManualInstructions),
            Platform::Android | Platform::Desktop if held_offer => Some(PromptKind::NativeOffer),
            _ => None,
        };
        InstallState {
            platform: self.platform,
            phase: self.phase,
            installable,
            installed,
            standalone: self.standalone,
            has_deferred_prompt: held_offer,
            prompt_visible,
            prompt_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInstallOffer;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Chrome/120.0 Mobile";
    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0";

    fn signals(ua: &str) -> PlatformSignals {
        PlatformSignals {
            user_agent: ua.to_string(),
            ..Default::default()
        }
    }

    fn tracker(ua: &str, now: Instant) -> (InstallabilityTracker, Arc<MemorySessionStore>) {
        let session = Arc::new(MemorySessionStore::new());
        let tracker = InstallabilityTracker::initialize(
            &signals(ua),
            Arc::clone(&session) as Arc<dyn SessionStore>,
            &WorkerConfig::default(),
            now,
        );
        (tracker, session)
    }

    #[test]
    fn test_platform_detect() {
        assert_eq!(Platform::detect(IPHONE_UA), Platform::Ios);
        assert_eq!(Platform::detect("Mozilla/5.0 (iPad; CPU OS 16_0)"), Platform::Ios);
        assert_eq!(Platform::detect(ANDROID_UA), Platform::Android);
        assert_eq!(Platform::detect(DESKTOP_UA), Platform::Desktop);
        assert_eq!(Platform::detect(""), Platform::Unknown);
    }

    #[test]
    fn test_ios_prompts_after_delay() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(IPHONE_UA, start);
        assert_eq!(tracker.phase(), InstallPhase::Installable);
        assert!(tracker.state().installable);

        assert!(!tracker.poll(start + Duration::from_millis(2999)));
        assert!(tracker.poll(start + Duration::from_millis(3000)));
        let state = tracker.state();
        assert_eq!(state.phase, InstallPhase::Prompting);
        assert!(state.prompt_visible);
        assert_eq!(state.prompt_kind, Some(PromptKind::ManualInstructions));

        // Never resolves on its own
        assert!(!tracker.poll(start + Duration::from_secs(3600)));
        assert_eq!(tracker.phase(), InstallPhase::Prompting);
    }

    #[test]
    fn test_standalone_at_load_is_installed() {
        let session = Arc::new(MemorySessionStore::new());
        let tracker = InstallabilityTracker::initialize(
            &PlatformSignals {
                user_agent: IPHONE_UA.to_string(),
                ios_standalone: true,
                ..Default::default()
            },
            session,
            &WorkerConfig::default(),
            Instant::now(),
        );
        let state = tracker.state();
        assert!(state.installed);
        assert!(state.standalone);
        assert!(!state.installable);
    }

    #[test]
    fn test_native_offer_capture_then_prompt() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(ANDROID_UA, start);
        assert_eq!(tracker.phase(), InstallPhase::Unknown);
        assert!(!tracker.state().installable);

        tracker.capture(Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted)), start);
        assert_eq!(tracker.phase(), InstallPhase::Installable);
        assert!(tracker.state().installable);

        assert!(!tracker.poll(start + Duration::from_secs(4)));
        assert!(tracker.poll(start + Duration::from_secs(5)));
        assert_eq!(tracker.state().prompt_kind, Some(PromptKind::NativeOffer));
    }

    #[tokio::test]
    async fn test_invoke_accepted_installs_and_discards_offer() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(DESKTOP_UA, start);
        let offer = Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted));
        tracker.capture(Arc::clone(&offer) as Arc<dyn InstallOffer>, start);
        tracker.poll(start + Duration::from_secs(5));

        let outcome = tracker.invoke().await.unwrap();
        assert_eq!(outcome, Some(InstallOutcome::Accepted));
        let state = tracker.state();
        assert!(state.installed);
        assert!(!state.has_deferred_prompt);
        assert!(!state.prompt_visible);
        assert_eq!(offer.prompts(), 1);
    }

    #[tokio::test]
    async fn test_invoke_dismissed_keeps_offer_for_reuse() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(ANDROID_UA, start);
        let offer = Arc::new(FakeInstallOffer::new(InstallOutcome::Dismissed));
        tracker.capture(Arc::clone(&offer) as Arc<dyn InstallOffer>, start);
        tracker.poll(start + Duration::from_secs(5));

        assert_eq!(tracker.invoke().await.unwrap(), Some(InstallOutcome::Dismissed));
        assert_eq!(tracker.phase(), InstallPhase::Installable);
        assert!(tracker.state().has_deferred_prompt);

        offer.set_outcome(InstallOutcome::Accepted);
        assert_eq!(tracker.invoke().await.unwrap(), Some(InstallOutcome::Accepted));
        assert_eq!(tracker.phase(), InstallPhase::Installed);
        assert_eq!(offer.prompts(), 2);
    }

    #[tokio::test]
    async fn test_invoke_without_offer_is_noop() {
        let (mut tracker, _) = tracker(DESKTOP_UA, Instant::now());
        assert_eq!(tracker.invoke().await.unwrap(), None);
        assert_eq!(tracker.phase(), InstallPhase::Unknown);
    }

    #[test]
    fn test_dismiss_suppresses_prompt_for_session() {
        let start = Instant::now();
        let (mut tracker, session) = tracker(IPHONE_UA, start);
        tracker.poll(start + Duration::from_secs(3));
        tracker.dismiss();
        assert_eq!(tracker.phase(), InstallPhase::Dismissed);
        assert_eq!(session.get(DISMISSED_KEY).as_deref(), Some("true"));
        assert!(!tracker.state().prompt_visible);

        // A reload within the same session never prompts again
        let mut reloaded = InstallabilityTracker::initialize(
            &signals(IPHONE_UA),
            Arc::clone(&session) as Arc<dyn SessionStore>,
            &WorkerConfig::default(),
            start,
        );
        assert!(!reloaded.poll(start + Duration::from_secs(60)));
        assert_eq!(reloaded.phase(), InstallPhase::Installable);
    }

    #[test]
    fn test_capture_after_dismiss_does_not_prompt() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(ANDROID_UA, start);
        tracker.dismiss();
        tracker.capture(Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted)), start);
        assert_eq!(tracker.phase(), InstallPhase::Dismissed);
        assert!(!tracker.poll(start + Duration::from_secs(10)));
        assert_eq!(tracker.phase(), InstallPhase::Dismissed);
        assert!(!tracker.state().prompt_visible);
    }

    #[test]
    fn test_standalone_collapses_prompting() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(ANDROID_UA, start);
        tracker.capture(Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted)), start);
        tracker.poll(start + Duration::from_secs(5));
        assert_eq!(tracker.phase(), InstallPhase::Prompting);

        tracker.on_display_mode_change(true);
        let state = tracker.state();
        assert_eq!(state.phase, InstallPhase::Installed);
        assert!(state.standalone);
        assert!(!state.prompt_visible);
    }

    #[test]
    fn test_app_installed_from_browser_chrome() {
        let start = Instant::now();
        let (mut tracker, _) = tracker(DESKTOP_UA, start);
        tracker.capture(Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted)), start);
        tracker.on_app_installed();
        assert!(tracker.state().installed);
        assert!(!tracker.poll(start + Duration::from_secs(10)));
        tracker.capture(Arc::new(FakeInstallOffer::new(InstallOutcome::Accepted)), start);
        assert!(!tracker.state().has_deferred_prompt);
    }

    #[test]
    fn test_unknown_platform_is_not_installable() {
        let (tracker, _) = tracker("", Instant::now());
        assert_eq!(tracker.phase(), InstallPhase::NotInstallable);
        assert!(!tracker.state().installable);
    }
}
