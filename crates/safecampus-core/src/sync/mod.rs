//! Offline sync queue for emergency alerts.
//!
//! Alerts that fail immediate delivery are persisted here and replayed when
//! the platform fires a background sync (connectivity restored) or a
//! periodic sync.

pub mod delivery;
pub mod queue;
pub mod store;

pub use delivery::{AlertDelivery, HttpAlertDelivery};
pub use queue::{DrainResult, SyncQueue};
pub use store::{AlertStore, JsonAlertStore, MemoryAlertStore};

/// Background sync tag that drains the alert queue.
pub const EMERGENCY_ALERT_TAG: &str = "emergency-alert";

/// Background sync tag for the contact-list synchronization.
pub const CONTACT_SYNC_TAG: &str = "contact-sync";

/// Periodic sync tag for the emergency status check.
pub const EMERGENCY_CHECK_TAG: &str = "emergency-check";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTag {
    EmergencyAlert,
    ContactSync,
    EmergencyCheck,
    Other(String),
}

impl SyncTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            EMERGENCY_ALERT_TAG => SyncTag::EmergencyAlert,
            CONTACT_SYNC_TAG => SyncTag::ContactSync,
            EMERGENCY_CHECK_TAG => SyncTag::EmergencyCheck,
            other => SyncTag::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_tag_parse() {
        assert_eq!(SyncTag::parse("emergency-alert"), SyncTag::EmergencyAlert);
        assert_eq!(SyncTag::parse("contact-sync"), SyncTag::ContactSync);
        assert_eq!(SyncTag::parse("emergency-check"), SyncTag::EmergencyCheck);
        assert_eq!(SyncTag::parse("weekly"), SyncTag::Other("weekly".to_string()));
    }
}
