//! Emergency alert payloads and their queued form.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// What gets sent to emergency contacts. Contacts are an opaque payload
/// owned by the surrounding UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub contacts: serde_json::Value,
    pub triggered_at: DateTime<Utc>,
}

impl EmergencyAlert {
    pub fn new(location: Option<Coordinates>, contacts: serde_json::Value) -> Self {
        Self {
            location,
            contacts,
            triggered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAlert {
    pub id: String,
    pub payload: EmergencyAlert,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedAlert {
    pub fn new(payload: EmergencyAlert) -> Self {
        Self {
            id: new_alert_id(),
            payload,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// Timestamp-prefixed random id so ids sort roughly by creation.
fn new_alert_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("alert-{}-{:08x}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_alert_starts_clean() {
        let alert = QueuedAlert::new(EmergencyAlert::new(None, serde_json::json!([])));
        assert_eq!(alert.attempts, 0);
        assert!(alert.last_error.is_none());
        assert!(alert.id.starts_with("alert-"));
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let a = QueuedAlert::new(EmergencyAlert::new(None, serde_json::Value::Null));
        let b = QueuedAlert::new(EmergencyAlert::new(None, serde_json::Value::Null));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_parse_queued_alert_without_optional_fields() {
        let json = r#"{"id":"alert-1","payload":{"location":{"latitude":40.1,"longitude":-88.2},"triggered_at":"2026-01-01T00:00:00Z"},"created_at":"2026-01-01T00:00:00Z"}"#;
        let alert: QueuedAlert = serde_json::from_str(json).expect("Failed to parse queued alert JSON");
        assert_eq!(alert.attempts, 0);
        assert_eq!(alert.payload.contacts, serde_json::Value::Null);
        assert_eq!(alert.payload.location.map(|c| c.latitude), Some(40.1));
    }
}
