//! The emergency button: locate, send, and fall back to the offline queue.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{EmergencyAlert, QueuedAlert};
use crate::platform::{LocationProvider, PositionOptions, SyncRegistrar};
use crate::state::{contact_count, EmergencyEvent, EventStatus, LocalState};
use crate::sync::{AlertDelivery, SyncQueue, EMERGENCY_ALERT_TAG};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum EmergencyOutcome {
    Sent,
    /// Delivery failed; the alert waits for a background sync.
    Queued { alert_id: String },
    /// No contacts configured, nothing was sent.
    NoContacts,
}

pub struct EmergencyFlow {
    location: Arc<dyn LocationProvider>,
    delivery: Arc<dyn AlertDelivery>,
    queue: SyncQueue,
    registrar: Arc<dyn SyncRegistrar>,
    state: Arc<LocalState>,
}

impl EmergencyFlow {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        delivery: Arc<dyn AlertDelivery>,
        queue: SyncQueue,
        registrar: Arc<dyn SyncRegistrar>,
        state: Arc<LocalState>,
    ) -> Self {
        Self {
            location,
            delivery,
            queue,
            registrar,
            state,
        }
    }

    pub async fn trigger(&self) -> Result<EmergencyOutcome> {
        let contacts = self.state.contacts().await?;
        let notified = contact_count(&contacts);
        if notified == 0 {
            warn!("Emergency triggered with no contacts configured");
            return Ok(EmergencyOutcome::NoContacts);
        }

        let location = match self.location.current_position(PositionOptions::default()).await {
            Ok(coords) => Some(coords),
            Err(e) => {
                warn!(error = %e, "Sending alert without location");
                None
            }
        };

        let mut alert = QueuedAlert::new(EmergencyAlert::new(location, contacts));
        let outcome = match self.delivery.deliver(&alert).await {
            Ok(()) => {
                info!(alert_id = %alert.id, contacts = notified, "Emergency alert sent");
                EmergencyOutcome::Sent
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "Emergency alert delivery failed, queueing");
                alert.attempts = 1;
                alert.last_error = Some(e.to_string());
                let alert_id = alert.id.clone();
                self.queue.push(alert).await?;
                if let Err(e) = self.registrar.register(EMERGENCY_ALERT_TAG).await {
                    warn!(error = %e, "Background sync unavailable, alert waits for the next drain");
                }
                EmergencyOutcome::Queued { alert_id }
            }
        };

        let event = EmergencyEvent {
            triggered_at: Utc::now(),
            location,
            contacts_notified: notified,
            status: match outcome {
                EmergencyOutcome::Queued { .. } => EventStatus::Queued,
                _ => EventStatus::Sent,
            },
            alert_id: match &outcome {
                EmergencyOutcome::Queued { alert_id } => Some(alert_id.clone()),
                _ => None,
            },
        };
        if let Err(e) = self.state.record_event(event).await {
            error!(error = %e, "Failed to record emergency history");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocationError;
    use crate::sync::MemoryAlertStore;
    use crate::testing::{FakeDelivery, FakeLocation, FakeSyncRegistrar};
    use serde_json::json;

    struct Harness {
        flow: EmergencyFlow,
        delivery: Arc<FakeDelivery>,
        registrar: Arc<FakeSyncRegistrar>,
        location: Arc<FakeLocation>,
        queue: SyncQueue,
        state: Arc<LocalState>,
        _dir: tempfile::TempDir,
    }

    fn harness(delivery: FakeDelivery, location: FakeLocation) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(LocalState::new(dir.path().to_path_buf()).unwrap());
        let delivery = Arc::new(delivery);
        let registrar = Arc::new(FakeSyncRegistrar::new());
        let location = Arc::new(location);
        let queue = SyncQueue::new(
            Arc::new(MemoryAlertStore::new()),
            Arc::clone(&delivery) as Arc<dyn AlertDelivery>,
        );
        let flow = EmergencyFlow::new(
            Arc::clone(&location) as Arc<dyn LocationProvider>,
            Arc::clone(&delivery) as Arc<dyn AlertDelivery>,
            queue.clone(),
            Arc::clone(&registrar) as Arc<dyn SyncRegistrar>,
            Arc::clone(&state),
        );
        Harness {
            flow,
            delivery,
            registrar,
            location,
            queue,
            state,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_no_contacts_sends_nothing() {
        let h = harness(FakeDelivery::succeeding(), FakeLocation::at(40.1, -88.2));
        assert_eq!(h.flow.trigger().await.unwrap(), EmergencyOutcome::NoContacts);
        assert_eq!(h.delivery.calls(), 0);
        assert!(h.state.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sent_records_history() {
        let h = harness(FakeDelivery::succeeding(), FakeLocation::at(40.1, -88.2));
        h.state.save_contacts(&json!([{"name": "Campus Security"}])).await.unwrap();

        assert_eq!(h.flow.trigger().await.unwrap(), EmergencyOutcome::Sent);

        let requested = h.location.requests();
        assert_eq!(requested.len(), 1);
        assert!(requested[0].enable_high_accuracy);
        let history = h.state.history().await.unwrap();
        assert_eq!(history[0].status, EventStatus::Sent);
        assert_eq!(history[0].contacts_notified, 1);
        assert_eq!(history[0].location.map(|c| c.latitude), Some(40.1));
        assert!(h.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_location_failure_still_sends() {
        let h = harness(
            FakeDelivery::succeeding(),
            FakeLocation::failing(LocationError::PermissionDenied),
        );
        h.state.save_contacts(&json!([{"name": "Roommate"}])).await.unwrap();

        assert_eq!(h.flow.trigger().await.unwrap(), EmergencyOutcome::Sent);
        assert!(h.state.history().await.unwrap()[0].location.is_none());
    }

    #[tokio::test]
    async fn test_delivery_failure_queues_and_registers_sync() {
        let h = harness(
            FakeDelivery::failing("Network unavailable"),
            FakeLocation::at(40.1, -88.2),
        );
        h.state.save_contacts(&json!([{"name": "Campus Security"}])).await.unwrap();

        let outcome = h.flow.trigger().await.unwrap();
        let EmergencyOutcome::Queued { alert_id } = outcome.clone() else {
            panic!("expected queued outcome, got {:?}", outcome);
        };

        assert_eq!(h.queue.len().await.unwrap(), 1);
        assert_eq!(h.registrar.registered(), vec![EMERGENCY_ALERT_TAG.to_string()]);
        let history = h.state.history().await.unwrap();
        assert_eq!(history[0].status, EventStatus::Queued);
        assert_eq!(history[0].alert_id.as_deref(), Some(alert_id.as_str()));

        h.delivery.set_failing(None);
        let result = h.queue.drain().await.unwrap();
        assert_eq!(result.delivered, 1);
        assert_eq!(h.delivery.delivered_ids(), vec![alert_id]);
    }

    #[tokio::test]
    async fn test_unsupported_background_sync_still_queues() {
        let h = harness(FakeDelivery::failing("offline"), FakeLocation::at(0.0, 0.0));
        h.registrar.set_unsupported(true);
        h.state.save_contacts(&json!([{"name": "Campus Security"}])).await.unwrap();

        assert!(matches!(h.flow.trigger().await.unwrap(), EmergencyOutcome::Queued { .. }));
        assert_eq!(h.queue.len().await.unwrap(), 1);
    }
}
