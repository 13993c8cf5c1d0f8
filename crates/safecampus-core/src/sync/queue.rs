use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{AlertDelivery, AlertStore};
use crate::error::Result;
use crate::models::{EmergencyAlert, QueuedAlert};

/// Counts from one `drain` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DrainResult {
    pub delivered: usize,
    pub still_queued: usize,
    pub failed_this_pass: usize,
}

/// Alerts that could not be delivered, retried on sync triggers.
///
/// Delivery is at-least-once and best effort. There is no backoff schedule
/// and no queue-wide lock: overlapping drains may deliver the same alert
/// twice, but never lose one.
#[derive(Clone)]
pub struct SyncQueue {
    store: Arc<dyn AlertStore>,
    delivery: Arc<dyn AlertDelivery>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn AlertStore>, delivery: Arc<dyn AlertDelivery>) -> Self {
        Self { store, delivery }
    }

    pub async fn enqueue(&self, payload: EmergencyAlert) -> Result<QueuedAlert> {
        let alert = QueuedAlert::new(payload);
        self.push(alert.clone()).await?;
        Ok(alert)
    }

    /// Queue an alert that already has an id, e.g. after a failed first attempt.
    pub async fn push(&self, alert: QueuedAlert) -> Result<()> {
        let id = alert.id.clone();
        self.store.append(alert).await?;
        info!(alert_id = %id, "Alert queued for retry");
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn drain(&self) -> Result<DrainResult> {
        let queued = self.store.list().await?;
        if queued.is_empty() {
            return Ok(DrainResult::default());
        }

        info!(count = queued.len(), "Draining offline alerts");
        let mut result = DrainResult::default();
        for alert in queued {
            match self.delivery.deliver(&alert).await {
                Ok(()) => {
                    result.delivered += 1;
                    if let Err(e) = self.store.remove(&alert.id).await {
                        // Delivered but still stored: the next drain resends it.
                        error!(alert_id = %alert.id, error = %e, "Failed to remove delivered alert");
                    }
                    info!(alert_id = %alert.id, "Queued alert delivered");
                }
                Err(e) => {
                    result.failed_this_pass += 1;
                    match self.store.record_failure(&alert.id, &e.to_string()).await {
                        Ok(Some(attempts)) => {
                            warn!(alert_id = %alert.id, attempts = attempts, error = %e, "Queued alert delivery failed");
                        }
                        Ok(None) => {
                            info!(alert_id = %alert.id, "Alert was delivered by an overlapping drain");
                        }
                        Err(store_err) => {
                            error!(alert_id = %alert.id, error = %store_err, "Failed to record delivery failure");
                        }
                    }
                }
            }
        }

        result.still_queued = self.len().await?;
        info!(
            delivered = result.delivered,
            failed = result.failed_this_pass,
            still_queued = result.still_queued,
            "Drain pass complete"
        );
        Ok(result)
    }
}
