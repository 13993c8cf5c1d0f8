//! Delivery of emergency alerts to the alerting backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{Result, WorkerError};
use crate::models::QueuedAlert;

/// Path the alerting backend accepts alerts on, relative to the app origin.
const ALERTS_ENDPOINT: &str = "/api/emergency-alerts";

/// Alerts are small; a short timeout gets them queued quickly when the network is bad.
const DELIVERY_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait AlertDelivery: Send + Sync {
    /// Deliver one alert. Any error leaves the alert queued.
    async fn deliver(&self, alert: &QueuedAlert) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpAlertDelivery {
    client: Client,
    endpoint: Url,
}

impl HttpAlertDelivery {
    pub fn new(origin: &str) -> Result<Self> {
        let endpoint = Url::parse(origin)
            .and_then(|base| base.join(ALERTS_ENDPOINT))
            .map_err(|e| WorkerError::InvalidRequest(format!("{}: {}", origin, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
            .map_err(|e| WorkerError::delivery(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AlertDelivery for HttpAlertDelivery {
    async fn deliver(&self, alert: &QueuedAlert) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(alert)
            .send()
            .await
            .map_err(|e| WorkerError::delivery(format!("Network unavailable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::delivery(format!("Status {}: {}", status, body)));
        }
        debug!(alert_id = %alert.id, status = status.as_u16(), "Alert delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_origin() {
        let delivery = HttpAlertDelivery::new("https://campus.test/app/").unwrap();
        assert_eq!(delivery.endpoint().as_str(), "https://campus.test/api/emergency-alerts");
    }

    #[test]
    fn test_invalid_origin() {
        assert!(HttpAlertDelivery::new("campus").is_err());
    }
}
