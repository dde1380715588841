//! Job failure alerting.
//!
//! Fire-and-forget: delivery failures are logged and swallowed, never raised
//! to the harness, so an alerting outage cannot mask the original job error.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// Payload delivered when a job run fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailureAlert {
    pub job_name: String,
    pub job_key: String,
    pub error: String,
    pub duration_ms: u64,
}

/// Interface to the notification system.
#[async_trait]
pub trait JobAlerter: Send + Sync {
    /// Report a failed run. Implementations must swallow their own errors.
    async fn alert_failure(&self, alert: JobFailureAlert);
}

/// Discards alerts. Useful for tooling and one-off invocations.
#[derive(Debug, Default)]
pub struct NoopAlerter;

#[async_trait]
impl JobAlerter for NoopAlerter {
    async fn alert_failure(&self, _alert: JobFailureAlert) {}
}

/// Posts alerts as JSON to a webhook endpoint.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl JobAlerter for WebhookAlerter {
    async fn alert_failure(&self, alert: JobFailureAlert) {
        let result = self.client.post(&self.url).json(&alert).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    job_name = %alert.job_name,
                    status = %response.status(),
                    "alert webhook rejected job failure alert"
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    job_name = %alert.job_name,
                    error = %err,
                    "failed to deliver job failure alert"
                );
            }
        }
    }
}
