//! HTTP webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::{CompletionNotification, NotifyError, Notifier};

/// POSTs completion notifications as JSON to a configured URL.
///
/// Without a URL every delivery is a successful no-op.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    /// Create a notifier for `url` with a per-request `timeout`.
    ///
    /// A blank URL is treated as no URL.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
            retry: RetryPolicy::no_retry(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn post_once(&self, url: &str, notification: &CompletionNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &CompletionNotification) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            debug!(job_id = %notification.job_id, "no webhook configured; skipping delivery");
            return Ok(());
        };

        let mut retries = 0;
        loop {
            match self.post_once(url, notification).await {
                Ok(()) => {
                    info!(job_id = %notification.job_id, retries, "webhook delivered");
                    return Ok(());
                }
                Err(err) if self.retry.should_retry(retries) => {
                    retries += 1;
                    let delay = self.retry.delay_for_retry(retries);
                    warn!(
                        job_id = %notification.job_id,
                        error = %err,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "webhook delivery failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobrelay_core::{JobId, JobStatus, JsonObject, Priority};

    fn notification() -> CompletionNotification {
        CompletionNotification {
            job_id: JobId::new(1),
            task_name: "sync-report".to_string(),
            status: JobStatus::Completed,
            priority: Priority::High,
            payload: JsonObject::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_url_is_a_no_op() {
        let notifier = WebhookNotifier::new(None, Duration::from_secs(1)).unwrap();
        assert!(!notifier.is_enabled());
        assert!(notifier.deliver(&notification()).await.is_ok());

        let blank = WebhookNotifier::new(Some("  ".to_string()), Duration::from_secs(1)).unwrap();
        assert!(!blank.is_enabled());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed on test machines.
        let notifier = WebhookNotifier::new(
            Some("http://127.0.0.1:9/hook".to_string()),
            Duration::from_millis(500),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::fixed(1, Duration::from_millis(10)));

        let err = notifier.deliver(&notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
