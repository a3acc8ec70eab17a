//! Notification channels and the alert dispatcher
//!
//! Alerts leave the core through a bounded mpsc queue. The dispatcher task
//! drains it and delivers each alert on its own task with exponential
//! backoff, so a slow or failing channel never stalls routing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sy_common::{Alert, AlertConfig, AlertSeverity};

use crate::error::NotifyError;

/// External sink for alerts (pager, chat webhook, log)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the tracing log
#[derive(Debug, Default)]
pub struct LogNotificationChannel;

#[async_trait]
impl NotificationChannel for LogNotificationChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Error => error!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                payload = %alert.payload,
                "ALERT"
            ),
            AlertSeverity::Warn => warn!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                payload = %alert.payload,
                "ALERT"
            ),
            AlertSeverity::Info => info!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                payload = %alert.payload,
                "ALERT"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoOpNotificationChannel;

#[async_trait]
impl NotificationChannel for NoOpNotificationChannel {
    fn name(&self) -> &str {
        "noop"
    }

    async fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook URL
pub struct WebhookNotificationChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationChannel {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotificationChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(alert_id = %alert.id, status = status.as_u16(), "Webhook notification delivered");
        Ok(())
    }
}

/// Retry schedule for a single delivery
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl DispatchPolicy {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            max_attempts: config.dispatch_max_attempts,
            initial_backoff: Duration::from_millis(config.dispatch_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.dispatch_max_backoff_ms),
        }
    }
}

const BACKOFF_MULTIPLIER: u32 = 2;

/// Deliver one alert, retrying with capped exponential backoff.
/// Returns whether delivery eventually succeeded.
pub async fn deliver_with_retry(
    channel: &dyn NotificationChannel,
    alert: &Alert,
    policy: &DispatchPolicy,
) -> bool {
    let mut backoff = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        match channel.notify(alert).await {
            Ok(()) => {
                metrics::counter!("switchyard_alert_dispatch_total", "outcome" => "delivered").increment(1);
                return true;
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    alert_id = %alert.id,
                    channel = channel.name(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Alert delivery failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * BACKOFF_MULTIPLIER).min(policy.max_backoff);
            }
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    channel = channel.name(),
                    attempts = attempt,
                    error = %e,
                    "Alert delivery failed, giving up"
                );
            }
        }
    }
    metrics::counter!("switchyard_alert_dispatch_total", "outcome" => "failed").increment(1);
    false
}

/// Drain the alert queue until every sender is gone.
pub fn spawn_dispatcher(
    channel: Arc<dyn NotificationChannel>,
    mut rx: mpsc::Receiver<Alert>,
    policy: DispatchPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(channel = channel.name(), "Alert dispatcher started");
        while let Some(alert) = rx.recv().await {
            let channel = channel.clone();
            let policy = policy.clone();
            tokio::spawn(async move {
                deliver_with_retry(channel.as_ref(), &alert, &policy).await;
            });
        }
        info!(channel = channel.name(), "Alert dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use sy_common::AlertType;

    struct FlakyChannel {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(NotifyError::Channel("unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn alert() -> Alert {
        Alert::new(AlertType::HighLoad, "system".to_string(), json!({"load": 0.9}), Utc::now())
    }

    fn policy(max_attempts: u32) -> DispatchPolicy {
        DispatchPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let channel = FlakyChannel { failures: 2, calls: AtomicU32::new(0) };
        assert!(deliver_with_retry(&channel, &alert(), &policy(5)).await);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let channel = FlakyChannel { failures: 10, calls: AtomicU32::new(0) };
        assert!(!deliver_with_retry(&channel, &alert(), &policy(3)).await);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatcher_exits_when_senders_drop() {
        let channel = Arc::new(FlakyChannel { failures: 0, calls: AtomicU32::new(0) });
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_dispatcher(channel.clone(), rx, policy(1));

        tx.send(alert()).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        for _ in 0..50 {
            if channel.calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_webhook_posts_alert_json() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookNotificationChannel::new(format!("{}/alerts", server.uri())).unwrap();
        channel.notify(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_rejected() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let channel = WebhookNotificationChannel::new(server.uri()).unwrap();
        let err = channel.notify(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 503 }));
    }
}
