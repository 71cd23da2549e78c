//! Alert delivery for overdue accounts.
//!
//! The sweep hands every alert to a [`Notifier`]. By default alerts are only
//! logged; configuring `alerts.webhook_url` forwards them as JSON to an
//! external delivery service instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AlertConfig;
use crate::errors::{LapseError, LapseResult};

/// What an alert is telling the account holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Payment is overdue; some grace days remain.
    Reminder,
    /// Last day of the grace period.
    BlockedWarning,
    /// Grace period has expired and access is now blocked.
    Blocked,
}

impl AlertKind {
    pub(crate) fn for_remaining_days(remaining: i64) -> Self {
        if remaining == 0 {
            AlertKind::BlockedWarning
        } else {
            AlertKind::Reminder
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Reminder => "reminder",
            AlertKind::BlockedWarning => "blocked-warning",
            AlertKind::Blocked => "blocked",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub account_id: String,
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn new(account_id: impl Into<String>, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Delivers alerts to account holders.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> LapseResult<()>;
}

/// Writes alerts to the log and nothing else.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, alert: &Alert) -> LapseResult<()> {
        info!(
            account_id = %alert.account_id,
            kind = %alert.kind,
            message = %alert.message,
            "Billing alert"
        );
        Ok(())
    }
}

/// Posts alerts as JSON to an HTTP endpoint.
///
/// The URL may carry a delivery secret, so only its host is ever logged.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> LapseResult<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| LapseError::ConfigError(format!("invalid alert webhook URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LapseError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    /// Host the alerts are delivered to.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_alert(&self, alert: &Alert) -> LapseResult<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                LapseError::NotificationError(format!("webhook request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                account_id = %alert.account_id,
                host = %self.host(),
                status = %status.as_u16(),
                "Alert webhook rejected delivery"
            );
            return Err(LapseError::NotificationError(format!(
                "webhook returned status {status}"
            )));
        }

        Ok(())
    }
}

/// Pick the notifier described by the alert configuration.
pub fn notifier_from_config(config: &AlertConfig) -> LapseResult<Arc<dyn Notifier>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            let notifier =
                WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
            info!(host = %notifier.host(), "Delivering billing alerts via webhook");
            Ok(Arc::new(notifier))
        }
        _ => {
            info!("No alert webhook configured; billing alerts will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_kind_serializes_kebab_case() {
        let alert = Alert::new("acct-1", AlertKind::BlockedWarning, "last day");
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"blocked-warning\""));
        assert_eq!(AlertKind::Reminder.to_string(), "reminder");
    }

    #[test]
    fn remaining_days_pick_kind() {
        assert_eq!(AlertKind::for_remaining_days(0), AlertKind::BlockedWarning);
        assert_eq!(AlertKind::for_remaining_days(7), AlertKind::Reminder);
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let alert = Alert::new("acct-1", AlertKind::Reminder, "3 days left");
        assert!(LogNotifier.send_alert(&alert).await.is_ok());
    }

    #[test]
    fn empty_webhook_url_falls_back_to_logging() {
        let config = AlertConfig {
            webhook_url: Some("  ".to_string()),
            timeout_secs: 5,
        };
        assert!(notifier_from_config(&config).is_ok());
    }

    #[test]
    fn webhook_exposes_only_its_host() {
        let notifier = WebhookNotifier::new(
            "https://hooks.example.com/services/T000/B000/s3cret?token=abc",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(notifier.host(), "hooks.example.com");
    }

    #[test]
    fn malformed_webhook_url_is_a_config_error() {
        let config = AlertConfig {
            webhook_url: Some("not a url".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(
            notifier_from_config(&config),
            Err(LapseError::ConfigError(_))
        ));
    }
}
