//! Tamper Alerts
//!
//! The ledger calls a `TamperSignal` with the first broken record. Delivery
//! is best-effort: every transport gets a deadline and its failures are
//! logged, never returned.

pub mod email;
pub mod telegram;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::audit::verify::TamperReport;
use crate::config::AppConfig;

pub use email::SendmailNotifier;
pub use telegram::TelegramNotifier;

/// Hook invoked once when verification finds the first broken record
#[async_trait]
pub trait TamperSignal: Send + Sync {
    async fn on_tamper_detected(&self, report: &TamperReport);
}

/// A single alert transport (mail, chat, ...)
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, message: &str) -> Result<()>;
}

/// Plain-text alert body sent to every transport
pub fn alert_message(report: &TamperReport) -> String {
    format!(
        "ALERT: SecureAuditTrail integrity compromised. Hash: {} (record {}, expected {})",
        report.record.event_hash, report.record.id, report.expected_hash
    )
}

/// Emits the alert as a structured log event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSignal;

#[async_trait]
impl TamperSignal for LogSignal {
    async fn on_tamper_detected(&self, report: &TamperReport) {
        error!(
            record_id = report.record.id,
            event_type = %report.record.event_type,
            kind = ?report.kind,
            stored_hash = %report.record.event_hash,
            expected_hash = %report.expected_hash,
            stored_previous_hash = %report.record.previous_hash,
            expected_previous_hash = %report.expected_previous_hash,
            "{}",
            alert_message(report)
        );
    }
}

/// Logs the alert, then delivers it to every configured transport concurrently
pub struct AlertFanout {
    notifiers: Vec<Box<dyn AlertNotifier>>,
    timeout: Duration,
}

impl AlertFanout {
    pub fn new(timeout: Duration) -> Self {
        Self {
            notifiers: Vec::new(),
            timeout,
        }
    }

    pub fn with_notifier(mut self, notifier: impl AlertNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    /// Enable the transports whose settings are present in `config`
    pub fn from_config(config: &AppConfig) -> Self {
        let mut fanout = Self::new(Duration::from_secs(config.notify_timeout_secs));

        if let Some(recipient) = config.alert_email.as_deref() {
            fanout = fanout.with_notifier(SendmailNotifier::new(
                config.sendmail_path.clone(),
                recipient.to_string(),
            ));
        }

        if let (Some(token), Some(chat_id)) = (
            config.telegram_token.as_deref(),
            config.telegram_chat_id.as_deref(),
        ) {
            fanout = fanout.with_notifier(TelegramNotifier::new(
                config.telegram_api_url.clone(),
                token.to_string(),
                chat_id.to_string(),
            ));
        }

        fanout
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }
}

#[async_trait]
impl TamperSignal for AlertFanout {
    async fn on_tamper_detected(&self, report: &TamperReport) {
        LogSignal.on_tamper_detected(report).await;

        let message = alert_message(report);
        let message = message.as_str();
        let timeout = self.timeout;

        let deliveries = self.notifiers.iter().map(|notifier| async move {
            let outcome = tokio::time::timeout(timeout, notifier.notify(message)).await;
            (notifier.name(), outcome)
        });

        for (name, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(Ok(())) => info!("Tamper alert delivered via {}", name),
                Ok(Err(e)) => warn!("Tamper alert via {} failed: {}", name, e),
                Err(_) => warn!("Tamper alert via {} timed out after {:?}", name, timeout),
            }
        }
    }
}
