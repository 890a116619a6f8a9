use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::format_time;
use crate::model::Reservation;

/// One outbound message for the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    #[serde(rename = "message")]
    pub body: String,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Logs instead of delivering. Used when no messaging service is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
        tracing::info!("notification to {}: {}", n.recipient, n.subject);
        Ok(())
    }
}

/// POSTs `{recipient, subject, message}` as JSON; any non-2xx status is a failure.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(n)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError(format!("service returned {}", resp.status())));
        }
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and counted, never returned.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Spawn delivery and return immediately. Call only after the state change committed.
    pub fn dispatch(&self, notification: Notification) -> tokio::task::JoinHandle<()> {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match notifier.send(&notification).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL, "outcome" => "sent")
                        .increment(1);
                    tracing::debug!("notification sent to {}", notification.recipient);
                }
                Err(e) => {
                    metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL, "outcome" => "failed")
                        .increment(1);
                    tracing::warn!("{e} (recipient {})", notification.recipient);
                }
            }
        })
    }
}

// ── Message content ──────────────────────────────────────────────

pub fn confirmation(r: &Reservation, restaurant: &str) -> Notification {
    Notification {
        recipient: r.email.clone(),
        subject: format!("Reservation confirmed - {restaurant}"),
        body: format!(
            "Dear {name},\n\n\
             your reservation is confirmed.\n\n\
             - Date: {date}\n\
             - Time: {time}\n\
             - Guests: {guests}\n\
             - Table: {table}\n\n\
             We look forward to seeing you.\n\n\
             The {restaurant} team",
            name = r.name,
            date = r.date,
            time = format_time(r.time),
            guests = r.guests,
            table = r.table_id,
        ),
    }
}

pub fn rejection(r: &Reservation, restaurant: &str) -> Notification {
    Notification {
        recipient: r.email.clone(),
        subject: format!("Reservation not available - {restaurant}"),
        body: format!(
            "Dear {name},\n\n\
             we are sorry, we cannot confirm your reservation.\n\n\
             - Date: {date}\n\
             - Time: {time}\n\
             - Guests: {guests}\n\n\
             Please contact us or book another date.\n\n\
             The {restaurant} team",
            name = r.name,
            date = r.date,
            time = format_time(r.time),
            guests = r.guests,
        ),
    }
}
