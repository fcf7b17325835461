use crate::error::NotifyError;
use crate::types::GameDeal;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DealEvent {
    Created,
    Updated,
}

impl std::fmt::Display for DealEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DealNotification {
    pub event: DealEvent,
    pub deal: GameDeal,
}

/// Sink for notable deal changes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: DealEvent, deal: &GameDeal) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: DealEvent, deal: &GameDeal) -> Result<(), NotifyError> {
        info!(
            "[Notifier] {} {} - {:.2} {} ({:.0}% off) {}",
            event,
            deal.title,
            deal.price,
            deal.currency,
            deal.discount_pct * 100.0,
            deal.url
        );
        Ok(())
    }
}

/// Queues notifications for a background forwarder that POSTs them to a webhook.
///
/// The reconciler only waits for the enqueue, never for delivery.
pub struct WebhookNotifier {
    tx: mpsc::Sender<DealNotification>,
}

impl WebhookNotifier {
    pub fn spawn(client: Client, url: &str, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(webhook_forwarder(client, url.to_string(), rx));
        (Self { tx }, handle)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: DealEvent, deal: &GameDeal) -> Result<(), NotifyError> {
        self.tx
            .send(DealNotification {
                event,
                deal: deal.clone(),
            })
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

async fn webhook_forwarder(client: Client, url: String, mut rx: mpsc::Receiver<DealNotification>) {
    while let Some(notification) = rx.recv().await {
        let result = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&notification)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    "[Notifier] Delivered {} for {} ({})",
                    notification.event, notification.deal.title, notification.deal.id
                );
            }
            Ok(resp) => warn!("[Notifier] Webhook rejected {}: {}", notification.deal.id, resp.status()),
            Err(e) => warn!("[Notifier] Webhook delivery failed for {}: {}", notification.deal.id, e),
        }
    }
    info!("[Notifier] Webhook forwarder stopped");
}
