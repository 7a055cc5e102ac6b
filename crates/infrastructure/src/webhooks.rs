//! Webhook delivery: relays bus events to user-registered HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use domain::{EventBus, TorrentEvent, WebhookRepository};

const DELIVERY_TIMEOUT_SECONDS: u64 = 10;

pub struct WebhookForwarder {
    webhooks: Arc<dyn WebhookRepository>,
    events: EventBus,
    http: reqwest::Client,
}

impl WebhookForwarder {
    pub fn new(webhooks: Arc<dyn WebhookRepository>, events: EventBus) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECONDS))
            .build()
            .expect("reqwest client with static config");
        Self {
            webhooks,
            events,
            http,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut receiver = self.events.subscribe();
        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Ok(event) => self.deliver(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Webhook forwarder lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn deliver(&self, event: TorrentEvent) {
        let hooks = match self.webhooks.list_for_user(&event.user_id).await {
            Ok(hooks) => hooks,
            Err(e) => {
                warn!("Webhook lookup failed: {e}");
                return;
            }
        };
        let kind = event.kind.as_str();
        for hook in hooks.iter().filter(|hook| hook.wants(kind)) {
            match self.http.post(&hook.url).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %hook.url, kind, "Delivered webhook");
                }
                Ok(response) => {
                    warn!(url = %hook.url, status = %response.status(), "Webhook rejected");
                }
                Err(e) => warn!(url = %hook.url, "Webhook delivery failed: {e}"),
            }
        }
    }
}
