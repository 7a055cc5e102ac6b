//! Typed event bus.
//!
//! State transitions observed by the dispatcher, the maintenance loop, and
//! the transfer worker are published here. Subscribers are out-of-process:
//! the webhook forwarder relays events to user-registered HTTP endpoints.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Started,
    Stopped,
    Completed,
    Removed,
    Error,
    TransferStarted,
    TransferCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::Completed => "completed",
            EventKind::Removed => "removed",
            EventKind::Error => "error",
            EventKind::TransferStarted => "transfer_started",
            EventKind::TransferCompleted => "transfer_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentEvent {
    pub kind: EventKind,
    pub user_id: String,
    pub backend_id: Option<String>,
    pub info_hash: Option<String>,
    pub detail: serde_json::Value,
    pub timestamp: NaiveDateTime,
}

/// Broadcast fan-out; publishing never blocks and drops silently when no
/// subscriber is attached.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TorrentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TorrentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(
        &self,
        kind: EventKind,
        user_id: &str,
        backend_id: Option<&str>,
        info_hash: Option<&str>,
        detail: serde_json::Value,
    ) {
        let event = TorrentEvent {
            kind,
            user_id: user_id.to_string(),
            backend_id: backend_id.map(str::to_string),
            info_hash: info_hash.map(str::to_string),
            detail,
            timestamp: Utc::now().naive_utc(),
        };
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(
            EventKind::Stopped,
            "u1",
            Some("b1"),
            Some("AAAA"),
            serde_json::json!({"reason": "auto_pause"}),
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Stopped);
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.detail["reason"], "auto_pause");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.publish(EventKind::Added, "u1", None, None, serde_json::Value::Null);
    }
}
