use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// An out-of-process event subscriber. The gateway POSTs matching torrent
/// events to `url`; `events` is the subscribed event-name filter (empty
/// subscribes to everything).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl Webhook {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(DomainError::ValidationError(
                "Webhook URL must be http or https".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wants(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event)
    }
}
