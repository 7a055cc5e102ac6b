use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A torrent known to the gateway, keyed by `(user_id, info_hash, backend_id)`.
/// The same info hash may appear under one user on several backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    pub info_hash: String,
    pub user_id: String,
    pub backend_id: String,
    pub name: String,
    pub size: i64,
    pub is_private: bool,
    pub base_path: Option<String>,
    pub labels: Vec<String>,
    pub added_at: NaiveDateTime,
}

impl Torrent {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_canonical_info_hash(&self.info_hash) {
            return Err(DomainError::ValidationError(format!(
                "Info hash is not canonical 40-hex uppercase: {}",
                self.info_hash
            )));
        }
        Ok(())
    }
}

/// Canonical form: 40 uppercase hex characters.
pub fn is_canonical_info_hash(hash: &str) -> bool {
    hash.len() == 40
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// One append-only status observation, written by the maintenance loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub torrent_hash: String,
    pub backend_id: Option<String>,
    pub is_seeding: bool,
    pub is_private: bool,
    pub progress: f64,
    pub down_rate: i64,
    pub up_rate: i64,
    pub peers: i32,
    pub seeds: i32,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Start,
    Stop,
    Remove,
    TransferStart,
    TransferDone,
    Error,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Remove => "remove",
            ActionKind::TransferStart => "transfer_start",
            ActionKind::TransferDone => "transfer_done",
            ActionKind::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(ActionKind::Add),
            "start" => Some(ActionKind::Start),
            "stop" => Some(ActionKind::Stop),
            "remove" => Some(ActionKind::Remove),
            "transfer_start" => Some(ActionKind::TransferStart),
            "transfer_done" => Some(ActionKind::TransferDone),
            "error" => Some(ActionKind::Error),
            _ => None,
        }
    }
}

/// Append-only audit row for user-visible torrent operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub torrent_hash: String,
    pub backend_id: Option<String>,
    pub kind: ActionKind,
    pub detail: Option<String>,
    pub timestamp: NaiveDateTime,
}

/// Per-user per-torrent override, free-form key/value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSetting {
    pub user_id: String,
    pub torrent_hash: String,
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_hash_accepts_uppercase_hex() {
        assert!(is_canonical_info_hash(
            "0123456789ABCDEF0123456789ABCDEF01234567"
        ));
    }

    #[test]
    fn canonical_hash_rejects_lowercase_and_short() {
        assert!(!is_canonical_info_hash(
            "0123456789abcdef0123456789abcdef01234567"
        ));
        assert!(!is_canonical_info_hash("ABCDEF"));
    }
}
