use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Pending,
    Running,
    Done,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Running => "running",
            TransferState::Done => "done",
            TransferState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransferState::Pending),
            "running" => Some(TransferState::Running),
            "done" => Some(TransferState::Done),
            "failed" => Some(TransferState::Failed),
            _ => None,
        }
    }

    /// Pending and running jobs block a re-submission for the same
    /// `(torrent_hash, backend_id)` pair.
    pub fn is_active(&self) -> bool {
        matches!(self, TransferState::Pending | TransferState::Running)
    }
}

/// A job copying a completed torrent's payload from a backend to local
/// storage. Failure is terminal; a retry is a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: String,
    pub user_id: String,
    pub torrent_hash: String,
    pub backend_id: String,
    pub source_path: String,
    pub dest_path: String,
    pub state: TransferState,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub error: Option<String>,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}
