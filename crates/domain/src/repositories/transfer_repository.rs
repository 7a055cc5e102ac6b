use chrono::NaiveDateTime;

use crate::entities::{TransferJob, TransferState};
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn create(&self, job: &TransferJob) -> Result<(), DomainError>;

    async fn get(&self, id: &str) -> Result<Option<TransferJob>, DomainError>;

    /// The pending or running job for a `(torrent_hash, backend_id)` pair,
    /// if any. Enforces submission idempotency.
    async fn find_active(
        &self,
        torrent_hash: &str,
        backend_id: &str,
    ) -> Result<Option<TransferJob>, DomainError>;

    /// Atomically move up to `limit` pending jobs to running and return them.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<TransferJob>, DomainError>;

    async fn update_progress(&self, id: &str, bytes_done: i64) -> Result<(), DomainError>;

    async fn finish(
        &self,
        id: &str,
        state: TransferState,
        bytes_done: i64,
        error: Option<String>,
        finished_at: NaiveDateTime,
    ) -> Result<(), DomainError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TransferJob>, DomainError>;
}
