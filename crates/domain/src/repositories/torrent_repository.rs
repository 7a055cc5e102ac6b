use crate::entities::Torrent;
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait TorrentRepository: Send + Sync {
    /// Insert or replace on `(user_id, info_hash, backend_id)`. `added_at`
    /// of an existing row is preserved.
    async fn upsert(&self, torrent: &Torrent) -> Result<(), DomainError>;

    /// Rows for one hash under one user, across backends.
    async fn find(&self, user_id: &str, info_hash: &str) -> Result<Vec<Torrent>, DomainError>;

    async fn get(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
    ) -> Result<Option<Torrent>, DomainError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Torrent>, DomainError>;

    async fn delete(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
    ) -> Result<(), DomainError>;

    async fn set_labels(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
        labels: &[String],
    ) -> Result<(), DomainError>;
}
