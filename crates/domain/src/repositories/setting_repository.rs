use crate::entities::TorrentSetting;
use crate::errors::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait SettingRepository: Send + Sync {
    /// Insert or replace on `(user_id, torrent_hash, key)`.
    async fn set(&self, setting: &TorrentSetting) -> Result<(), DomainError>;

    async fn get(
        &self,
        user_id: &str,
        torrent_hash: &str,
        key: &str,
    ) -> Result<Option<TorrentSetting>, DomainError>;

    async fn list(
        &self,
        user_id: &str,
        torrent_hash: &str,
    ) -> Result<Vec<TorrentSetting>, DomainError>;

    async fn delete(
        &self,
        user_id: &str,
        torrent_hash: &str,
        key: &str,
    ) -> Result<(), DomainError>;
}
