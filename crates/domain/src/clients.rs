use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Backend, DomainError};

/// One file inside a torrent, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    pub index: i32,
    pub path: String,
    pub size: i64,
    pub priority: i32,
    pub progress: f64,
}

/// A torrent as reported by a backend, normalized over rTorrent and
/// Transmission. Info hashes are always uppercase 40-hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentView {
    pub info_hash: String,
    pub name: String,
    pub base_path: String,
    pub size: i64,
    pub is_multi_file: bool,
    pub bytes_done: i64,
    pub state: String,
    pub is_active: bool,
    pub complete: bool,
    pub ratio: f64,
    pub up_rate: i64,
    pub down_rate: i64,
    pub peers: i32,
    pub priority: i32,
    pub is_private: bool,
    pub progress: f64,
    pub is_magnet_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileView>>,
}

impl TorrentView {
    pub fn is_seeding(&self) -> bool {
        self.is_active && self.complete
    }
}

/// Download priority shared by both backends: 0 = off, 1 = normal, 2 = high.
pub const PRIORITY_OFF: i32 = 0;
pub const PRIORITY_NORMAL: i32 = 1;
pub const PRIORITY_HIGH: i32 = 2;

/// The capability set every backend kind must satisfy. Implementations
/// normalize hashes to uppercase, derive `is_active` from the
/// downloading/seeding states, and treat `progress == 1` as complete.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Minimal round-trip probe, used by the connection-test endpoint.
    async fn ping(&self) -> Result<(), DomainError>;

    async fn list_torrents(
        &self,
        info_hash: Option<&str>,
        include_files: bool,
    ) -> Result<Vec<TorrentView>, DomainError>;

    /// Load raw bencoded `.torrent` content.
    async fn add_torrent_file(
        &self,
        data: &[u8],
        start: bool,
        priority: i32,
    ) -> Result<(), DomainError>;

    async fn add_magnet(&self, uri: &str, start: bool, priority: i32) -> Result<(), DomainError>;

    /// Download a remote `.torrent` over HTTP, then delegate to
    /// `add_torrent_file`.
    async fn add_torrent_url(
        &self,
        url: &str,
        start: bool,
        priority: i32,
    ) -> Result<(), DomainError>;

    async fn start(&self, info_hash: &str) -> Result<(), DomainError>;

    async fn stop(&self, info_hash: &str) -> Result<(), DomainError>;

    /// Remove a torrent. Stops it first and waits briefly for it to go
    /// inactive before issuing the removal.
    async fn erase(&self, info_hash: &str, delete_data: bool) -> Result<(), DomainError>;

    async fn files(&self, info_hash: &str) -> Result<Vec<FileView>, DomainError>;

    async fn set_priority(&self, info_hash: &str, priority: i32) -> Result<(), DomainError>;

    async fn set_file_priority(
        &self,
        info_hash: &str,
        index: i32,
        priority: i32,
    ) -> Result<(), DomainError>;

    async fn labels(&self, info_hash: &str) -> Result<Vec<String>, DomainError>;

    async fn set_labels(&self, info_hash: &str, labels: &[String]) -> Result<(), DomainError>;
}

/// Resolves a backend record to a live client. Implementations cache one
/// client per backend id, keyed by the record's version counter.
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, backend: &Backend) -> Result<Arc<dyn BackendClient>, DomainError>;

    /// Discard any cached client for the backend; the next request
    /// reconstructs it.
    fn invalidate(&self, backend_id: &str);
}
