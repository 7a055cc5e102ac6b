use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Rtorrent,
    Transmission,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rtorrent => "rtorrent",
            BackendKind::Transmission => "transmission",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "rtorrent" => Ok(BackendKind::Rtorrent),
            "transmission" => Ok(BackendKind::Transmission),
            other => Err(DomainError::BadRequest(format!(
                "Unknown server type: {other}"
            ))),
        }
    }
}

/// HTTP download endpoint (an nginx-style autoindex serving the backend's
/// download directory). `host` falls back to the backend host when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpDownload {
    pub host: Option<String>,
    pub port: u16,
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
}

/// Automatic transfer of completed torrents to local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDownload {
    pub local_path: String,
    pub delete_remote_after: bool,
}

/// SSH access for the rsync transfer transport. `host` falls back to the
/// backend host when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    pub key_path: Option<String>,
}

/// A remote torrent client (rTorrent or Transmission) owned by one user.
/// `version` increments on every update and keys the client connection cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub rpc_path: Option<String>,
    pub use_ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: bool,
    pub is_default: bool,
    pub version: i64,
    pub last_used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub http_download: Option<HttpDownload>,
    pub mount_path: Option<String>,
    pub download_dir: Option<String>,
    pub auto_download: Option<AutoDownload>,
    pub ssh: Option<SshConfig>,
}

impl Backend {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Server name cannot be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Server host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(DomainError::ValidationError(
                "Server port cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Host the HTTP download endpoint resolves to.
    pub fn http_host(&self) -> Option<&str> {
        self.http_download
            .as_ref()
            .map(|h| h.host.as_deref().unwrap_or(&self.host))
    }

    /// Host the SSH transport resolves to.
    pub fn ssh_host(&self) -> Option<&str> {
        self.ssh
            .as_ref()
            .map(|s| s.host.as_deref().unwrap_or(&self.host))
    }
}
