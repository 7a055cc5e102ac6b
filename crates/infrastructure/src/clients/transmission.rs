//! Transmission backend client over JSON-RPC.
//!
//! Implements the CSRF handshake: a 409 response carries the
//! `X-Transmission-Session-Id` header, which is captured and the request
//! retried once.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use domain::{
    torrent_file, Backend, BackendClient, DomainError, FileView, TorrentView, PRIORITY_HIGH,
    PRIORITY_NORMAL, PRIORITY_OFF,
};

const RPC_TIMEOUT_SECONDS: u64 = 10;
const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";
const ERASE_POLL_MS: u64 = 200;
const ERASE_POLL_ATTEMPTS: u32 = 5;

const TORRENT_FIELDS: &[&str] = &[
    "hashString",
    "name",
    "downloadDir",
    "totalSize",
    "leftUntilDone",
    "status",
    "percentDone",
    "metadataPercentComplete",
    "rateDownload",
    "rateUpload",
    "peersConnected",
    "uploadRatio",
    "isPrivate",
    "files",
    "fileStats",
];

pub struct TransmissionClient {
    url: String,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    pub fn from_backend(backend: &Backend) -> Result<Self, DomainError> {
        let scheme = if backend.use_ssl { "https" } else { "http" };
        let path = backend.rpc_path.as_deref().unwrap_or("/transmission/rpc");
        let url = format!("{scheme}://{}:{}{path}", backend.host, backend.port);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| DomainError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            url,
            username: backend.username.clone(),
            password: backend.password.clone(),
            http,
            session_id: Mutex::new(None),
        })
    }

    async fn call(&self, method: &str, arguments: Value) -> Result<Value, DomainError> {
        let body = json!({ "method": method, "arguments": arguments, "tag": 0 });
        for attempt in 0..2 {
            let mut request = self.http.post(&self.url).json(&body);
            if let Some(username) = &self.username {
                request = request.basic_auth(username, self.password.as_deref());
            }
            if let Some(session_id) = self.session_id.lock().await.as_deref() {
                request = request.header(SESSION_ID_HEADER, session_id);
            }
            let response = request.send().await.map_err(|e| {
                DomainError::BackendFailure(format!("Transmission unreachable: {e}"))
            })?;

            if response.status().as_u16() == 409 {
                let session_id = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DomainError::BackendFailure(
                            "Transmission 409 without session id".to_string(),
                        )
                    })?;
                debug!("Captured Transmission session id");
                *self.session_id.lock().await = Some(session_id);
                if attempt == 0 {
                    continue;
                }
                return Err(DomainError::BackendFailure(
                    "Transmission session handshake failed".to_string(),
                ));
            }
            if !response.status().is_success() {
                return Err(DomainError::BackendFailure(format!(
                    "Transmission returned HTTP {}",
                    response.status()
                )));
            }
            let payload: Value = response.json().await.map_err(|e| {
                DomainError::BackendFailure(format!("Transmission read failed: {e}"))
            })?;
            if payload["result"].as_str() != Some("success") {
                return Err(DomainError::BackendFailure(format!(
                    "Transmission error: {}",
                    payload["result"].as_str().unwrap_or("unknown")
                )));
            }
            return Ok(payload["arguments"].clone());
        }
        unreachable!("handshake loop always returns")
    }

    async fn get_torrents(&self, info_hash: Option<&str>) -> Result<Vec<Value>, DomainError> {
        let mut arguments = json!({ "fields": TORRENT_FIELDS });
        if let Some(hash) = info_hash {
            arguments["ids"] = json!([hash.to_ascii_lowercase()]);
        }
        let result = self.call("torrent-get", arguments).await?;
        Ok(result["torrents"].as_array().cloned().unwrap_or_default())
    }

    async fn require_torrent(&self, info_hash: &str) -> Result<Value, DomainError> {
        self.get_torrents(Some(info_hash))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::NotFound(format!("Torrent {info_hash}")))
    }

    async fn ids_call(&self, method: &str, info_hash: &str) -> Result<(), DomainError> {
        self.call(method, json!({ "ids": [info_hash.to_ascii_lowercase()] }))
            .await
            .map(|_| ())
    }

    async fn file_count(&self, info_hash: &str) -> Result<usize, DomainError> {
        let torrent = self.require_torrent(info_hash).await?;
        Ok(torrent["files"].as_array().map(|f| f.len()).unwrap_or(0))
    }
}

#[async_trait]
impl BackendClient for TransmissionClient {
    async fn ping(&self) -> Result<(), DomainError> {
        self.call("session-stats", json!({})).await.map(|_| ())
    }

    async fn list_torrents(
        &self,
        info_hash: Option<&str>,
        include_files: bool,
    ) -> Result<Vec<TorrentView>, DomainError> {
        let torrents = self.get_torrents(info_hash).await?;
        Ok(torrents
            .iter()
            .map(|t| decode_torrent(t, include_files))
            .collect())
    }

    async fn add_torrent_file(
        &self,
        data: &[u8],
        start: bool,
        priority: i32,
    ) -> Result<(), DomainError> {
        let meta = torrent_file::parse(data)?;
        let mut arguments = json!({
            "metainfo": base64::engine::general_purpose::STANDARD.encode(data),
            "paused": !start,
        });
        let all_files: Vec<usize> = (0..meta.file_count).collect();
        if priority == PRIORITY_OFF {
            arguments["files-unwanted"] = json!(all_files);
        } else if priority == PRIORITY_HIGH {
            arguments["priority-high"] = json!(all_files);
        }
        self.call("torrent-add", arguments).await.map(|_| ())
    }

    async fn add_magnet(&self, uri: &str, start: bool, _priority: i32) -> Result<(), DomainError> {
        // File layout is unknown until the metadata arrives, so priority is
        // left at the daemon default.
        self.call("torrent-add", json!({ "filename": uri, "paused": !start }))
            .await
            .map(|_| ())
    }

    async fn add_torrent_url(
        &self,
        url: &str,
        start: bool,
        priority: i32,
    ) -> Result<(), DomainError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::BadRequest(format!("Cannot fetch torrent URL: {e}")))?;
        if !response.status().is_success() {
            return Err(DomainError::BadRequest(format!(
                "Torrent URL returned HTTP {}",
                response.status()
            )));
        }
        let data = response
            .bytes()
            .await
            .map_err(|e| DomainError::BadRequest(format!("Cannot read torrent URL: {e}")))?;
        self.add_torrent_file(&data, start, priority).await
    }

    async fn start(&self, info_hash: &str) -> Result<(), DomainError> {
        self.require_torrent(info_hash).await?;
        self.ids_call("torrent-start", info_hash).await
    }

    async fn stop(&self, info_hash: &str) -> Result<(), DomainError> {
        self.require_torrent(info_hash).await?;
        self.ids_call("torrent-stop", info_hash).await
    }

    async fn erase(&self, info_hash: &str, delete_data: bool) -> Result<(), DomainError> {
        self.require_torrent(info_hash).await?;
        self.ids_call("torrent-stop", info_hash).await?;
        for _ in 0..ERASE_POLL_ATTEMPTS {
            let torrent = self.require_torrent(info_hash).await?;
            if normalized_state(torrent["status"].as_i64().unwrap_or(0)).1 {
                tokio::time::sleep(Duration::from_millis(ERASE_POLL_MS)).await;
            } else {
                break;
            }
        }
        self.call(
            "torrent-remove",
            json!({
                "ids": [info_hash.to_ascii_lowercase()],
                "delete-local-data": delete_data,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn files(&self, info_hash: &str) -> Result<Vec<FileView>, DomainError> {
        let torrent = self.require_torrent(info_hash).await?;
        Ok(decode_files(&torrent))
    }

    async fn set_priority(&self, info_hash: &str, priority: i32) -> Result<(), DomainError> {
        let count = self.file_count(info_hash).await?;
        let all_files: Vec<usize> = (0..count).collect();
        let ids = json!([info_hash.to_ascii_lowercase()]);
        let arguments = match priority {
            PRIORITY_OFF => json!({ "ids": ids, "files-unwanted": all_files }),
            PRIORITY_HIGH => json!({
                "ids": ids,
                "files-wanted": all_files,
                "priority-high": all_files,
            }),
            _ => json!({
                "ids": ids,
                "files-wanted": all_files,
                "priority-normal": all_files,
            }),
        };
        self.call("torrent-set", arguments).await.map(|_| ())
    }

    async fn set_file_priority(
        &self,
        info_hash: &str,
        index: i32,
        priority: i32,
    ) -> Result<(), DomainError> {
        let ids = json!([info_hash.to_ascii_lowercase()]);
        let target = json!([index]);
        let arguments = match priority {
            PRIORITY_OFF => json!({ "ids": ids, "files-unwanted": target }),
            PRIORITY_HIGH => json!({
                "ids": ids,
                "files-wanted": target,
                "priority-high": target,
            }),
            _ => json!({
                "ids": ids,
                "files-wanted": target,
                "priority-normal": target,
            }),
        };
        self.call("torrent-set", arguments).await.map(|_| ())
    }

    async fn labels(&self, info_hash: &str) -> Result<Vec<String>, DomainError> {
        let result = self
            .call(
                "torrent-get",
                json!({
                    "ids": [info_hash.to_ascii_lowercase()],
                    "fields": ["labels"],
                }),
            )
            .await?;
        let torrent = result["torrents"]
            .as_array()
            .and_then(|t| t.first())
            .ok_or_else(|| DomainError::NotFound(format!("Torrent {info_hash}")))?;
        Ok(torrent["labels"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_labels(&self, info_hash: &str, labels: &[String]) -> Result<(), DomainError> {
        // Native labels field, Transmission >= 3.0.
        self.call(
            "torrent-set",
            json!({ "ids": [info_hash.to_ascii_lowercase()], "labels": labels }),
        )
        .await
        .map(|_| ())
    }
}

/// Map Transmission's numeric status to `(state, is_active)`.
fn normalized_state(status: i64) -> (&'static str, bool) {
    match status {
        0 => ("stopped", false),
        1 | 2 => ("checking", false),
        3 | 5 => ("queued", false),
        4 => ("downloading", true),
        6 => ("seeding", true),
        _ => ("stopped", false),
    }
}

fn decode_torrent(torrent: &Value, include_files: bool) -> TorrentView {
    let info_hash = torrent["hashString"]
        .as_str()
        .unwrap_or_default()
        .to_ascii_uppercase();
    let size = torrent["totalSize"].as_i64().unwrap_or(0);
    let left = torrent["leftUntilDone"].as_i64().unwrap_or(0);
    let progress = torrent["percentDone"].as_f64().unwrap_or(0.0);
    let (state, is_active) = normalized_state(torrent["status"].as_i64().unwrap_or(0));
    let files = torrent["files"].as_array();
    let file_count = files.map(|f| f.len()).unwrap_or(0);

    TorrentView {
        info_hash,
        name: torrent["name"].as_str().unwrap_or_default().to_string(),
        base_path: torrent["downloadDir"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        size,
        is_multi_file: file_count > 1,
        bytes_done: size - left,
        state: state.to_string(),
        is_active,
        complete: progress >= 1.0,
        ratio: torrent["uploadRatio"].as_f64().unwrap_or(0.0),
        up_rate: torrent["rateUpload"].as_i64().unwrap_or(0),
        down_rate: torrent["rateDownload"].as_i64().unwrap_or(0),
        peers: torrent["peersConnected"].as_i64().unwrap_or(0) as i32,
        priority: derive_priority(torrent),
        is_private: torrent["isPrivate"].as_bool().unwrap_or(false),
        progress,
        is_magnet_pending: torrent["metadataPercentComplete"].as_f64().unwrap_or(1.0) < 1.0,
        files: include_files.then(|| decode_files(torrent)),
    }
}

/// Collapse per-file wantedness into the shared 0/1/2 priority scheme.
fn derive_priority(torrent: &Value) -> i32 {
    let Some(stats) = torrent["fileStats"].as_array() else {
        return PRIORITY_NORMAL;
    };
    if stats.is_empty() {
        return PRIORITY_NORMAL;
    }
    if stats
        .iter()
        .all(|s| !s["wanted"].as_bool().unwrap_or(true))
    {
        return PRIORITY_OFF;
    }
    if stats.iter().any(|s| s["priority"].as_i64() == Some(1)) {
        return PRIORITY_HIGH;
    }
    PRIORITY_NORMAL
}

fn decode_files(torrent: &Value) -> Vec<FileView> {
    let files = torrent["files"].as_array().cloned().unwrap_or_default();
    let stats = torrent["fileStats"].as_array().cloned().unwrap_or_default();
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let size = file["length"].as_i64().unwrap_or(0);
            let completed = file["bytesCompleted"].as_i64().unwrap_or(0);
            let stat = stats.get(index);
            let wanted = stat
                .map(|s| s["wanted"].as_bool().unwrap_or(true))
                .unwrap_or(true);
            let priority = if !wanted {
                PRIORITY_OFF
            } else if stat.and_then(|s| s["priority"].as_i64()) == Some(1) {
                PRIORITY_HIGH
            } else {
                PRIORITY_NORMAL
            };
            FileView {
                index: index as i32,
                path: file["name"].as_str().unwrap_or_default().to_string(),
                size,
                priority,
                progress: if size > 0 {
                    completed as f64 / size as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: i64) -> Value {
        json!({
            "hashString": "abcdef0123456789abcdef0123456789abcdef01",
            "name": "demo",
            "downloadDir": "/var/lib/transmission/downloads",
            "totalSize": 4096,
            "leftUntilDone": 1024,
            "status": status,
            "percentDone": 0.75,
            "metadataPercentComplete": 1.0,
            "rateDownload": 100,
            "rateUpload": 50,
            "peersConnected": 7,
            "uploadRatio": 0.42,
            "isPrivate": true,
            "files": [
                { "name": "demo/a.bin", "length": 2048, "bytesCompleted": 2048 },
                { "name": "demo/b.bin", "length": 2048, "bytesCompleted": 1024 },
            ],
            "fileStats": [
                { "wanted": true, "priority": 0, "bytesCompleted": 2048 },
                { "wanted": true, "priority": 1, "bytesCompleted": 1024 },
            ],
        })
    }

    #[test]
    fn torrents_normalize_hash_state_and_progress() {
        let view = decode_torrent(&sample(4), false);
        assert_eq!(view.info_hash, "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        assert_eq!(view.state, "downloading");
        assert!(view.is_active);
        assert!(!view.complete);
        assert_eq!(view.bytes_done, 3072);
        assert!(view.is_multi_file);
        assert!(view.is_private);
        assert_eq!(view.priority, PRIORITY_HIGH);
    }

    #[test]
    fn stopped_and_seeding_states() {
        assert_eq!(normalized_state(0), ("stopped", false));
        assert_eq!(normalized_state(6), ("seeding", true));
        assert_eq!(normalized_state(3), ("queued", false));
    }

    #[test]
    fn all_unwanted_collapses_to_priority_off() {
        let mut torrent = sample(0);
        torrent["fileStats"] = json!([
            { "wanted": false, "priority": 0 },
            { "wanted": false, "priority": 0 },
        ]);
        assert_eq!(derive_priority(&torrent), PRIORITY_OFF);
    }

    #[test]
    fn files_carry_wantedness_as_priority() {
        let files = decode_files(&sample(4));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].priority, PRIORITY_NORMAL);
        assert_eq!(files[1].priority, PRIORITY_HIGH);
        assert!((files[1].progress - 0.5).abs() < 1e-9);
    }
}
