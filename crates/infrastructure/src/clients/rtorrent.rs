//! rTorrent backend client over XML-RPC.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use domain::{
    magnet, torrent_file, Backend, BackendClient, DomainError, FileView, TorrentView,
    PRIORITY_NORMAL,
};

use crate::clients::xmlrpc::{self, Value};

const RPC_TIMEOUT_SECONDS: u64 = 10;
/// rTorrent registers loads asynchronously; follow-up commands wait this
/// long after an add.
const REGISTER_DELAY_MS: u64 = 500;
const ERASE_POLL_MS: u64 = 200;
const ERASE_POLL_ATTEMPTS: u32 = 5;

pub struct RtorrentClient {
    url: String,
    username: Option<String>,
    password: Option<String>,
    mount_path: Option<String>,
    download_dir: Option<String>,
    http: reqwest::Client,
}

impl RtorrentClient {
    pub fn from_backend(backend: &Backend) -> Result<Self, DomainError> {
        let scheme = if backend.use_ssl { "https" } else { "http" };
        let rpc_path = backend.rpc_path.as_deref().unwrap_or("/RPC2");
        let url = format!("{scheme}://{}:{}{rpc_path}", backend.host, backend.port);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| DomainError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            url,
            username: backend.username.clone(),
            password: backend.password.clone(),
            mount_path: backend.mount_path.clone(),
            download_dir: backend.download_dir.clone(),
            http,
        })
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, DomainError> {
        let body = xmlrpc::write_request(method, params);
        let mut request = self
            .http
            .post(&self.url)
            .header("Content-Type", "text/xml")
            .body(body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        let response = request
            .send()
            .await
            .map_err(|e| DomainError::BackendFailure(format!("rTorrent unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(DomainError::BackendFailure(format!(
                "rTorrent returned HTTP {}",
                response.status()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| DomainError::BackendFailure(format!("rTorrent read failed: {e}")))?;
        xmlrpc::parse_response(&text)
    }

    async fn call_simple(&self, method: &str, info_hash: &str) -> Result<Value, DomainError> {
        self.call(method, &[Value::String(info_hash.to_string())])
            .await
    }

    async fn is_active(&self, info_hash: &str) -> Result<bool, DomainError> {
        let value = self.call_simple("d.is_active", info_hash).await?;
        Ok(value.as_i64() == Some(1))
    }

    /// Spread a non-default priority over the download and all of its files.
    async fn apply_priority(
        &self,
        info_hash: &str,
        file_count: usize,
        priority: i32,
    ) -> Result<(), DomainError> {
        self.call(
            "d.priority.set",
            &[
                Value::String(info_hash.to_string()),
                Value::Int(priority as i64),
            ],
        )
        .await?;
        for index in 0..file_count {
            self.set_file_priority(info_hash, index as i32, priority)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BackendClient for RtorrentClient {
    async fn ping(&self) -> Result<(), DomainError> {
        self.call("system.client_version", &[]).await.map(|_| ())
    }

    async fn list_torrents(
        &self,
        info_hash: Option<&str>,
        include_files: bool,
    ) -> Result<Vec<TorrentView>, DomainError> {
        let data = self
            .call(
                "d.multicall2",
                &[
                    Value::String(String::new()),
                    Value::String("main".to_string()),
                    Value::String("d.hash=".to_string()),
                    Value::String("d.name=".to_string()),
                    Value::String("d.base_path=".to_string()),
                    Value::String("d.size_bytes=".to_string()),
                    Value::String("d.is_multi_file=".to_string()),
                    Value::String("d.completed_bytes=".to_string()),
                    Value::String("d.state=".to_string()),
                    Value::String("d.is_active=".to_string()),
                    Value::String("d.complete=".to_string()),
                    Value::String("d.ratio=".to_string()),
                    Value::String("d.up.rate=".to_string()),
                    Value::String("d.down.rate=".to_string()),
                    Value::String("d.peers_connected=".to_string()),
                    Value::String("d.priority=".to_string()),
                    Value::String("d.is_private=".to_string()),
                ],
            )
            .await?;

        let filter = info_hash.map(|h| h.to_ascii_uppercase());
        let mut views = Vec::new();
        for row in data.as_array().unwrap_or(&[]) {
            let view = match decode_row(row) {
                Some(view) => view,
                None => {
                    warn!("Skipping malformed d.multicall2 row");
                    continue;
                }
            };
            if let Some(wanted) = &filter {
                if &view.info_hash != wanted {
                    continue;
                }
            }
            views.push(view);
        }

        if include_files {
            for view in &mut views {
                view.files = Some(self.files(&view.info_hash).await?);
            }
        }
        Ok(views)
    }

    async fn add_torrent_file(
        &self,
        data: &[u8],
        start: bool,
        priority: i32,
    ) -> Result<(), DomainError> {
        let meta = torrent_file::parse(data)?;
        let method = if start { "load.raw_start" } else { "load.raw" };
        let result = self
            .call(
                method,
                &[Value::String(String::new()), Value::Base64(data.to_vec())],
            )
            .await?;
        if result.as_i64() != Some(0) {
            return Err(DomainError::BackendFailure(
                "rTorrent rejected torrent file".to_string(),
            ));
        }
        if priority != PRIORITY_NORMAL {
            tokio::time::sleep(Duration::from_millis(REGISTER_DELAY_MS)).await;
            self.apply_priority(&meta.info_hash, meta.file_count, priority)
                .await?;
        }
        debug!(info_hash = %meta.info_hash, "Loaded torrent into rTorrent");
        Ok(())
    }

    async fn add_magnet(&self, uri: &str, start: bool, priority: i32) -> Result<(), DomainError> {
        let info_hash = magnet::info_hash_from_magnet(uri)?;
        let method = if start { "load.start" } else { "load" };
        let result = self
            .call(
                method,
                &[Value::String(String::new()), Value::String(uri.to_string())],
            )
            .await?;
        if result.as_i64() != Some(0) {
            return Err(DomainError::BackendFailure(format!(
                "rTorrent rejected magnet {info_hash}"
            )));
        }
        if priority != PRIORITY_NORMAL {
            tokio::time::sleep(Duration::from_millis(REGISTER_DELAY_MS)).await;
            self.call(
                "d.priority.set",
                &[Value::String(info_hash.clone()), Value::Int(priority as i64)],
            )
            .await?;
        }
        debug!(info_hash = %info_hash, "Added magnet to rTorrent");
        Ok(())
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
        self.call_simple("d.start", info_hash).await.map(|_| ())
    }

    async fn stop(&self, info_hash: &str) -> Result<(), DomainError> {
        self.call_simple("d.stop", info_hash).await.map(|_| ())
    }

    async fn erase(&self, info_hash: &str, delete_data: bool) -> Result<(), DomainError> {
        self.stop(info_hash).await?;
        for _ in 0..ERASE_POLL_ATTEMPTS {
            if !self.is_active(info_hash).await.unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(ERASE_POLL_MS)).await;
        }
        // rTorrent's XML-RPC has no delete-with-data; the payload can only
        // be removed through a configured local mount, and only when the
        // remote path maps to the torrent's own info-hash folder.
        let data_path = if delete_data {
            match (&self.mount_path, &self.download_dir) {
                (Some(mount), Some(dir)) => self
                    .call_simple("d.base_path", info_hash)
                    .await
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .and_then(|remote| info_hash_folder(mount, dir, &remote, info_hash)),
                _ => None,
            }
        } else {
            None
        };
        self.call_simple("d.erase", info_hash).await?;
        if let Some(path) = data_path {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    let removed = if meta.is_dir() {
                        tokio::fs::remove_dir_all(&path).await
                    } else {
                        tokio::fs::remove_file(&path).await
                    };
                    match removed {
                        Ok(()) => debug!(info_hash, path = %path.display(), "Deleted payload data"),
                        Err(e) => warn!(info_hash, "Payload deletion failed: {e}"),
                    }
                }
                Err(_) => debug!(info_hash, "No payload data found on mount"),
            }
        }
        Ok(())
    }

    async fn files(&self, info_hash: &str) -> Result<Vec<FileView>, DomainError> {
        let data = self
            .call(
                "f.multicall",
                &[
                    Value::String(info_hash.to_string()),
                    Value::String(String::new()),
                    Value::String("f.path=".to_string()),
                    Value::String("f.size_bytes=".to_string()),
                    Value::String("f.size_chunks=".to_string()),
                    Value::String("f.completed_chunks=".to_string()),
                    Value::String("f.priority=".to_string()),
                ],
            )
            .await?;
        let mut files = Vec::new();
        for (index, row) in data.as_array().unwrap_or(&[]).iter().enumerate() {
            let Some(fields) = row.as_array() else {
                continue;
            };
            let path = fields
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let size = fields.get(1).and_then(Value::as_i64).unwrap_or(0);
            let size_chunks = fields.get(2).and_then(Value::as_i64).unwrap_or(0);
            let completed_chunks = fields.get(3).and_then(Value::as_i64).unwrap_or(0);
            let priority = fields.get(4).and_then(Value::as_i64).unwrap_or(1) as i32;
            let progress = if size_chunks > 0 {
                completed_chunks as f64 / size_chunks as f64
            } else {
                0.0
            };
            files.push(FileView {
                index: index as i32,
                path,
                size,
                priority,
                progress,
            });
        }
        Ok(files)
    }

    async fn set_priority(&self, info_hash: &str, priority: i32) -> Result<(), DomainError> {
        self.call(
            "d.priority.set",
            &[
                Value::String(info_hash.to_string()),
                Value::Int(priority as i64),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn set_file_priority(
        &self,
        info_hash: &str,
        index: i32,
        priority: i32,
    ) -> Result<(), DomainError> {
        // rTorrent addresses files as "<hash>:f<index>".
        self.call(
            "f.priority.set",
            &[
                Value::String(format!("{info_hash}:f{index}")),
                Value::Int(priority as i64),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn labels(&self, info_hash: &str) -> Result<Vec<String>, DomainError> {
        let value = self.call_simple("d.custom1", info_hash).await?;
        Ok(split_labels(value.as_str().unwrap_or_default()))
    }

    async fn set_labels(&self, info_hash: &str, labels: &[String]) -> Result<(), DomainError> {
        // Comma-joined in d.custom1, ruTorrent compatible.
        self.call(
            "d.custom1.set",
            &[
                Value::String(info_hash.to_string()),
                Value::String(labels.join(",")),
            ],
        )
        .await
        .map(|_| ())
    }
}

/// Local path of the torrent's `<INFO_HASH>/` folder, for payload deletion.
///
/// rTorrent lays data out as `download_dir/<INFO_HASH>/data/<name>`; the
/// deletable unit is the hash folder mapped onto the mount. Returns `None`
/// unless the remote path sits under `download_dir`, a path component
/// matches the info hash, and no component is a traversal step, so nothing
/// outside the mount (and never the mount root) is ever removed.
fn info_hash_folder(
    mount_path: &str,
    download_dir: &str,
    remote_path: &str,
    info_hash: &str,
) -> Option<PathBuf> {
    let prefix = format!("{}/", download_dir.trim_end_matches('/'));
    let relative = remote_path.strip_prefix(&prefix)?;

    let mut kept: Vec<&str> = Vec::new();
    for part in relative.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            warn!(remote_path, "Refusing payload deletion for unsafe path");
            return None;
        }
        kept.push(part);
        if part.eq_ignore_ascii_case(info_hash) {
            let local = Path::new(mount_path).join(kept.join("/"));
            if local == Path::new(mount_path) {
                return None;
            }
            return Some(local);
        }
    }
    warn!(remote_path, "No info-hash folder in remote path");
    None
}

fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One row of the `d.multicall2` listing, in the field order requested above.
fn decode_row(row: &Value) -> Option<TorrentView> {
    let fields = row.as_array()?;
    let info_hash = fields.first()?.as_str()?.to_ascii_uppercase();
    let name = fields.get(1)?.as_str().unwrap_or_default().to_string();
    let base_path = fields.get(2)?.as_str().unwrap_or_default().to_string();
    let size = fields.get(3)?.as_i64().unwrap_or(0);
    let is_multi_file = fields.get(4)?.as_i64() == Some(1);
    let bytes_done = fields.get(5)?.as_i64().unwrap_or(0);
    let started = fields.get(6)?.as_i64() == Some(1);
    let active = fields.get(7)?.as_i64() == Some(1);
    let complete = fields.get(8)?.as_i64() == Some(1);
    // d.ratio reports per-mille.
    let ratio = fields.get(9)?.as_i64().unwrap_or(0) as f64 / 1000.0;
    let up_rate = fields.get(10)?.as_i64().unwrap_or(0);
    let down_rate = fields.get(11)?.as_i64().unwrap_or(0);
    let peers = fields.get(12)?.as_i64().unwrap_or(0) as i32;
    let priority = fields.get(13)?.as_i64().unwrap_or(1) as i32;
    let is_private = fields.get(14)?.as_i64() == Some(1);

    let state = if !started {
        "stopped"
    } else if !active {
        "paused"
    } else if complete {
        "seeding"
    } else {
        "downloading"
    };
    let progress = if size > 0 {
        bytes_done as f64 / size as f64
    } else {
        0.0
    };
    let is_magnet_pending = name == format!("{info_hash}.meta");

    Some(TorrentView {
        info_hash,
        name,
        base_path,
        size,
        is_multi_file,
        bytes_done,
        state: state.to_string(),
        is_active: matches!(state, "downloading" | "seeding"),
        complete,
        ratio,
        up_rate,
        down_rate,
        peers,
        priority,
        is_private,
        progress,
        is_magnet_pending,
        files: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Value {
        Value::Array(values)
    }

    fn sample_row(hash: &str, name: &str, started: i64, active: i64, complete: i64) -> Value {
        row(vec![
            Value::String(hash.to_string()),
            Value::String(name.to_string()),
            Value::String("/downloads/demo".to_string()),
            Value::Int(2048),
            Value::Int(0),
            Value::Int(1024),
            Value::Int(started),
            Value::Int(active),
            Value::Int(complete),
            Value::Int(1500),
            Value::Int(10),
            Value::Int(20),
            Value::Int(3),
            Value::Int(1),
            Value::Int(1),
        ])
    }

    #[test]
    fn rows_normalize_hash_and_state() {
        let view = decode_row(&sample_row(
            "abcdef0123456789abcdef0123456789abcdef01",
            "demo",
            1,
            1,
            0,
        ))
        .unwrap();
        assert_eq!(view.info_hash, "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        assert_eq!(view.state, "downloading");
        assert!(view.is_active);
        assert!(!view.complete);
        assert!((view.ratio - 1.5).abs() < 1e-9);
        assert!((view.progress - 0.5).abs() < 1e-9);
        assert!(view.is_private);
    }

    #[test]
    fn seeding_state_requires_active_and_complete() {
        let view = decode_row(&sample_row("AA00", "demo", 1, 1, 1)).unwrap();
        assert_eq!(view.state, "seeding");
        assert!(view.is_active);

        let stopped = decode_row(&sample_row("AA00", "demo", 0, 0, 1)).unwrap();
        assert_eq!(stopped.state, "stopped");
        assert!(!stopped.is_active);
    }

    #[test]
    fn magnet_pending_detected_from_meta_name() {
        let hash = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";
        let view = decode_row(&sample_row(hash, &format!("{hash}.meta"), 1, 1, 0)).unwrap();
        assert!(view.is_magnet_pending);
    }

    const HASH: &str = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";

    #[test]
    fn hash_folder_maps_remote_path_onto_the_mount() {
        let local = info_hash_folder(
            "/mnt/seedbox",
            "/downloads",
            &format!("/downloads/{}/data/Some.Torrent", HASH.to_lowercase()),
            HASH,
        )
        .unwrap();
        assert_eq!(
            local,
            Path::new("/mnt/seedbox").join(HASH.to_lowercase())
        );
    }

    #[test]
    fn hash_folder_requires_the_download_dir_prefix() {
        assert!(info_hash_folder(
            "/mnt/seedbox",
            "/downloads",
            &format!("/srv/other/{HASH}/data"),
            HASH,
        )
        .is_none());
    }

    #[test]
    fn hash_folder_refuses_traversal_and_hashless_paths() {
        assert!(info_hash_folder(
            "/mnt/seedbox",
            "/downloads",
            &format!("/downloads/../{HASH}"),
            HASH,
        )
        .is_none());
        assert!(info_hash_folder(
            "/mnt/seedbox",
            "/downloads",
            "/downloads/unrelated/data",
            HASH,
        )
        .is_none());
    }
}
