//! Byte-moving transports for the transfer job manager.
//!
//! `GatewayTransport` implements the domain `TransferTransport` trait and
//! executes whichever mechanism the service selected: a local copy through
//! the backend's mount path, a streamed download from its HTTP endpoint
//! (nginx autoindex layout), or rsync over SSH.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use domain::{Backend, DomainError, TransferTransport, TransportKind};

const HTTP_CHUNK_TIMEOUT_SECONDS: u64 = 300;

pub struct GatewayTransport {
    http: reqwest::Client,
    rsync_progress: Regex,
}

impl GatewayTransport {
    pub fn new() -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(HTTP_CHUNK_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| DomainError::Internal(format!("HTTP client build failed: {e}")))?;
        // rsync --info=progress2 lines look like "1,234,567  45%  12.34MB/s".
        let rsync_progress = Regex::new(r"^\s*([\d,]+)\s+(\d+)%")
            .map_err(|e| DomainError::Internal(format!("Bad rsync regex: {e}")))?;
        Ok(Self {
            http,
            rsync_progress,
        })
    }
}

#[async_trait]
impl TransferTransport for GatewayTransport {
    async fn transfer(
        &self,
        kind: TransportKind,
        backend: &Backend,
        source_path: &str,
        dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        match kind {
            TransportKind::Mount => self.copy_from_mount(backend, source_path, dest_path, bytes_done).await,
            TransportKind::Http => self.download_over_http(backend, source_path, dest_path, bytes_done).await,
            TransportKind::Ssh => self.rsync_over_ssh(backend, source_path, dest_path, bytes_done).await,
        }
    }
}

impl GatewayTransport {
    async fn copy_from_mount(
        &self,
        backend: &Backend,
        source_path: &str,
        dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        let mount = backend
            .mount_path
            .as_deref()
            .ok_or_else(|| DomainError::BadRequest("Mount path not configured".to_string()))?;
        let source = Path::new(mount).join(relative_source(backend, source_path));
        if tokio::fs::metadata(&source).await.is_err() {
            return Err(DomainError::NotFound(format!(
                "Source not found on mount: {}",
                source.display()
            )));
        }
        copy_tree(&source, Path::new(dest_path), &bytes_done).await
    }

    async fn download_over_http(
        &self,
        backend: &Backend,
        source_path: &str,
        dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        let http = backend
            .http_download
            .as_ref()
            .ok_or_else(|| DomainError::BadRequest("HTTP download not configured".to_string()))?;
        let scheme = if http.use_ssl { "https" } else { "http" };
        let host = backend.http_host().unwrap_or(&backend.host);
        let base = format!(
            "{scheme}://{host}:{}/{}",
            http.port,
            http.path.trim_matches('/')
        );
        let relative = relative_source(backend, source_path);
        let url = format!("{}/{}", base.trim_end_matches('/'), relative);
        self.fetch_http_entry(backend, &url, Path::new(dest_path), &bytes_done)
            .await
    }

    /// Fetch one URL. Directories (nginx `autoindex_format json`) recurse;
    /// anything else streams to disk.
    async fn fetch_http_entry(
        &self,
        backend: &Backend,
        url: &str,
        dest: &Path,
        bytes_done: &Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        let listing = self.try_autoindex(backend, url).await?;
        if let Some(entries) = listing {
            let mut total = 0;
            tokio::fs::create_dir_all(dest)
                .await
                .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", dest)))?;
            for entry in entries {
                let child_url = format!("{}/{}", url.trim_end_matches('/'), entry.name);
                let child_dest = dest.join(&entry.name);
                total += if entry.is_dir {
                    Box::pin(self.fetch_http_entry(backend, &child_url, &child_dest, bytes_done))
                        .await?
                } else {
                    self.stream_file(backend, &child_url, &child_dest, bytes_done)
                        .await?
                };
            }
            Ok(total)
        } else {
            self.stream_file(backend, url, dest, bytes_done).await
        }
    }

    /// Probe a URL as an autoindex directory listing; `None` means it is a
    /// plain file.
    async fn try_autoindex(
        &self,
        backend: &Backend,
        url: &str,
    ) -> Result<Option<Vec<AutoindexEntry>>, DomainError> {
        let response = self
            .request(backend, &format!("{}/", url.trim_end_matches('/')))
            .send()
            .await;
        let Ok(response) = response else {
            return Ok(None);
        };
        if !response.status().is_success() {
            return Ok(None);
        }
        let is_json = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        if !is_json {
            return Ok(None);
        }
        let entries: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| DomainError::BackendFailure(format!("Bad autoindex listing: {e}")))?;
        Ok(Some(
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry["name"].as_str()?.to_string();
                    let is_dir = entry["type"].as_str() == Some("directory");
                    Some(AutoindexEntry { name, is_dir })
                })
                .collect(),
        ))
    }

    async fn stream_file(
        &self,
        backend: &Backend,
        url: &str,
        dest: &Path,
        bytes_done: &Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        debug!(url, "Downloading file");
        let mut response = self
            .request(backend, url)
            .send()
            .await
            .map_err(|e| DomainError::BackendFailure(format!("Download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(DomainError::BackendFailure(format!(
                "Download of {url} returned HTTP {}",
                response.status()
            )));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", parent)))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", dest)))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DomainError::BackendFailure(format!("Download interrupted: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| DomainError::Internal(format!("Write failed: {e}")))?;
            written += chunk.len() as u64;
            bytes_done.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        file.flush()
            .await
            .map_err(|e| DomainError::Internal(format!("Flush failed: {e}")))?;
        Ok(written)
    }

    fn request(&self, backend: &Backend, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url);
        if let Some(http) = &backend.http_download {
            if let Some(username) = &http.username {
                request = request.basic_auth(username, http.password.as_deref());
            }
        }
        request
    }

    async fn rsync_over_ssh(
        &self,
        backend: &Backend,
        source_path: &str,
        dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError> {
        let ssh = backend
            .ssh
            .as_ref()
            .ok_or_else(|| DomainError::BadRequest("SSH not configured".to_string()))?;
        let host = backend.ssh_host().unwrap_or(&backend.host);

        let mut ssh_cmd = format!("ssh -p {}", ssh.port);
        if let Some(key_path) = &ssh.key_path {
            ssh_cmd.push_str(&format!(" -i {key_path}"));
        }
        ssh_cmd.push_str(" -o StrictHostKeyChecking=accept-new -o BatchMode=yes");

        if let Some(parent) = Path::new(dest_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", parent)))?;
        }

        let remote = format!("{}@{host}:{}/", ssh.user, source_path.trim_end_matches('/'));
        let mut child = Command::new("rsync")
            .args(["-az", "--partial", "--info=progress2"])
            .arg("-e")
            .arg(&ssh_cmd)
            .arg(&remote)
            .arg(dest_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::Internal(format!("rsync failed to start: {e}")))?;

        let stdout = child.stdout.take();
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(bytes) = self.parse_rsync_progress(&line) {
                    bytes_done.store(bytes, Ordering::Relaxed);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::Internal(format!("rsync wait failed: {e}")))?;
        if !status.success() {
            return Err(DomainError::BackendFailure(format!(
                "rsync exited with {status}"
            )));
        }
        Ok(bytes_done.load(Ordering::Relaxed))
    }

    fn parse_rsync_progress(&self, line: &str) -> Option<u64> {
        let captures = self.rsync_progress.captures(line.trim_start_matches('\r'))?;
        captures[1].replace(',', "").parse().ok()
    }
}

struct AutoindexEntry {
    name: String,
    is_dir: bool,
}

/// Remote path relative to the backend's download directory; falls back to
/// the basename when the source lives elsewhere.
fn relative_source(backend: &Backend, source_path: &str) -> String {
    if let Some(dir) = &backend.download_dir {
        if let Some(stripped) = source_path.strip_prefix(dir.trim_end_matches('/')) {
            let stripped = stripped.trim_start_matches('/');
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    Path::new(source_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_path.trim_matches('/').to_string())
}

/// Recursive copy reporting per-chunk progress through the shared counter.
async fn copy_tree(
    source: &Path,
    dest: &Path,
    bytes_done: &Arc<AtomicU64>,
) -> Result<u64, DomainError> {
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| DomainError::Internal(format!("Cannot stat {:?}: {e}", source)))?;
    if metadata.is_file() {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", parent)))?;
        }
        let copied = tokio::fs::copy(source, dest)
            .await
            .map_err(|e| DomainError::Internal(format!("Copy failed: {e}")))?;
        bytes_done.fetch_add(copied, Ordering::Relaxed);
        return Ok(copied);
    }

    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| DomainError::Internal(format!("Cannot create {:?}: {e}", dest)))?;
    let mut total = 0;
    let mut entries = tokio::fs::read_dir(source)
        .await
        .map_err(|e| DomainError::Internal(format!("Cannot read {:?}: {e}", source)))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DomainError::Internal(format!("Cannot read {:?}: {e}", source)))?
    {
        let child_dest: PathBuf = dest.join(entry.file_name());
        total += Box::pin(copy_tree(&entry.path(), &child_dest, bytes_done)).await?;
    }
    Ok(total)
}
