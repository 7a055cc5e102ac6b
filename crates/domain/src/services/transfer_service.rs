//! Transfers completed torrent payloads from a backend to local storage.
//!
//! One job per `(torrent_hash, backend_id)`: re-submitting while a job is
//! pending or running returns the existing job. The byte-moving mechanism is
//! chosen from the backend's configuration: mount path, then HTTP download,
//! then SSH. Failure is terminal; retrying means submitting a new job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clients::ClientFactory;
use crate::entities::{Action, ActionKind, Backend, TransferJob, TransferState};
use crate::errors::DomainError;
use crate::magnet;
use crate::repositories::{
    ActionRepository, BackendRepository, SettingRepository, TorrentRepository, TransferRepository,
};
use crate::services::auth_service::generate_token;
use crate::services::{EventBus, EventKind};

const JOB_ID_LENGTH: usize = 22;
const PROGRESS_FLUSH_SECONDS: u64 = 2;

/// Per-torrent setting keys consulted by the transfer flow.
pub const SETTING_DOWNLOAD_PATH: &str = "download_path";
pub const SETTING_AUTO_DOWNLOAD: &str = "auto_download";
pub const SETTING_DELETE_REMOTE: &str = "delete_remote_after";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Mount,
    Http,
    Ssh,
}

/// Transport priority: mount path, then HTTP download, then SSH.
pub fn select_transport(backend: &Backend) -> Option<TransportKind> {
    if backend.mount_path.is_some() {
        Some(TransportKind::Mount)
    } else if backend.http_download.is_some() {
        Some(TransportKind::Http)
    } else if backend.ssh.is_some() {
        Some(TransportKind::Ssh)
    } else {
        None
    }
}

/// Moves the payload bytes. Implementations report progress through the
/// shared counter and return the total bytes moved.
#[async_trait]
pub trait TransferTransport: Send + Sync {
    async fn transfer(
        &self,
        kind: TransportKind,
        backend: &Backend,
        source_path: &str,
        dest_path: &str,
        bytes_done: Arc<AtomicU64>,
    ) -> Result<u64, DomainError>;
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub max_concurrent: usize,
    pub poll_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct TransferService {
    transfers: Arc<dyn TransferRepository>,
    backends: Arc<dyn BackendRepository>,
    torrents: Arc<dyn TorrentRepository>,
    actions: Arc<dyn ActionRepository>,
    settings: Arc<dyn SettingRepository>,
    factory: Arc<dyn ClientFactory>,
    transport: Arc<dyn TransferTransport>,
    events: EventBus,
    config: TransferConfig,
}

impl TransferService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transfers: Arc<dyn TransferRepository>,
        backends: Arc<dyn BackendRepository>,
        torrents: Arc<dyn TorrentRepository>,
        actions: Arc<dyn ActionRepository>,
        settings: Arc<dyn SettingRepository>,
        factory: Arc<dyn ClientFactory>,
        transport: Arc<dyn TransferTransport>,
        events: EventBus,
        config: TransferConfig,
    ) -> Self {
        Self {
            transfers,
            backends,
            torrents,
            actions,
            settings,
            factory,
            transport,
            events,
            config,
        }
    }

    async fn setting(&self, user_id: &str, hash: &str, key: &str) -> Option<String> {
        self.settings
            .get(user_id, hash, key)
            .await
            .ok()
            .flatten()
            .map(|s| s.value)
    }

    /// Whether a completion on this backend should auto-transfer, honoring
    /// the per-torrent override over the backend default.
    pub async fn auto_download_enabled(&self, backend: &Backend, info_hash: &str) -> bool {
        match self
            .setting(&backend.user_id, info_hash, SETTING_AUTO_DOWNLOAD)
            .await
        {
            Some(value) => value == "true",
            None => backend.auto_download.is_some(),
        }
    }

    /// Submit a transfer. Idempotent while a job for the same torrent and
    /// backend is still pending or running.
    pub async fn submit(
        &self,
        user_id: &str,
        info_hash: &str,
        backend_id: &str,
        dest_override: Option<&str>,
    ) -> Result<TransferJob, DomainError> {
        let hash = magnet::normalize_info_hash(info_hash)?;
        let backend = match self.backends.find_by_id(backend_id).await? {
            Some(backend) if backend.user_id == user_id => backend,
            _ => return Err(DomainError::NotFound(format!("Server {backend_id}"))),
        };

        if let Some(existing) = self.transfers.find_active(&hash, &backend.id).await? {
            info!(job = %existing.id, "Transfer already queued or running");
            return Ok(existing);
        }

        let row = self.torrents.get(user_id, &hash, &backend.id).await?;
        let source_path = row
            .as_ref()
            .and_then(|t| t.base_path.clone())
            .or_else(|| {
                backend
                    .download_dir
                    .as_ref()
                    .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), hash.to_lowercase()))
            })
            .ok_or_else(|| {
                DomainError::BadRequest("Cannot determine remote path for transfer".to_string())
            })?;

        // Destination precedence: explicit override, per-torrent setting,
        // backend default.
        let dest_base = match dest_override {
            Some(path) => Some(path.to_string()),
            None => self.setting(user_id, &hash, SETTING_DOWNLOAD_PATH).await,
        }
        .or_else(|| backend.auto_download.as_ref().map(|a| a.local_path.clone()))
        .ok_or_else(|| DomainError::BadRequest("No local download path configured".to_string()))?;
        let dest_path = format!(
            "{}/{}",
            dest_base.trim_end_matches('/'),
            hash.to_lowercase()
        );

        let job = TransferJob {
            id: generate_token(JOB_ID_LENGTH),
            user_id: user_id.to_string(),
            torrent_hash: hash.clone(),
            backend_id: backend.id.clone(),
            source_path,
            dest_path,
            state: TransferState::Pending,
            bytes_done: 0,
            bytes_total: row.map(|t| t.size).unwrap_or(0),
            error: None,
            started_at: Utc::now().naive_utc(),
            finished_at: None,
        };
        self.transfers.create(&job).await?;
        self.actions
            .append(&Action {
                torrent_hash: hash.clone(),
                backend_id: Some(backend.id.clone()),
                kind: ActionKind::TransferStart,
                detail: Some(job.dest_path.clone()),
                timestamp: job.started_at,
            })
            .await?;
        self.events.publish(
            EventKind::TransferStarted,
            user_id,
            Some(&backend.id),
            Some(&hash),
            json!({ "job_id": job.id, "dest": job.dest_path }),
        );
        info!(job = %job.id, info_hash = %hash, "Queued transfer");
        Ok(job)
    }

    pub async fn get(&self, user_id: &str, job_id: &str) -> Result<TransferJob, DomainError> {
        match self.transfers.get(job_id).await? {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(DomainError::NotFound(format!("Transfer {job_id}"))),
        }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<TransferJob>, DomainError> {
        self.transfers.list_for_user(user_id).await
    }

    /// Worker loop: claims pending jobs and runs them, at most
    /// `max_concurrent` at a time.
    pub async fn run_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent = self.config.max_concurrent,
            "Transfer worker started"
        );
        let mut running: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while running.try_join_next().is_some() {}
                    let slots = self.config.max_concurrent.saturating_sub(running.len());
                    if slots == 0 {
                        continue;
                    }
                    match self.transfers.claim_pending(slots).await {
                        Ok(jobs) => {
                            for job in jobs {
                                let service = Arc::clone(&self);
                                running.spawn(async move { service.process_job(job).await });
                            }
                        }
                        Err(e) => warn!("Claiming pending transfers failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Let in-flight copies finish; they are bounded by their own I/O.
        while running.join_next().await.is_some() {}
        info!("Transfer worker stopped");
    }

    async fn process_job(&self, job: TransferJob) {
        let backend = match self.backends.find_by_id(&job.backend_id).await {
            Ok(Some(backend)) => backend,
            Ok(None) => {
                self.fail_job(&job, "Server was deleted".to_string()).await;
                return;
            }
            Err(e) => {
                self.fail_job(&job, e.to_string()).await;
                return;
            }
        };

        let Some(kind) = select_transport(&backend) else {
            self.fail_job(&job, "No transfer transport configured".to_string())
                .await;
            return;
        };

        info!(job = %job.id, ?kind, "Transfer running");
        let bytes_done = Arc::new(AtomicU64::new(0));
        let transfer = self.transport.transfer(
            kind,
            &backend,
            &job.source_path,
            &job.dest_path,
            Arc::clone(&bytes_done),
        );
        tokio::pin!(transfer);

        let mut flush = tokio::time::interval(Duration::from_secs(PROGRESS_FLUSH_SECONDS));
        let outcome = loop {
            tokio::select! {
                result = &mut transfer => break result,
                _ = flush.tick() => {
                    let done = bytes_done.load(Ordering::Relaxed) as i64;
                    if let Err(e) = self.transfers.update_progress(&job.id, done).await {
                        warn!(job = %job.id, "Progress update failed: {e}");
                    }
                }
            }
        };

        match outcome {
            Ok(total) => self.complete_job(&job, &backend, total).await,
            Err(e) => self.fail_job(&job, e.to_string()).await,
        }
    }

    async fn complete_job(&self, job: &TransferJob, backend: &Backend, total: u64) {
        let now = Utc::now().naive_utc();
        if let Err(e) = self
            .transfers
            .finish(&job.id, TransferState::Done, total as i64, None, now)
            .await
        {
            warn!(job = %job.id, "Could not mark transfer done: {e}");
        }

        let delete_remote = match self
            .setting(&job.user_id, &job.torrent_hash, SETTING_DELETE_REMOTE)
            .await
        {
            Some(value) => value == "true",
            None => backend
                .auto_download
                .as_ref()
                .map(|a| a.delete_remote_after)
                .unwrap_or(false),
        };
        if delete_remote {
            match self.factory.client_for(backend) {
                Ok(client) => {
                    if let Err(e) = client.erase(&job.torrent_hash, false).await {
                        warn!(info_hash = %job.torrent_hash, "Post-transfer erase failed: {e}");
                    }
                }
                Err(e) => warn!("Post-transfer erase skipped: {e}"),
            }
        }

        if let Err(e) = self
            .actions
            .append(&Action {
                torrent_hash: job.torrent_hash.clone(),
                backend_id: Some(job.backend_id.clone()),
                kind: ActionKind::TransferDone,
                detail: Some(job.dest_path.clone()),
                timestamp: now,
            })
            .await
        {
            warn!(job = %job.id, "Could not record transfer action: {e}");
        }
        self.events.publish(
            EventKind::TransferCompleted,
            &job.user_id,
            Some(&job.backend_id),
            Some(&job.torrent_hash),
            json!({ "job_id": job.id, "bytes": total }),
        );
        info!(job = %job.id, bytes = total, "Transfer done");
    }

    async fn fail_job(&self, job: &TransferJob, message: String) {
        warn!(job = %job.id, "Transfer failed: {message}");
        let now = Utc::now().naive_utc();
        if let Err(e) = self
            .transfers
            .finish(
                &job.id,
                TransferState::Failed,
                job.bytes_done,
                Some(message.clone()),
                now,
            )
            .await
        {
            warn!(job = %job.id, "Could not mark transfer failed: {e}");
        }
        if let Err(e) = self
            .actions
            .append(&Action {
                torrent_hash: job.torrent_hash.clone(),
                backend_id: Some(job.backend_id.clone()),
                kind: ActionKind::Error,
                detail: Some(message.clone()),
                timestamp: now,
            })
            .await
        {
            warn!(job = %job.id, "Could not record failure action: {e}");
        }
        self.events.publish(
            EventKind::Error,
            &job.user_id,
            Some(&job.backend_id),
            Some(&job.torrent_hash),
            json!({ "job_id": job.id, "error": message }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BackendKind;

    fn bare_backend() -> Backend {
        Backend {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            name: "seedbox".to_string(),
            kind: BackendKind::Rtorrent,
            host: "remote".to_string(),
            port: 9080,
            rpc_path: None,
            use_ssl: false,
            username: None,
            password: None,
            enabled: true,
            is_default: false,
            version: 1,
            last_used_at: None,
            created_at: Utc::now().naive_utc(),
            http_download: None,
            mount_path: None,
            download_dir: None,
            auto_download: None,
            ssh: None,
        }
    }

    #[test]
    fn transport_selection_prefers_mount_then_http_then_ssh() {
        let mut backend = bare_backend();
        assert_eq!(select_transport(&backend), None);

        backend.ssh = Some(crate::entities::SshConfig {
            host: None,
            port: 22,
            user: "seed".to_string(),
            key_path: None,
        });
        assert_eq!(select_transport(&backend), Some(TransportKind::Ssh));

        backend.http_download = Some(crate::entities::HttpDownload {
            host: None,
            port: 8080,
            path: "/downloads/".to_string(),
            username: None,
            password: None,
            use_ssl: false,
        });
        assert_eq!(select_transport(&backend), Some(TransportKind::Http));

        backend.mount_path = Some("/mnt/seedbox".to_string());
        assert_eq!(select_transport(&backend), Some(TransportKind::Mount));
    }
}
