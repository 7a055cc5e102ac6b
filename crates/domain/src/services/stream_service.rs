//! On-demand HLS transcoding jobs.
//!
//! A job is keyed by `(backend_id, file_path)`; starting the same stream
//! twice returns the existing job. The external transcoder writes a playlist
//! plus segments into a per-job scratch directory, progress is derived from
//! the segment durations written so far, and a janitor terminates jobs idle
//! past the configured window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::errors::DomainError;
use crate::repositories::BackendRepository;
use crate::services::auth_service::generate_token;

pub const PLAYLIST_NAME: &str = "playlist.m3u8";
const JOB_ID_LENGTH: usize = 22;
const JANITOR_PERIOD_SECONDS: u64 = 30;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "wmv", "flv", "webm", "m4v",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "aac", "ogg", "opus", "wma", "m4b",
];

/// Spawns and probes the external transcoder (ffmpeg-style).
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe_duration(&self, source: &Path) -> Result<f64, DomainError>;

    /// Start a transcode of `source` writing `playlist.m3u8` + segments
    /// into `out_dir`.
    async fn spawn(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> Result<Box<dyn TranscodeHandle>, DomainError>;
}

/// A running transcoder process.
#[async_trait]
pub trait TranscodeHandle: Send {
    /// `None` while running, otherwise whether the process exited cleanly.
    async fn try_wait(&mut self) -> Result<Option<bool>, DomainError>;

    async fn kill(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Starting,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub job_id: String,
    pub playlist_url: String,
    pub duration_seconds: f64,
    pub transcoded_seconds: f64,
    pub media_type: String,
    pub status: StreamStatus,
}

struct StreamJob {
    id: String,
    user_id: String,
    backend_id: String,
    file_path: String,
    scratch_dir: PathBuf,
    duration_seconds: f64,
    media_type: String,
    status: StreamStatus,
    handle: Box<dyn TranscodeHandle>,
    last_touched: Instant,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub stream_dir: PathBuf,
    pub idle_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_dir: std::env::temp_dir().join("torrent-gateway-streams"),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, StreamJob>,
    by_key: HashMap<(String, String), String>,
}

pub struct StreamService {
    backends: Arc<dyn BackendRepository>,
    transcoder: Arc<dyn Transcoder>,
    registry: Mutex<Registry>,
    config: StreamConfig,
}

impl StreamService {
    pub fn new(
        backends: Arc<dyn BackendRepository>,
        transcoder: Arc<dyn Transcoder>,
        config: StreamConfig,
    ) -> Self {
        Self {
            backends,
            transcoder,
            registry: Mutex::new(Registry::default()),
            config,
        }
    }

    /// Start (or join) a transcoding job for a media file on the backend's
    /// mount path.
    pub async fn start_stream(
        &self,
        user_id: &str,
        backend_id: &str,
        file_path: &str,
    ) -> Result<StreamInfo, DomainError> {
        let backend = match self.backends.find_by_id(backend_id).await? {
            Some(backend) if backend.user_id == user_id => backend,
            _ => return Err(DomainError::NotFound(format!("Server {backend_id}"))),
        };
        let mount = backend.mount_path.as_deref().ok_or_else(|| {
            DomainError::BadRequest(
                "Streaming requires mount_path to be configured for this server".to_string(),
            )
        })?;

        let relative = sanitize_relative_path(file_path)?;
        let media_type = media_type_for(&relative).ok_or_else(|| {
            DomainError::BadRequest(format!("File type of {file_path} is not streamable"))
        })?;
        let source = Path::new(mount).join(&relative);
        if tokio::fs::metadata(&source).await.is_err() {
            return Err(DomainError::NotFound(format!(
                "File not found on local mount: {file_path}"
            )));
        }

        let key = (backend.id.clone(), relative.clone());
        {
            let mut registry = self.registry.lock().await;
            if let Some(id) = registry.by_key.get(&key).cloned() {
                if let Some(job) = registry.jobs.get_mut(&id) {
                    job.last_touched = Instant::now();
                    debug!(job = %id, "Joined existing stream job");
                    return Ok(info_for(job));
                }
            }
        }

        let duration = self.transcoder.probe_duration(&source).await?;
        let id = generate_token(JOB_ID_LENGTH);
        let scratch_dir = self.config.stream_dir.join(&id);
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|e| DomainError::Internal(format!("Cannot create scratch dir: {e}")))?;
        let handle = self.transcoder.spawn(&source, &scratch_dir).await?;

        let job = StreamJob {
            id: id.clone(),
            user_id: user_id.to_string(),
            backend_id: backend.id.clone(),
            file_path: relative,
            scratch_dir,
            duration_seconds: duration,
            media_type,
            status: StreamStatus::Starting,
            handle,
            last_touched: Instant::now(),
        };
        let info = info_for(&job);

        let mut registry = self.registry.lock().await;
        registry.by_key.insert(key, id.clone());
        registry.jobs.insert(id.clone(), job);
        info!(job = %id, "Started stream job");
        Ok(info)
    }

    /// Poll a job: refreshes its idle clock, advances its status from the
    /// transcoder process, and reports playlist-derived progress.
    pub async fn job_info(&self, user_id: &str, job_id: &str) -> Result<StreamInfo, DomainError> {
        let mut registry = self.registry.lock().await;
        let job = registry
            .jobs
            .get_mut(job_id)
            .filter(|job| job.user_id == user_id)
            .ok_or_else(|| DomainError::NotFound(format!("Stream job {job_id}")))?;

        job.last_touched = Instant::now();
        if matches!(job.status, StreamStatus::Starting | StreamStatus::Running) {
            match job.handle.try_wait().await {
                Ok(None) => {
                    if job.scratch_dir.join(PLAYLIST_NAME).exists() {
                        job.status = StreamStatus::Running;
                    }
                }
                Ok(Some(true)) => job.status = StreamStatus::Done,
                Ok(Some(false)) => job.status = StreamStatus::Failed,
                Err(e) => {
                    warn!(job = %job.id, "Transcoder poll failed: {e}");
                    job.status = StreamStatus::Failed;
                }
            }
        }

        let mut info = info_for(job);
        info.transcoded_seconds = read_transcoded_seconds(&job.scratch_dir).await;
        if job.status == StreamStatus::Done {
            info.transcoded_seconds = job.duration_seconds;
        }
        Ok(info)
    }

    /// Resolve a playlist or segment file inside the job's scratch dir and
    /// refresh its idle clock.
    pub async fn serve_path(
        &self,
        user_id: &str,
        job_id: &str,
        file_name: &str,
    ) -> Result<PathBuf, DomainError> {
        let relative = sanitize_relative_path(file_name)?;
        let mut registry = self.registry.lock().await;
        let job = registry
            .jobs
            .get_mut(job_id)
            .filter(|job| job.user_id == user_id)
            .ok_or_else(|| DomainError::NotFound(format!("Stream job {job_id}")))?;
        job.last_touched = Instant::now();
        Ok(job.scratch_dir.join(relative))
    }

    /// Terminate jobs idle past the configured window and remove their
    /// scratch directories.
    pub async fn reap_idle(&self) {
        let mut victims = Vec::new();
        {
            let mut registry = self.registry.lock().await;
            let idle: Vec<String> = registry
                .jobs
                .values()
                .filter(|job| job.last_touched.elapsed() >= self.config.idle_timeout)
                .map(|job| job.id.clone())
                .collect();
            for id in idle {
                if let Some(job) = registry.jobs.remove(&id) {
                    registry
                        .by_key
                        .remove(&(job.backend_id.clone(), job.file_path.clone()));
                    victims.push(job);
                }
            }
        }
        for mut job in victims {
            info!(job = %job.id, "Reaping idle stream job");
            job.handle.kill().await;
            if let Err(e) = tokio::fs::remove_dir_all(&job.scratch_dir).await {
                warn!(job = %job.id, "Scratch cleanup failed: {e}");
            }
        }
    }

    pub async fn run_janitor(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(JANITOR_PERIOD_SECONDS));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reap_idle().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown_all().await;
    }

    /// Kill every job and remove all scratch state.
    pub async fn shutdown_all(&self) {
        let jobs: Vec<StreamJob> = {
            let mut registry = self.registry.lock().await;
            registry.by_key.clear();
            registry.jobs.drain().map(|(_, job)| job).collect()
        };
        for mut job in jobs {
            job.handle.kill().await;
            let _ = tokio::fs::remove_dir_all(&job.scratch_dir).await;
        }
    }
}

fn info_for(job: &StreamJob) -> StreamInfo {
    StreamInfo {
        job_id: job.id.clone(),
        playlist_url: format!("/streams/{}/files/{PLAYLIST_NAME}", job.id),
        duration_seconds: job.duration_seconds,
        transcoded_seconds: 0.0,
        media_type: job.media_type.clone(),
        status: job.status,
    }
}

async fn read_transcoded_seconds(scratch_dir: &Path) -> f64 {
    match tokio::fs::read_to_string(scratch_dir.join(PLAYLIST_NAME)).await {
        Ok(content) => playlist_seconds(&content),
        Err(_) => 0.0,
    }
}

/// Sum of `#EXTINF` segment durations in an HLS playlist.
pub fn playlist_seconds(playlist: &str) -> f64 {
    playlist
        .lines()
        .filter_map(|line| line.strip_prefix("#EXTINF:"))
        .filter_map(|rest| rest.split(',').next())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .sum()
}

/// Normalize a user-supplied relative path, rejecting traversal.
pub fn sanitize_relative_path(path: &str) -> Result<String, DomainError> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(DomainError::BadRequest("Empty file path".to_string()));
    }
    for component in trimmed.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(DomainError::BadRequest(format!(
                "Invalid file path: {path}"
            )));
        }
    }
    Ok(trimmed.to_string())
}

/// `video` / `audio` by extension, `None` for non-streamable files.
pub fn media_type_for(path: &str) -> Option<String> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;
    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Some("video".to_string())
    } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        Some("audio".to_string())
    } else {
        None
    }
}
