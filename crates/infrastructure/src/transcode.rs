//! ffmpeg-backed transcoder for the HLS stream manager.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use domain::{DomainError, TranscodeHandle, Transcoder, PLAYLIST_NAME};

pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }

    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_duration(&self, source: &Path) -> Result<f64, DomainError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DomainError::Internal(format!("ffprobe failed to run: {e}")))?;
        if !output.status.success() {
            return Err(DomainError::BadRequest(format!(
                "ffprobe could not read {}",
                source.display()
            )));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|_| DomainError::Internal("ffprobe returned no duration".to_string()))
    }

    async fn spawn(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> Result<Box<dyn TranscodeHandle>, DomainError> {
        let playlist = out_dir.join(PLAYLIST_NAME);
        let segments = out_dir.join("seg%05d.ts");
        debug!(source = %source.display(), "Spawning ffmpeg HLS transcode");
        let child = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args([
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-c:a", "aac", "-ac", "2",
                "-f", "hls", "-hls_time", "4", "-hls_playlist_type", "event",
            ])
            .arg("-hls_segment_filename")
            .arg(&segments)
            .arg(&playlist)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::Internal(format!("ffmpeg failed to start: {e}")))?;
        Ok(Box::new(FfmpegHandle { child }))
    }
}

struct FfmpegHandle {
    child: Child,
}

#[async_trait]
impl TranscodeHandle for FfmpegHandle {
    async fn try_wait(&mut self) -> Result<Option<bool>, DomainError> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| s.success()))
            .map_err(|e| DomainError::Internal(format!("Transcoder wait failed: {e}")))
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}
