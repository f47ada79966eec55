//! Merging separate video and audio streams with ffmpeg

use crate::error::SigtubeError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Combines a video-only and an audio-only file into one container
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SigtubeError>;
}

/// Muxer backed by an external ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Video is copied as is, audio re-encoded to AAC
    pub fn ffmpeg_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-strict".into(),
            "experimental".into(),
            output.into(),
        ]
    }

    async fn run(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SigtubeError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::ffmpeg_args(video, audio, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stderr = child.stderr.take();

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Merge cancelled, stopping ffmpeg");
                if let Err(e) = child.kill().await {
                    warn!("Could not kill ffmpeg: {}", e);
                }
                remove_if_present(output).await;
                return Err(SigtubeError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            if let Some(mut stderr) = stderr {
                let mut log = String::new();
                if tokio::io::AsyncReadExt::read_to_string(&mut stderr, &mut log)
                    .await
                    .is_ok()
                {
                    debug!("ffmpeg stderr: {}", log.lines().last().unwrap_or_default());
                }
            }
            remove_if_present(output).await;
            return Err(SigtubeError::MuxFailed {
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    /// Both inputs are removed afterwards, whatever the outcome.
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SigtubeError> {
        info!("Merging {} + {} -> {}", video.display(), audio.display(), output.display());
        let result = self.run(video, audio, output, cancel).await;

        remove_if_present(video).await;
        remove_if_present(audio).await;

        if result.is_ok() {
            info!("Merged into {}", output.display());
        }
        result
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
