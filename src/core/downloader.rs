//! Main downloader implementation

use crate::cipher::{AnchorConfig, DecodeSession, TransformPrograms, TransformRegistry};
use crate::core::progress::{DownloadEvent, StreamRole};
use crate::core::video_info::{choose_formats, Format, MediaType, Quality, VideoDetails};
use crate::download::{
    ChunkedDownloader, DownloadOutcome, DownloadTask, DownloaderConfig, FfmpegMuxer, Muxer,
    RetryConfig, UrlRefresher, DEFAULT_CHUNK_SIZE,
};
use crate::error::{CipherError, SigtubeError};
use crate::platform::{BundleFetcher, HttpClient, InnerTubeClient};
use crate::utils::{extract_playlist_id, extract_video_id, sanitize_title, unique_path};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress callback that also learns which stream is moving
pub type StreamProgressCallback = Arc<dyn Fn(StreamRole, DownloadEvent) + Send + Sync>;

/// Main downloader configuration
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub media: MediaType,
    pub quality: Quality,
    /// Directory receiving all files
    pub output_dir: PathBuf,
    /// Merge separate video and audio streams with the muxer
    pub merge: bool,
    pub chunk_size: u64,
    /// Retries per chunk
    pub max_retries: u32,
    /// Linear backoff step between chunk retries
    pub retry_step: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            media: MediaType::default(),
            quality: Quality::default(),
            output_dir: PathBuf::from("."),
            merge: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            retry_step: Duration::from_millis(2000),
        }
    }
}

/// A selected format with its final URL
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub role: StreamRole,
    pub format: Format,
    pub url: String,
}

/// A video with every selected stream resolved
#[derive(Debug, Clone)]
pub struct ResolvedVideo {
    pub details: VideoDetails,
    pub streams: Vec<ResolvedStream>,
}

/// What a video download produced
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub details: VideoDetails,
    /// Final files; the merged file alone when streams were muxed
    pub outputs: Vec<DownloadOutcome>,
}

/// Main downloader struct
pub struct Downloader {
    options: DownloadOptions,
    http: HttpClient,
    innertube: InnerTubeClient,
    bundles: BundleFetcher,
    registry: TransformRegistry,
    muxer: Arc<dyn Muxer>,
    progress_callback: Option<StreamProgressCallback>,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Result<Self, SigtubeError> {
        Ok(Self::with_http(HttpClient::new()?, options))
    }

    pub fn with_http(http: HttpClient, options: DownloadOptions) -> Self {
        Self {
            options,
            innertube: InnerTubeClient::new(http.clone()),
            bundles: BundleFetcher::new(http.clone()),
            http,
            registry: TransformRegistry::default(),
            muxer: Arc::new(FfmpegMuxer::default()),
            progress_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use another host for the player API, embed page and bundles
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.innertube = self.innertube.with_base_url(base_url);
        self.bundles = self.bundles.with_base_url(base_url);
        self
    }

    pub fn with_anchors(mut self, anchors: AnchorConfig) -> Self {
        self.registry = TransformRegistry::new(anchors);
        self
    }

    pub fn with_muxer(mut self, muxer: Arc<dyn Muxer>) -> Self {
        self.muxer = muxer;
        self
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamRole, DownloadEvent) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Metadata and formats for a video URL or id
    pub async fn video_details(&self, input: &str) -> Result<VideoDetails, SigtubeError> {
        let video_id = extract_video_id(input)?;
        self.innertube.get_video_details(&video_id).await
    }

    /// Resolve video URL and get metadata without downloading
    pub async fn resolve(&self, input: &str) -> Result<ResolvedVideo, SigtubeError> {
        let details = self.video_details(input).await?;
        self.resolve_details(details).await
    }

    /// Select formats and run one decode pass over all of them
    pub async fn resolve_details(&self, details: VideoDetails) -> Result<ResolvedVideo, SigtubeError> {
        let choice = choose_formats(&details.formats, self.options.media, &self.options.quality);
        if choice.is_empty() {
            return Err(SigtubeError::NoFormatFound);
        }

        let selected: Vec<(StreamRole, Format)> = choice
            .video
            .map(|f| (StreamRole::Video, f))
            .into_iter()
            .chain(choice.audio.map(|f| (StreamRole::Audio, f)))
            .collect();
        for (role, format) in &selected {
            debug!(
                "selected {} itag {} ({}, {:?})",
                role, format.itag, format.mime_type, format.quality_label
            );
        }

        let programs = self.registry.programs(&self.bundles).await?;
        let formats = selected.iter().map(|(_, f)| f.clone()).collect();
        let urls = decode_formats(programs, formats).await?;

        let streams = selected
            .into_iter()
            .zip(urls)
            .map(|((role, format), url)| ResolvedStream { role, format, url })
            .collect();
        Ok(ResolvedVideo { details, streams })
    }

    /// Download video to file
    pub async fn download(&self, input: &str) -> Result<DownloadReport, SigtubeError> {
        let details = self.video_details(input).await?;
        self.download_details(details).await
    }

    pub async fn download_details(&self, details: VideoDetails) -> Result<DownloadReport, SigtubeError> {
        let dir = self.options.output_dir.clone();
        tokio::fs::create_dir_all(&dir).await?;

        let title = sanitize_title(&details.title);
        let resolved = self.resolve_details(details).await?;
        let merge = self.options.merge && resolved.streams.len() == 2;
        info!("Starting download for: {}", resolved.details.title);

        let merged_path = dir.join(format!("{}.mp4", title));
        if merge && tokio::fs::try_exists(&merged_path).await? {
            info!("{} already exists, skipping", merged_path.display());
            return Ok(DownloadReport {
                details: resolved.details,
                outputs: vec![DownloadOutcome::AlreadyExists(merged_path)],
            });
        }

        let mut outcomes = Vec::with_capacity(resolved.streams.len());
        for stream in &resolved.streams {
            let result = match stream_path(&dir, &title, stream, merge) {
                Ok(output) => self.download_stream(stream, output).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    if merge {
                        remove_intermediates(&outcomes).await;
                    }
                    return Err(e);
                }
            }
        }

        if !merge {
            return Ok(DownloadReport {
                details: resolved.details,
                outputs: outcomes,
            });
        }

        self.muxer
            .merge(outcomes[0].path(), outcomes[1].path(), &merged_path, &self.cancel)
            .await?;
        let bytes = tokio::fs::metadata(&merged_path).await?.len();
        Ok(DownloadReport {
            details: resolved.details,
            outputs: vec![DownloadOutcome::Completed {
                path: merged_path,
                bytes,
            }],
        })
    }

    async fn download_stream(
        &self,
        stream: &ResolvedStream,
        output: PathBuf,
    ) -> Result<DownloadOutcome, SigtubeError> {
        let config = DownloaderConfig {
            chunk_size: self.options.chunk_size.max(1),
            retry: RetryConfig::linear(self.options.max_retries, self.options.retry_step),
            progress_callback: None,
        };
        let mut downloader = ChunkedDownloader::with_config(self.http.clone(), config);
        if let Some(callback) = self.progress_callback.clone() {
            let role = stream.role;
            downloader = downloader.with_progress_callback(move |event| callback(role, event));
        }

        let refresher = DecodeRefresher {
            registry: self.registry.clone(),
            bundles: self.bundles.clone(),
        };
        let task = DownloadTask {
            format: stream.format.clone(),
            url: stream.url.clone(),
            output,
        };
        downloader.download(task, Some(&refresher), &self.cancel).await
    }

    /// Resolve every video of a playlist; videos that fail are skipped
    pub async fn resolve_playlist(
        &self,
        input: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ResolvedVideo>, SigtubeError> {
        let playlist_id = extract_playlist_id(input)?;
        let videos = self.innertube.get_playlist(&playlist_id, limit).await?;

        let mut resolved = Vec::with_capacity(videos.len());
        for details in videos {
            let title = details.title.clone();
            match self.resolve_details(details).await {
                Ok(video) => resolved.push(video),
                Err(e) => warn!("Failed to resolve {}: {}", title, e),
            }
        }
        Ok(resolved)
    }

    /// Download playlist; videos that fail are skipped, cancellation stops the run
    pub async fn download_playlist(
        &self,
        input: &str,
        limit: Option<usize>,
    ) -> Result<Vec<DownloadReport>, SigtubeError> {
        let playlist_id = extract_playlist_id(input)?;
        let videos = self.innertube.get_playlist(&playlist_id, limit).await?;
        if videos.is_empty() {
            return Err(SigtubeError::Playlist(format!(
                "playlist {} has no available videos",
                playlist_id
            )));
        }

        let total = videos.len();
        let mut reports = Vec::with_capacity(total);
        for (index, details) in videos.into_iter().enumerate() {
            let title = details.title.clone();
            info!("Playlist item {}/{}: {}", index + 1, total, title);
            match self.download_details(details).await {
                Ok(report) => reports.push(report),
                Err(SigtubeError::Cancelled) => return Err(SigtubeError::Cancelled),
                Err(e) if e.is_cipher_error() => {
                    warn!("Skipping {}: stream URL could not be deciphered ({})", title, e)
                }
                Err(e) => warn!("Failed to download {}: {}", title, e),
            }
        }
        Ok(reports)
    }
}

/// Delete merge inputs that finished before a later stream failed
async fn remove_intermediates(outcomes: &[DownloadOutcome]) {
    for outcome in outcomes {
        if let DownloadOutcome::Completed { path, .. } = outcome {
            debug!("removing intermediate {}", path.display());
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Muxed streams keep the bare title; separate streams get a role suffix,
/// made unique when they are only intermediates of a merge
fn stream_path(
    dir: &Path,
    title: &str,
    stream: &ResolvedStream,
    merge: bool,
) -> Result<PathBuf, SigtubeError> {
    let extension = stream.format.extension();
    if stream.format.is_muxed() {
        return Ok(dir.join(format!("{}.{}", title, extension)));
    }

    let stem = format!("{}_{}", title, stream.role);
    if merge {
        Ok(unique_path(dir, &stem, extension)?)
    } else {
        Ok(dir.join(format!("{}.{}", stem, extension)))
    }
}

/// Compile the programs once and resolve each format, off the async runtime
async fn decode_formats(
    programs: Arc<TransformPrograms>,
    formats: Vec<Format>,
) -> Result<Vec<String>, SigtubeError> {
    tokio::task::spawn_blocking(move || {
        let mut session = DecodeSession::compile(&programs);
        formats
            .iter()
            .map(|format| {
                session
                    .resolve_download_url(format)
                    .map_err(SigtubeError::from)
            })
            .collect()
    })
    .await
    .map_err(|e| SigtubeError::Generic(format!("decode pass panicked: {}", e)))?
}

/// Regenerates a rejected URL with a fresh decode pass
struct DecodeRefresher {
    registry: TransformRegistry,
    bundles: BundleFetcher,
}

#[async_trait]
impl UrlRefresher for DecodeRefresher {
    async fn refresh_url(&self, format: &Format) -> Result<String, SigtubeError> {
        let programs = self.registry.programs(&self.bundles).await?;
        debug!("regenerating URL for itag {} with player {}", format.itag, programs.version);
        decode_formats(programs, vec![format.clone()])
            .await?
            .pop()
            .ok_or_else(|| CipherError::NoDownloadUrl { itag: format.itag }.into())
    }
}
