//! Chunked downloader implementation

use crate::core::progress::{DownloadEvent, Progress};
use crate::core::video_info::Format;
use crate::download::retry::RetryConfig;
use crate::error::SigtubeError;
use crate::platform::client::HttpClient;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default chunk size (10 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Progress callback shared across downloads
pub type ProgressCallback = Arc<dyn Fn(DownloadEvent) + Send + Sync>;

/// Chunked downloader configuration
#[derive(Clone)]
pub struct DownloaderConfig {
    /// Chunk size in bytes
    pub chunk_size: u64,
    /// Per-chunk retry policy
    pub retry: RetryConfig,
    /// Progress callback
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryConfig::linear(3, Duration::from_millis(2000)),
            progress_callback: None,
        }
    }
}

/// Source of fresh stream URLs once a server rejects the current one
#[async_trait]
pub trait UrlRefresher: Send + Sync {
    async fn refresh_url(&self, format: &Format) -> Result<String, SigtubeError>;
}

/// Result of a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { path: PathBuf, bytes: u64 },
    /// The target already existed; nothing was fetched
    AlreadyExists(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::Completed { path, .. } => path,
            DownloadOutcome::AlreadyExists(path) => path,
        }
    }
}

/// One stream to fetch
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub format: Format,
    /// Resolved stream URL
    pub url: String,
    pub output: PathBuf,
}

/// Chunked downloader
pub struct ChunkedDownloader {
    http: HttpClient,
    config: DownloaderConfig,
}

impl ChunkedDownloader {
    pub fn new(http: HttpClient) -> Self {
        Self::with_config(http, DownloaderConfig::default())
    }

    pub fn with_config(http: HttpClient, config: DownloaderConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DownloadEvent) + Send + Sync + 'static,
    {
        self.config.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.config.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    fn report(&self, event: DownloadEvent) {
        if let Some(callback) = &self.config.progress_callback {
            callback(event);
        }
    }

    /// Download a stream in ranged chunks.
    ///
    /// Data goes to `<output>.part` and is renamed into place on success.
    /// On failure or cancellation the partial file is removed.
    pub async fn download(
        &self,
        task: DownloadTask,
        refresher: Option<&dyn UrlRefresher>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, SigtubeError> {
        if tokio::fs::try_exists(&task.output).await? {
            info!("{} already exists, skipping", task.output.display());
            return Ok(DownloadOutcome::AlreadyExists(task.output));
        }

        let part_path = part_path(&task.output);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SigtubeError::Cancelled),
            result = self.download_to(&task, &part_path, refresher, cancel) => result,
        };

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part_path, &task.output).await?;
                info!("Downloaded {} ({} bytes)", task.output.display(), bytes);
                Ok(DownloadOutcome::Completed {
                    path: task.output,
                    bytes,
                })
            }
            Err(e) => {
                if matches!(e, SigtubeError::Cancelled) {
                    self.report(DownloadEvent::Cancelled);
                }
                warn!("Download of itag {} failed: {}, removing partial file", task.format.itag, e);
                if let Err(remove_error) = tokio::fs::remove_file(&part_path).await {
                    if remove_error.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {}: {}", part_path.display(), remove_error);
                    }
                }
                Err(e)
            }
        }
    }

    async fn download_to(
        &self,
        task: &DownloadTask,
        part_path: &Path,
        refresher: Option<&dyn UrlRefresher>,
        cancel: &CancellationToken,
    ) -> Result<u64, SigtubeError> {
        let mut url = task.url.clone();
        let total_size = match task.format.content_length {
            Some(size) if size > 0 => size,
            _ => self.get_content_length(&url).await.unwrap_or_else(|e| {
                warn!("Could not determine content length: {}", e);
                0
            }),
        };

        let mut file = File::create(part_path).await?;
        let mut downloaded = 0u64;
        let mut progress = Progress::new(total_size);

        while total_size == 0 || downloaded < total_size {
            if cancel.is_cancelled() {
                return Err(SigtubeError::Cancelled);
            }

            let start = downloaded;
            let mut end = start + self.config.chunk_size - 1;
            if total_size > 0 {
                end = end.min(total_size - 1);
            }

            let chunk = match self
                .download_chunk_with_retry(&mut url, &task.format, start, end, refresher)
                .await
            {
                Ok(chunk) => chunk,
                // unknown size and the previous chunk ended exactly at EOF
                Err(SigtubeError::HttpStatus { status: 416, .. })
                    if total_size == 0 && downloaded > 0 =>
                {
                    debug!("range {}-{} past end of stream, done", start, end);
                    break;
                }
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                if total_size == 0 && downloaded > 0 {
                    break;
                }
                return Err(SigtubeError::Generic(format!(
                    "Empty response for bytes {}-{}",
                    start, end
                )));
            }

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress.update(downloaded);
            self.report(DownloadEvent::Progress(progress.clone()));

            if total_size == 0 && (chunk.len() as u64) < self.config.chunk_size {
                break;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(downloaded)
    }

    /// Total size from a one-byte probe
    async fn get_content_length(&self, url: &str) -> Result<u64, SigtubeError> {
        let response = self.http.create_media_request(url, Some((0, 0))).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SigtubeError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(parse_content_length(response.headers()))
    }

    async fn download_chunk_with_retry(
        &self,
        url: &mut String,
        format: &Format,
        start: u64,
        end: u64,
        refresher: Option<&dyn UrlRefresher>,
    ) -> Result<Vec<u8>, SigtubeError> {
        let mut attempt = 0;
        loop {
            let error = match self.download_chunk(url, start, end).await {
                Ok(data) => return Ok(data),
                Err(e) => e,
            };

            let expired = matches!(error, SigtubeError::UrlExpired);
            if !(expired || error.is_retryable()) || attempt >= self.config.retry.max_retries {
                return Err(error);
            }
            if expired {
                let Some(refresher) = refresher else {
                    return Err(error);
                };
                warn!("403 for itag {}, regenerating URL", format.itag);
                *url = refresher.refresh_url(format).await?;
            }

            let delay = self.config.retry.delay_for(attempt);
            warn!(
                "Chunk {}-{} attempt {} failed: {}, retrying in {:?}",
                start,
                end,
                attempt + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download_chunk(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>, SigtubeError> {
        let response = self
            .http
            .create_media_request(url, Some((start, end)))
            .send()
            .await?;

        let status = response.status();
        debug!("status {} for bytes {}-{}", status, start, end);
        if status.as_u16() == 403 {
            return Err(SigtubeError::UrlExpired);
        }
        if !status.is_success() {
            return Err(SigtubeError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// `<output>.part`
pub fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Total size from `Content-Range: bytes 0-0/<total>`, else `Content-Length`, else 0
pub fn parse_content_length(headers: &reqwest::header::HeaderMap) -> u64 {
    let from_range = headers
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok());
    if let Some(total) = from_range {
        return total;
    }

    headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::client::HttpClientConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const BODY: &[u8] = b"0123456789abcde";

    fn downloader() -> ChunkedDownloader {
        let http = HttpClient::with_config(HttpClientConfig {
            retry: RetryConfig::linear(0, Duration::from_millis(1)),
            ..HttpClientConfig::default()
        })
        .unwrap();
        ChunkedDownloader::new(http)
            .with_chunk_size(10)
            .with_retry(RetryConfig::linear(2, Duration::from_millis(1)))
    }

    fn task(url: String, output: PathBuf, size: Option<u64>) -> DownloadTask {
        DownloadTask {
            format: Format {
                content_length: size,
                ..Format::new(18, "video/mp4")
            },
            url,
            output,
        }
    }

    async fn mock_chunks(server: &mut mockito::ServerGuard, path: &str) -> Vec<mockito::Mock> {
        vec![
            server
                .mock("GET", path)
                .match_header("range", "bytes=0-9")
                .with_status(206)
                .with_body(&BODY[..10])
                .create_async()
                .await,
            server
                .mock("GET", path)
                .match_header("range", "bytes=10-14")
                .with_status(206)
                .with_body(&BODY[10..])
                .create_async()
                .await,
        ]
    }

    #[test]
    fn test_parse_content_length() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("content-range", "bytes 0-0/12345".parse().unwrap());
        headers.insert("content-length", "1".parse().unwrap());
        assert_eq!(parse_content_length(&headers), 12345);

        headers.remove("content-range");
        assert_eq!(parse_content_length(&headers), 1);
        assert_eq!(parse_content_length(&reqwest::header::HeaderMap::new()), 0);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/clip_video.mp4")),
            PathBuf::from("/tmp/clip_video.mp4.part")
        );
    }

    #[tokio::test]
    async fn test_chunked_download() {
        let mut server = mockito::Server::new_async().await;
        let mocks = mock_chunks(&mut server, "/video").await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let downloader = downloader().with_progress_callback(move |event| {
            sink.lock().unwrap().push(event.percent());
        });

        let outcome = downloader
            .download(
                task(format!("{}/video", server.url()), output.clone(), Some(15)),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Completed {
                path: output.clone(),
                bytes: 15
            }
        );
        assert_eq!(std::fs::read(&output).unwrap(), BODY);
        assert!(!part_path(&output).exists());
        assert_eq!(*events.lock().unwrap(), vec![66.67, 100.0]);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_unknown_size_is_probed() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("GET", "/video")
            .match_header("range", "bytes=0-0")
            .with_status(206)
            .with_header("content-range", "bytes 0-0/15")
            .with_body(&BODY[..1])
            .create_async()
            .await;
        let _chunks = mock_chunks(&mut server, "/video").await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        downloader()
            .download(
                task(format!("{}/video", server.url()), output.clone(), None),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), BODY);
        probe.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_size_exact_multiple_ends_on_416() {
        let mut server = mockito::Server::new_async().await;
        let _probe = server
            .mock("GET", "/video")
            .match_header("range", "bytes=0-0")
            .with_status(500)
            .create_async()
            .await;
        let _first = server
            .mock("GET", "/video")
            .match_header("range", "bytes=0-3")
            .with_status(206)
            .with_body("AAAA")
            .create_async()
            .await;
        let past_end = server
            .mock("GET", "/video")
            .match_header("range", "bytes=4-7")
            .with_status(416)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let outcome = downloader()
            .with_chunk_size(4)
            .download(
                task(format!("{}/video", server.url()), output.clone(), None),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Completed {
                path: output.clone(),
                bytes: 4
            }
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"AAAA");
        assert!(!part_path(&output).exists());
        past_end.assert_async().await;
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        std::fs::write(&output, b"done").unwrap();

        let outcome = downloader()
            .download(
                task(format!("{}/video", server.url()), output.clone(), Some(15)),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::AlreadyExists(output.clone()));
        assert_eq!(std::fs::read(&output).unwrap(), b"done");
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries_and_clean_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/video")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let err = downloader()
            .download(
                task(format!("{}/video", server.url()), output.clone(), Some(15)),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SigtubeError::HttpStatus { status: 503, .. }));
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/video")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let err = downloader()
            .download(
                task(format!("{}/video", server.url()), output.clone(), Some(15)),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SigtubeError::HttpStatus { status: 404, .. }));
        mock.assert_async().await;
    }

    struct FixedRefresher {
        url: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl UrlRefresher for FixedRefresher {
        async fn refresh_url(&self, _format: &Format) -> Result<String, SigtubeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.url.clone())
        }
    }

    #[tokio::test]
    async fn test_forbidden_regenerates_url() {
        let mut server = mockito::Server::new_async().await;
        let expired = server
            .mock("GET", "/expired")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let _chunks = mock_chunks(&mut server, "/fresh").await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        let refresher = FixedRefresher {
            url: format!("{}/fresh", server.url()),
            calls: AtomicU32::new(0),
        };

        downloader()
            .download(
                task(format!("{}/expired", server.url()), output.clone(), Some(15)),
                Some(&refresher),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&output).unwrap(), BODY);
        expired.assert_async().await;
    }

    #[tokio::test]
    async fn test_forbidden_without_refresher_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/expired")
            .with_status(403)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let err = downloader()
            .download(
                task(
                    format!("{}/expired", server.url()),
                    dir.path().join("clip.mp4"),
                    Some(15),
                ),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SigtubeError::UrlExpired));
    }

    #[tokio::test]
    async fn test_cancelled_download_reports_sentinel() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let downloader = downloader().with_progress_callback(move |event| {
            sink.lock().unwrap().push(event.percent());
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = downloader
            .download(
                task(format!("{}/video", server.url()), output.clone(), Some(15)),
                None,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SigtubeError::Cancelled));
        assert_eq!(*events.lock().unwrap(), vec![-1.0]);
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }
}
