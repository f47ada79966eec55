//! InnerTube player API and playlist pages

use crate::cipher::extract_value;
use crate::core::video_info::{Format, VideoDetails};
use crate::error::SigtubeError;
use crate::platform::bundle::DEFAULT_BASE_URL;
use crate::platform::client::HttpClient;
use futures_util::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Client identity used for player requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientProfile {
    pub name: &'static str,
    pub version: &'static str,
    pub user_agent: &'static str,
}

/// iOS app client; its player responses carry direct or ciphered URLs without a web session
pub const IOS_CLIENT: ClientProfile = ClientProfile {
    name: "IOS",
    version: "19.29.1",
    user_agent: "com.google.ios.youtube/19.29.1 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X;)",
};

/// `c` parameter values that get a matching `cver` on stream URLs
const KNOWN_CLIENTS: &[(&str, &str)] = &[
    ("WEB", "2.20241121.01.00"),
    ("MWEB", "2.20241205.01.00"),
    ("WEB_REMIX", "1.20211213.00.00"),
    ("WEB_KIDS", "2.20230111.00.00"),
    ("TVHTML5", "7.20241016.15.00"),
    ("TVHTML5_SIMPLY_EMBEDDED_PLAYER", "2.0"),
    ("WEB_EMBEDDED_PLAYER", "2.20240111.09.00"),
];

/// Version to report for a client name found in a stream URL
pub fn client_version(name: &str) -> Option<&'static str> {
    KNOWN_CLIENTS
        .iter()
        .find(|(client, _)| *client == name)
        .map(|(_, version)| *version)
}

/// InnerTube API client
#[derive(Clone)]
pub struct InnerTubeClient {
    http: HttpClient,
    base_url: String,
    profile: ClientProfile,
}

impl InnerTubeClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            profile: IOS_CLIENT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn profile(&self) -> ClientProfile {
        self.profile
    }

    /// Raw player response, with unplayable videos mapped to errors
    pub async fn get_player_response(&self, video_id: &str) -> Result<PlayerResponse, SigtubeError> {
        info!("Fetching player response for video ID: {}", video_id);

        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": self.profile.name,
                    "clientVersion": self.profile.version,
                    "userAgent": self.profile.user_agent,
                }
            },
            "videoId": video_id,
        });
        let url = format!(
            "{}/youtubei/v1/player?prettyPrint=false&alt=json",
            self.base_url
        );

        let response: PlayerResponse = self
            .http
            .post_json(&url, self.profile.user_agent, &body)
            .await?;
        response.check_playability()?;
        Ok(response)
    }

    /// Details and formats of one video
    pub async fn get_video_details(&self, video_id: &str) -> Result<VideoDetails, SigtubeError> {
        let response = self.get_player_response(video_id).await?;
        let details = response.into_video_details()?;
        debug!(
            "{} has {} formats ({})",
            details.id,
            details.formats.len(),
            details.duration()
        );
        Ok(details)
    }

    /// Video ids listed on a playlist page, in page order
    pub async fn get_playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>, SigtubeError> {
        let url = format!("{}/playlist?list={}", self.base_url, playlist_id);
        let page = self.http.get_text(&url).await?;
        parse_playlist_video_ids(&page)
    }

    /// Details of every playlist video; videos that fail are skipped
    pub async fn get_playlist(
        &self,
        playlist_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VideoDetails>, SigtubeError> {
        let mut ids = self.get_playlist_video_ids(playlist_id).await?;
        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        info!("Playlist {} lists {} videos", playlist_id, ids.len());

        let results = join_all(ids.iter().map(|id| self.get_video_details(id))).await;
        Ok(ids
            .iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(details) => Some(details),
                Err(e) => {
                    warn!("Skipping playlist video {}: {}", id, e);
                    None
                }
            })
            .collect())
    }
}

/// Video ids from the `ytInitialData` blob embedded in a playlist page
pub fn parse_playlist_video_ids(page: &str) -> Result<Vec<String>, SigtubeError> {
    static INITIAL_DATA: OnceLock<Regex> = OnceLock::new();
    let initial_data = INITIAL_DATA
        .get_or_init(|| Regex::new(r"ytInitialData\s*=\s*\{").expect("static regex"));

    let found = initial_data
        .find(page)
        .ok_or_else(|| SigtubeError::Playlist("ytInitialData not found".to_string()))?;
    let json = extract_value(page, found.end() - 1)
        .map_err(|e| SigtubeError::Playlist(format!("malformed ytInitialData: {}", e)))?;
    let data: serde_json::Value = serde_json::from_str(json)?;

    let contents = data
        .pointer(
            "/contents/twoColumnBrowseResultsRenderer/tabs/0/tabRenderer/content\
             /sectionListRenderer/contents/0/itemSectionRenderer/contents/0\
             /playlistVideoListRenderer/contents",
        )
        .and_then(|v| v.as_array())
        .ok_or_else(|| SigtubeError::Playlist("playlist contents not found".to_string()))?;

    Ok(contents
        .iter()
        .filter_map(|item| item.pointer("/playlistVideoRenderer/videoId"))
        .filter_map(|id| id.as_str())
        .map(str::to_string)
        .collect())
}

/// Player response from InnerTube API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub playability_status: Option<PlayabilityStatus>,
    pub video_details: Option<VideoDetailsData>,
    pub streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetailsData {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub length_seconds: String,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub thumbnails: Vec<ThumbnailInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailInfo {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    #[serde(default)]
    pub formats: Vec<FormatData>,
    #[serde(default)]
    pub adaptive_formats: Vec<FormatData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatData {
    pub itag: u32,
    pub url: Option<String>,
    pub mime_type: String,
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality_label: Option<String>,
    pub audio_quality: Option<String>,
    pub content_length: Option<String>,
    #[serde(alias = "cipher")]
    pub signature_cipher: Option<String>,
    pub sabr: Option<String>,
    pub po_token: Option<String>,
}

impl From<FormatData> for Format {
    fn from(data: FormatData) -> Self {
        Format {
            itag: data.itag,
            mime_type: data.mime_type,
            bitrate: data.bitrate.unwrap_or(0),
            width: data.width,
            height: data.height,
            quality_label: data.quality_label,
            audio_quality: data.audio_quality,
            content_length: data.content_length.and_then(|s| s.parse().ok()),
            url: data.url,
            signature_cipher: data.signature_cipher,
            sabr: data.sabr.as_deref() == Some("1"),
            po_token: data.po_token,
        }
    }
}

impl PlayerResponse {
    /// Map non-playable statuses to errors
    pub fn check_playability(&self) -> Result<(), SigtubeError> {
        let Some(status) = &self.playability_status else {
            return Ok(());
        };
        match status.status.as_str() {
            "OK" => Ok(()),
            other => {
                let reason = status
                    .reason
                    .clone()
                    .unwrap_or_else(|| other.to_lowercase().replace('_', " "));
                warn!("Video playability error ({}): {}", other, reason);
                Err(SigtubeError::VideoUnavailable(reason))
            }
        }
    }

    /// Convert into details with muxed formats first, then adaptive ones
    pub fn into_video_details(self) -> Result<VideoDetails, SigtubeError> {
        let data = self.video_details.ok_or_else(|| {
            SigtubeError::VideoUnavailable("player response has no video details".to_string())
        })?;

        let mut details = VideoDetails::new(data.video_id, data.title);
        details.author = data.author;
        details.length_seconds = data.length_seconds.parse().unwrap_or(0);
        details.thumbnail = data
            .thumbnail
            .and_then(|t| t.thumbnails.into_iter().last())
            .map(|t| t.url);

        if let Some(streaming) = self.streaming_data {
            details.formats = streaming
                .formats
                .into_iter()
                .chain(streaming.adaptive_formats)
                .map(Format::from)
                .collect();
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::retry::RetryConfig;
    use crate::platform::client::HttpClientConfig;
    use mockito::Matcher;
    use std::time::Duration;

    const PLAYER_RESPONSE: &str = r#"{
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {
            "videoId": "dQw4w9WgXcQ",
            "title": "Test: Video",
            "author": "Channel",
            "lengthSeconds": "212",
            "thumbnail": {"thumbnails": [
                {"url": "https://i.ytimg.com/small.jpg", "width": 120, "height": 90},
                {"url": "https://i.ytimg.com/large.jpg", "width": 1280, "height": 720}
            ]}
        },
        "streamingData": {
            "formats": [{
                "itag": 18,
                "url": "https://rr1.example.com/videoplayback?itag=18&n=abc",
                "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
                "bitrate": 500000,
                "width": 640,
                "height": 360,
                "qualityLabel": "360p",
                "audioQuality": "AUDIO_QUALITY_LOW",
                "contentLength": "1048576"
            }],
            "adaptiveFormats": [{
                "itag": 137,
                "signatureCipher": "s=ABCD&sp=sig&url=https%3A%2F%2Frr1.example.com%2Fvideoplayback",
                "mimeType": "video/mp4; codecs=\"avc1.640028\"",
                "bitrate": 4000000,
                "width": 1920,
                "height": 1080,
                "qualityLabel": "1080p"
            }, {
                "itag": 140,
                "url": "https://rr1.example.com/videoplayback?itag=140",
                "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"",
                "bitrate": 130000,
                "audioQuality": "AUDIO_QUALITY_MEDIUM",
                "sabr": "1",
                "poToken": "token"
            }]
        }
    }"#;

    fn client(base_url: &str) -> InnerTubeClient {
        let http = HttpClient::with_config(HttpClientConfig {
            retry: RetryConfig::linear(0, Duration::from_millis(1)),
            ..HttpClientConfig::default()
        })
        .unwrap();
        InnerTubeClient::new(http).with_base_url(base_url)
    }

    #[test]
    fn test_client_version_table() {
        assert_eq!(client_version("WEB"), Some("2.20241121.01.00"));
        assert_eq!(client_version("TVHTML5_SIMPLY_EMBEDDED_PLAYER"), Some("2.0"));
        assert_eq!(client_version("IOS"), None);
    }

    #[test]
    fn test_player_response_into_details() {
        let response: PlayerResponse = serde_json::from_str(PLAYER_RESPONSE).unwrap();
        response.check_playability().unwrap();
        let details = response.into_video_details().unwrap();

        assert_eq!(details.id, "dQw4w9WgXcQ");
        assert_eq!(details.duration(), "3:32");
        assert_eq!(details.thumbnail.as_deref(), Some("https://i.ytimg.com/large.jpg"));
        assert_eq!(details.formats.len(), 3);
        assert_eq!(details.size_mib(), Some(1.0));

        let muxed = &details.formats[0];
        assert!(muxed.is_muxed());
        assert_eq!(muxed.content_length, Some(1_048_576));

        let ciphered = &details.formats[1];
        assert!(ciphered.url.is_none());
        assert!(ciphered.signature_cipher.as_deref().unwrap().starts_with("s=ABCD"));

        let audio = &details.formats[2];
        assert!(audio.is_audio_only());
        assert!(audio.sabr);
        assert_eq!(audio.po_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_unplayable_video() {
        let response: PlayerResponse = serde_json::from_str(
            r#"{"playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}}"#,
        )
        .unwrap();
        let err = response.check_playability().unwrap_err();
        assert!(matches!(err, SigtubeError::VideoUnavailable(reason) if reason.contains("age")));

        let response: PlayerResponse =
            serde_json::from_str(r#"{"playabilityStatus": {"status": "OK"}}"#).unwrap();
        assert!(matches!(
            response.into_video_details(),
            Err(SigtubeError::VideoUnavailable(_))
        ));
    }

    #[test]
    fn test_parse_playlist_video_ids() {
        let page = r#"<script>var ytInitialData = {"contents":{"twoColumnBrowseResultsRenderer":{"tabs":[{"tabRenderer":{"content":{"sectionListRenderer":{"contents":[{"itemSectionRenderer":{"contents":[{"playlistVideoListRenderer":{"contents":[
            {"playlistVideoRenderer":{"videoId":"aaaaaaaaaaa","title":{"runs":[{"text":"a {brace"}]}}},
            {"playlistVideoRenderer":{"videoId":"bbbbbbbbbbb"}},
            {"continuationItemRenderer":{}}
        ]}}]}}]}}}}]}}};</script><script>var other = {};</script>"#;

        assert_eq!(
            parse_playlist_video_ids(page).unwrap(),
            vec!["aaaaaaaaaaa", "bbbbbbbbbbb"]
        );
        assert!(matches!(
            parse_playlist_video_ids("<html></html>"),
            Err(SigtubeError::Playlist(_))
        ));
    }

    #[tokio::test]
    async fn test_get_video_details() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex("^/youtubei/v1/player".to_string()))
            .match_header("user-agent", IOS_CLIENT.user_agent)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "context": {"client": {"clientName": "IOS", "clientVersion": "19.29.1"}},
                "videoId": "dQw4w9WgXcQ"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PLAYER_RESPONSE)
            .create_async()
            .await;

        let details = client(&server.url())
            .get_video_details("dQw4w9WgXcQ")
            .await
            .unwrap();
        assert_eq!(details.title, "Test: Video");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_playlist_skips_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/playlist".to_string()))
            .with_status(200)
            .with_body(
                r#"ytInitialData = {"contents":{"twoColumnBrowseResultsRenderer":{"tabs":[{"tabRenderer":{"content":{"sectionListRenderer":{"contents":[{"itemSectionRenderer":{"contents":[{"playlistVideoListRenderer":{"contents":[{"playlistVideoRenderer":{"videoId":"dQw4w9WgXcQ"}},{"playlistVideoRenderer":{"videoId":"brokenbroke"}}]}}]}}]}}}}]}}};"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex("^/youtubei/v1/player".to_string()))
            .match_body(Matcher::PartialJson(serde_json::json!({"videoId": "dQw4w9WgXcQ"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PLAYER_RESPONSE)
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex("^/youtubei/v1/player".to_string()))
            .match_body(Matcher::PartialJson(serde_json::json!({"videoId": "brokenbroke"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"playabilityStatus": {"status": "ERROR", "reason": "Video unavailable"}}"#)
            .create_async()
            .await;

        let videos = client(&server.url())
            .get_playlist("PLtest", None)
            .await
            .unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "dQw4w9WgXcQ");
    }
}
