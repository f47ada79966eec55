//! Player bundle retrieval

use crate::cipher::BundleText;
use crate::error::SigtubeError;
use crate::platform::client::HttpClient;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Default host for the embed page and player bundles
pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Player version from the embed bootstrap script, where it appears as `player\/<hex8>\/`
pub fn extract_version(iframe_api: &str) -> Option<String> {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let version =
        VERSION.get_or_init(|| Regex::new(r"player\\/([0-9a-fA-F]{8})\\/").expect("static regex"));

    version
        .captures(iframe_api)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fetches the current player version and its bundle source
#[derive(Clone)]
pub struct BundleFetcher {
    http: HttpClient,
    base_url: String,
}

impl BundleFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the fetcher at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bundle_url(&self, version: &str) -> String {
        format!(
            "{}/s/player/{}/player_ias.vflset/en_US/base.js",
            self.base_url, version
        )
    }

    /// Current player version tag
    pub async fn fetch_version(&self) -> Result<String, SigtubeError> {
        let iframe_api = self
            .http
            .get_text(&format!("{}/iframe_api", self.base_url))
            .await?;
        let version = extract_version(&iframe_api).ok_or(SigtubeError::BundleVersionNotFound)?;
        debug!("current player version is {}", version);
        Ok(version)
    }

    /// Bundle source for a version, whitespace-normalized off the async runtime
    pub async fn fetch_source(&self, version: &str) -> Result<BundleText, SigtubeError> {
        let url = self.bundle_url(version);
        info!("Fetching player bundle {}", version);
        let raw = self.http.get_text(&url).await?;
        debug!("bundle {} is {} bytes", version, raw.len());

        let version = version.to_string();
        tokio::task::spawn_blocking(move || BundleText::new(version, &raw))
            .await
            .map_err(|e| SigtubeError::Generic(format!("bundle normalization panicked: {}", e)))
    }

    /// Version and source of the current bundle
    pub async fn fetch_bundle(&self) -> Result<BundleText, SigtubeError> {
        let version = self.fetch_version().await?;
        self.fetch_source(&version).await
    }
}
