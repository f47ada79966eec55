//! HTTP client for platform pages, the player API and media streams

use crate::download::retry::{RetryConfig, RetryExecutor};
use crate::error::SigtubeError;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Origin and referer sent with media requests
pub const PLATFORM_ORIGIN: &str = "https://www.youtube.com";

/// Desktop browser user agent used for pages and media
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent for page requests
    pub user_agent: String,
    /// Proxy URL
    pub proxy_url: Option<String>,
    /// Retry policy for page and API requests
    pub retry: RetryConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: BROWSER_USER_AGENT.to_string(),
            proxy_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Shared HTTP client
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self, SigtubeError> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, SigtubeError> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .user_agent(&config.user_agent);

        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET with browser page headers
    pub fn create_page_request(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("Accept", "*/*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
    }

    /// JSON POST to the player API, identifying as the given client
    pub fn create_api_request(&self, url: &str, user_agent: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header("User-Agent", user_agent)
            .header("Accept", "*/*")
            .header("Content-Type", "application/json")
    }

    /// Media request for one byte range (inclusive bounds)
    pub fn create_media_request(&self, url: &str, range: Option<(u64, u64)>) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "*/*")
            .header("Origin", PLATFORM_ORIGIN)
            .header("Referer", PLATFORM_ORIGIN)
            .header("Connection", "keep-alive")
            .header("DNT", "1")
            .header("User-Agent", BROWSER_USER_AGENT);

        match range {
            Some((start, end)) => request.header("Range", format!("bytes={}-{}", start, end)),
            None => request,
        }
    }

    /// GET a page body, retrying transient failures
    pub async fn get_text(&self, url: &str) -> Result<String, SigtubeError> {
        let executor = RetryExecutor::with_config(self.config.retry.clone());
        let this = self.clone();
        let url = url.to_string();

        executor
            .execute(move || {
                let request = this.create_page_request(&url);
                Box::pin(async move {
                    let response = ensure_success(request.send().await?)?;
                    Ok(response.text().await?)
                })
            })
            .await
    }

    /// POST a JSON body and decode the JSON reply, retrying transient failures
    pub async fn post_json<T>(
        &self,
        url: &str,
        user_agent: &str,
        body: &serde_json::Value,
    ) -> Result<T, SigtubeError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let executor = RetryExecutor::with_config(self.config.retry.clone());
        let this = self.clone();
        let url = url.to_string();
        let user_agent = user_agent.to_string();
        let body = body.clone();

        executor
            .execute(move || {
                let request = this.create_api_request(&url, &user_agent).json(&body);
                Box::pin(async move {
                    let response = ensure_success(request.send().await?)?;
                    Ok(response.json::<T>().await?)
                })
            })
            .await
    }
}

/// Turn a non-success status into [`SigtubeError::HttpStatus`]
pub fn ensure_success(response: Response) -> Result<Response, SigtubeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!("{} returned {}", response.url(), status);
    Err(SigtubeError::HttpStatus {
        status: status.as_u16(),
        url: response.url().to_string(),
    })
}
