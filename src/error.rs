//! Error types for sigtube

use crate::cipher::TransformKind;
use thiserror::Error;

/// Failures of the cipher extraction and evaluation pipeline.
///
/// Every variant carries enough context to diagnose bundle drift from logs
/// alone: which anchors were tried, where a match landed, which dependency
/// could not be found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("no {kind} anchor matched (tried: {anchors_tried:?})")]
    AnchorNotFound {
        kind: TransformKind,
        anchors_tried: Vec<String>,
    },

    #[error("{kind} anchor {anchor:?} matched at offset {offset} but no function boundary precedes it")]
    FunctionBoundaryNotFound {
        kind: TransformKind,
        anchor: String,
        offset: usize,
    },

    #[error("unterminated block starting at offset {offset}")]
    UnterminatedBlock { offset: usize },

    #[error("dependency {name:?} referenced but no definition found")]
    DependencyNotFound { name: String },

    #[error("transform compilation failed: {0}")]
    CompilationFailed(String),

    #[error("transform invocation failed: {0}")]
    InvocationFailed(String),

    #[error("signature cipher is missing {missing}")]
    MissingCipherComponents { missing: String },

    #[error("no download URL could be resolved for itag {itag}")]
    NoDownloadUrl { itag: u32 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Main error type for sigtube operations
#[derive(Debug, Error)]
pub enum SigtubeError {
    #[error("Video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No suitable format found")]
    NoFormatFound,

    #[error("Player version not found on embed page")]
    BundleVersionNotFound,

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Download URL expired or forbidden")]
    UrlExpired,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("ffmpeg exited with {code:?}")]
    MuxFailed { code: Option<i32> },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Playlist error: {0}")]
    Playlist(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl SigtubeError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SigtubeError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().map_or(true, |s| s.is_server_error())
            }
            SigtubeError::HttpStatus { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// True when the signature step failed, which makes the format undownloadable.
    pub fn is_cipher_error(&self) -> bool {
        matches!(self, SigtubeError::Cipher(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = SigtubeError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string(),
        };
        assert!(err.is_retryable());

        let err = SigtubeError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancel_and_expiry_not_retryable() {
        assert!(!SigtubeError::Cancelled.is_retryable());
        assert!(!SigtubeError::UrlExpired.is_retryable());
    }

    #[test]
    fn test_cipher_error_context_in_message() {
        let err = CipherError::FunctionBoundaryNotFound {
            kind: TransformKind::NParameter,
            anchor: "1969".to_string(),
            offset: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("1969"));
        assert!(msg.contains("42"));

        let wrapped: SigtubeError = CipherError::DependencyNotFound {
            name: "Xy".to_string(),
        }
        .into();
        assert!(wrapped.is_cipher_error());
        assert!(wrapped.to_string().contains("Xy"));
    }
}
