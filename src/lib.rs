//! # sigtube
//!
//! Player cipher extraction and chunked stream downloading.
//!
//! ## Features
//!
//! - Signature and `n` transform extraction from the player bundle
//! - Sandboxed evaluation of the extracted transforms (V8 via `deno_core`)
//! - Per-version memoization of extracted programs
//! - Format selection, ranged chunk downloads with retry and URL regeneration
//! - ffmpeg merging of separate video and audio streams
//! - Playlist support
//!
//! ## Example
//!
//! ```rust,no_run
//! use sigtube::{DownloadOptions, Downloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = DownloadOptions {
//!         output_dir: "./downloads".into(),
//!         ..DownloadOptions::default()
//!     };
//!     let downloader = Downloader::new(options)?;
//!
//!     let report = downloader.download("VIDEO_URL").await?;
//!     println!("Downloaded: {}", report.details.title);
//!
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use cipher::{AnchorConfig, BundleText, DecodeSession, TransformKind, TransformRegistry};
pub use config::AppConfig;
pub use core::{
    DownloadOptions, DownloadReport, Downloader, Format, MediaType, Progress, Quality,
    ResolvedVideo, VideoDetails,
};
pub use error::{CipherError, SigtubeError};

/// Result type alias for sigtube operations
pub type Result<T> = std::result::Result<T, SigtubeError>;
