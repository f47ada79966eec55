//! Command line argument parsing

use crate::core::video_info::{MediaType, Quality};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// sigtube - decode player ciphers and download streams in ranged chunks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video or playlist URL (or a bare video id)
    pub url: String,

    /// Download only the audio stream
    #[arg(long, conflicts_with = "video_only")]
    pub audio_only: bool,

    /// Download only the video stream
    #[arg(long)]
    pub video_only: bool,

    /// Quality: best, bestefficiency or a label such as 720p
    #[arg(long, value_name = "QUALITY", default_value = "best")]
    pub quality: Quality,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON file with anchor overrides
    #[arg(long, value_name = "PATH")]
    pub anchors: Option<PathBuf>,

    /// Chunk size in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Retries per chunk
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Print resolved stream URLs and exit (no download)
    #[arg(short = 'g', long)]
    pub print_url: bool,

    /// Keep separate video and audio files instead of merging
    #[arg(long)]
    pub no_merge: bool,

    /// Max items to process for playlist (0 means all)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    pub fn media_type(&self) -> MediaType {
        if self.audio_only {
            MediaType::Audio
        } else if self.video_only {
            MediaType::Video
        } else {
            MediaType::VideoAudio
        }
    }

    /// Playlist item limit, `None` for all
    pub fn playlist_limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }

    /// Check if this is a playlist operation
    pub fn is_playlist(&self) -> bool {
        crate::utils::url::is_playlist_url(&self.url)
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl VerbosityLevel {
    /// Log filter used when `RUST_LOG` is unset
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Self {
            url: String::new(),
            audio_only: false,
            video_only: false,
            quality: Quality::Best,
            output: None,
            config: None,
            anchors: None,
            chunk_size: None,
            retries: None,
            timeout: humantime::Duration::from(Duration::from_secs(30)),
            print_url: false,
            no_merge: false,
            limit: 0,
            verbose: false,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "sigtube",
            "--audio-only",
            "--quality",
            "720p",
            "--output",
            "/tmp/videos",
            "--chunk-size",
            "1048576",
            "--retries",
            "5",
            "--timeout",
            "1m",
            "--no-merge",
            "https://youtu.be/dQw4w9WgXcQ",
        ])
        .unwrap();

        assert_eq!(args.url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(args.media_type(), MediaType::Audio);
        assert_eq!(args.quality, Quality::Label("720p".to_string()));
        assert_eq!(args.output, Some(PathBuf::from("/tmp/videos")));
        assert_eq!(args.chunk_size, Some(1_048_576));
        assert_eq!(args.retries, Some(5));
        assert_eq!(args.timeout_duration(), Duration::from_secs(60));
        assert!(args.no_merge);
    }

    #[test]
    fn test_audio_and_video_only_conflict() {
        assert!(Args::try_parse_from(["sigtube", "--audio-only", "--video-only", "x"]).is_err());
    }

    #[test]
    fn test_args_verbosity_level() {
        let args = Args::default();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);

        let args = Args {
            quiet: true,
            verbose: true,
            ..Default::default()
        };
        assert_eq!(args.verbosity_level(), VerbosityLevel::Quiet);

        let args = Args {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
        assert_eq!(args.verbosity_level().default_log_filter(), "debug");
    }

    #[test]
    fn test_args_is_playlist() {
        let args = Args {
            url: "https://www.youtube.com/playlist?list=PLxxxx".to_string(),
            ..Default::default()
        };
        assert!(args.is_playlist());

        let args = Args {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            ..Default::default()
        };
        assert!(!args.is_playlist());
    }

    #[test]
    fn test_playlist_limit() {
        assert_eq!(Args::default().playlist_limit(), None);
        let args = Args {
            limit: 10,
            ..Default::default()
        };
        assert_eq!(args.playlist_limit(), Some(10));
    }

    #[test]
    fn test_default_media_type() {
        assert_eq!(Args::default().media_type(), MediaType::VideoAudio);
        let args = Args {
            video_only: true,
            ..Default::default()
        };
        assert_eq!(args.media_type(), MediaType::Video);
    }
}
