//! Video information structures and format selection

use crate::utils::ext_from_mime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Video information and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDetails {
    /// Video ID
    pub id: String,
    /// Video title
    pub title: String,
    /// Channel name
    pub author: String,
    /// Duration in seconds
    pub length_seconds: u64,
    /// Largest thumbnail URL
    pub thumbnail: Option<String>,
    /// Muxed and adaptive formats, muxed first
    pub formats: Vec<Format>,
}

impl VideoDetails {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            length_seconds: 0,
            thumbnail: None,
            formats: Vec::new(),
        }
    }

    /// Duration as `h:mm:ss`, or `m:ss` under an hour
    pub fn duration(&self) -> String {
        format_duration(self.length_seconds)
    }

    /// Size in MiB of the largest muxed format, when known
    pub fn size_mib(&self) -> Option<f64> {
        self.formats
            .iter()
            .filter(|f| f.is_muxed())
            .filter_map(|f| f.content_length)
            .max()
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0))
    }

    /// Video-only formats, best first
    pub fn quality_labels(&self) -> Vec<String> {
        let mut labelled: Vec<&Format> = self.formats.iter().filter(|f| f.is_video_only()).collect();
        labelled.sort_by(|a, b| b.width.unwrap_or(0).cmp(&a.width.unwrap_or(0)));
        let mut labels: Vec<String> = Vec::new();
        for format in labelled {
            if let Some(label) = &format.quality_label {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }
}

/// Render seconds as `h:mm:ss` or `m:ss`
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// One stream format of a video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Format ID (itag)
    pub itag: u32,
    /// MIME type including codecs parameter
    pub mime_type: String,
    /// Bitrate in bits per second
    pub bitrate: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Quality label (e.g. "720p"); absent on audio-only formats
    pub quality_label: Option<String>,
    /// Audio quality (e.g. "AUDIO_QUALITY_MEDIUM"); absent on video-only formats
    pub audio_quality: Option<String>,
    /// Size in bytes, when the catalog reports it
    pub content_length: Option<u64>,
    /// Direct download URL
    pub url: Option<String>,
    /// Encoded cipher blob, when the URL needs deciphering
    pub signature_cipher: Option<String>,
    /// Server ABR stream
    pub sabr: bool,
    /// Proof-of-origin token to forward as `pot`
    pub po_token: Option<String>,
}

impl Format {
    pub fn new(itag: u32, mime_type: impl Into<String>) -> Self {
        Self {
            itag,
            mime_type: mime_type.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_signature_cipher(mut self, cipher: impl Into<String>) -> Self {
        self.signature_cipher = Some(cipher.into());
        self
    }

    /// Video and audio in one stream
    pub fn is_muxed(&self) -> bool {
        self.quality_label.is_some() && self.audio_quality.is_some()
    }

    pub fn is_video_only(&self) -> bool {
        self.quality_label.is_some() && self.audio_quality.is_none()
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_quality.is_some() && self.quality_label.is_none()
    }

    /// File extension derived from the MIME type
    pub fn extension(&self) -> &'static str {
        ext_from_mime(&self.mime_type)
    }
}

/// Which streams a download needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    #[default]
    VideoAudio,
    Video,
    Audio,
}

impl MediaType {
    pub fn requires_audio(&self) -> bool {
        matches!(self, MediaType::VideoAudio | MediaType::Audio)
    }
}

/// Requested quality
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Quality {
    /// Widest video, highest bitrate audio
    #[default]
    Best,
    /// Widest video, lowest bitrate audio and muxed streams
    BestEfficiency,
    /// A specific quality label such as `720p`
    Label(String),
}

impl Quality {
    fn prefers_low_bitrate(&self) -> bool {
        !matches!(self, Quality::Best)
    }
}

impl FromStr for Quality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "" | "best" => Quality::Best,
            "bestefficiency" => Quality::BestEfficiency,
            _ => Quality::Label(s.trim().to_string()),
        })
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "best"),
            Quality::BestEfficiency => write!(f, "bestefficiency"),
            Quality::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Formats selected for a download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatChoice {
    /// Video-only or muxed format
    pub video: Option<Format>,
    /// Audio-only format, when the video choice lacks audio
    pub audio: Option<Format>,
}

impl FormatChoice {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    /// Both streams present and need merging
    pub fn needs_merge(&self) -> bool {
        self.video.is_some() && self.audio.is_some()
    }
}

fn pick_by_bitrate<'a>(
    formats: impl Iterator<Item = &'a Format>,
    lowest: bool,
) -> Option<&'a Format> {
    formats.fold(None, |best: Option<&Format>, current| match best {
        None => Some(current),
        Some(best) if lowest && current.bitrate < best.bitrate => Some(current),
        Some(best) if !lowest && current.bitrate > best.bitrate => Some(current),
        keep => keep,
    })
}

/// Select the formats to download.
///
/// A muxed format matching the chosen video label wins over separate
/// streams. Ties keep the earlier format.
pub fn choose_formats(formats: &[Format], media: MediaType, quality: &Quality) -> FormatChoice {
    let lowest = quality.prefers_low_bitrate();

    if media == MediaType::Audio {
        return FormatChoice {
            video: None,
            audio: pick_by_bitrate(formats.iter().filter(|f| f.is_audio_only()), lowest).cloned(),
        };
    }

    let video_formats: Vec<&Format> = formats.iter().filter(|f| f.is_video_only()).collect();
    let chosen_video = match quality {
        Quality::Best | Quality::BestEfficiency => {
            video_formats.iter().copied().fold(None, |best: Option<&Format>, current| {
                match best {
                    Some(best) if current.width.unwrap_or(0) <= best.width.unwrap_or(0) => Some(best),
                    _ => Some(current),
                }
            })
        }
        Quality::Label(label) => video_formats
            .iter()
            .copied()
            .find(|f| f.quality_label.as_deref() == Some(label.as_str()))
            .or_else(|| video_formats.first().copied()),
    };

    if let Some(video) = chosen_video {
        let combined = pick_by_bitrate(
            formats
                .iter()
                .filter(|f| f.audio_quality.is_some() && f.quality_label == video.quality_label),
            lowest,
        );
        if let Some(combined) = combined {
            return FormatChoice {
                video: Some(combined.clone()),
                audio: None,
            };
        }
    }

    let audio = if media.requires_audio() {
        pick_by_bitrate(formats.iter().filter(|f| f.is_audio_only()), lowest).cloned()
    } else {
        None
    };

    FormatChoice {
        video: chosen_video.cloned(),
        audio,
    }
}
