//! Progress tracking for downloads

use std::fmt;
use std::time::{Duration, Instant};

/// Numeric progress value reported for a cancelled download
pub const CANCELLED_SENTINEL: f64 = -1.0;

/// Which stream of a video a download carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Video,
    Audio,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRole::Video => write!(f, "video"),
            StreamRole::Audio => write!(f, "audio"),
        }
    }
}

/// Progress information for a download
#[derive(Debug, Clone)]
pub struct Progress {
    /// Total size of the file in bytes
    pub total_size: u64,
    /// Number of bytes downloaded
    pub downloaded_size: u64,
    /// Download progress as a percentage (0.0 to 100.0), two decimals
    pub percent: f64,
    /// Current download speed in bytes per second
    pub speed: Option<f64>,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// Time when download started
    pub start_time: Instant,
}

impl Progress {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            downloaded_size: 0,
            percent: 0.0,
            speed: None,
            eta: None,
            start_time: Instant::now(),
        }
    }

    /// Update progress with new downloaded size
    pub fn update(&mut self, downloaded_size: u64) {
        self.downloaded_size = downloaded_size;
        self.percent = if self.total_size > 0 {
            let raw = (downloaded_size as f64 / self.total_size as f64) * 100.0;
            (raw.min(100.0) * 100.0).round() / 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        if elapsed.as_millis() > 0 {
            let speed = downloaded_size as f64 / elapsed.as_secs_f64();
            self.speed = Some(speed);
            if speed > 0.0 && self.total_size > downloaded_size {
                let remaining_bytes = self.total_size - downloaded_size;
                self.eta = Some(Duration::from_secs((remaining_bytes as f64 / speed) as u64));
            } else {
                self.eta = None;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.downloaded_size >= self.total_size
    }

    pub fn speed_string(&self) -> String {
        match self.speed {
            Some(speed) => format_bytes_per_second(speed),
            None => "Unknown".to_string(),
        }
    }

    pub fn eta_string(&self) -> String {
        match self.eta {
            Some(eta) => format_eta(eta),
            None => "Unknown".to_string(),
        }
    }
}

/// Event delivered to progress callbacks
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress(Progress),
    Cancelled,
}

impl DownloadEvent {
    /// Percentage, or [`CANCELLED_SENTINEL`] after cancellation
    pub fn percent(&self) -> f64 {
        match self {
            DownloadEvent::Progress(progress) => progress.percent,
            DownloadEvent::Cancelled => CANCELLED_SENTINEL,
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = ((bytes_f64.ln() / THRESHOLD.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

pub fn format_bytes_per_second(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

/// Remaining time as `42s`, `3m 5s` or `1h 2m`
pub fn format_eta(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_update_rounds_to_two_decimals() {
        let mut progress = Progress::new(3);
        progress.update(1);
        assert_eq!(progress.percent, 33.33);
        assert!(!progress.is_complete());

        progress.update(3);
        assert_eq!(progress.percent, 100.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_unknown_total() {
        let mut progress = Progress::new(0);
        progress.update(10);
        assert_eq!(progress.percent, 0.0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_event_percent() {
        let mut progress = Progress::new(200);
        progress.update(50);
        assert_eq!(DownloadEvent::Progress(progress).percent(), 25.0);
        assert_eq!(DownloadEvent::Cancelled.percent(), CANCELLED_SENTINEL);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(42)), "42s");
        assert_eq!(format_eta(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_eta(Duration::from_secs(3720)), "1h 2m");
    }
}
