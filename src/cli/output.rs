//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::downloader::{DownloadReport, ResolvedVideo};
use crate::core::progress::{format_bytes, format_eta, DownloadEvent, Progress, StreamRole};
use crate::core::video_info::VideoDetails;
use crate::download::DownloadOutcome;
use crate::utils::{codecs, mime_essence};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix:>5} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// Output formatter for sigtube
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    multi: MultiProgress,
    bars: Mutex<HashMap<StreamRole, ProgressBar>>,
}

impl OutputFormatter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    /// Route a downloader event to the bar of its stream
    pub fn handle_event(&self, role: StreamRole, event: &DownloadEvent) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match event {
            DownloadEvent::Progress(progress) => {
                // a finished bar belongs to the previous video of a playlist
                if bars.get(&role).is_some_and(ProgressBar::is_finished) {
                    bars.remove(&role);
                }
                let bar = bars.entry(role).or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new(progress.total_size));
                    bar.set_style(Self::bar_style());
                    bar.set_prefix(role.to_string());
                    bar
                });
                update_bar(bar, progress);
            }
            DownloadEvent::Cancelled => {
                if let Some(bar) = bars.get(&role) {
                    bar.abandon_with_message("cancelled");
                }
            }
        }
    }

    /// Drop the bars of the previous video
    pub fn reset_progress(&self) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, bar) in bars.drain() {
                if !bar.is_finished() {
                    bar.abandon();
                }
            }
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("✅ {}", message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("⚠️  {}", message);
        }
    }

    /// Print video information
    pub fn print_video_info(&self, details: &VideoDetails) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("📹 {}", details.title);
        if !details.author.is_empty() {
            println!("👤 {}", details.author);
        }
        println!("⏱️  {}", details.duration());
        match details.size_mib() {
            Some(size) => println!("📊 {} formats available, {:.2} MiB", details.formats.len(), size),
            None => println!("📊 {} formats available", details.formats.len()),
        }
        if self.verbosity == VerbosityLevel::Verbose {
            println!("🎚️  {}", details.quality_labels().join(", "));
            if let Some(thumbnail) = &details.thumbnail {
                println!("🖼️  {}", thumbnail);
            }
        }
        println!();
    }

    /// Resolved stream URLs, one per line; printed even in quiet mode
    pub fn print_resolved(&self, resolved: &ResolvedVideo) {
        for stream in &resolved.streams {
            if self.verbosity == VerbosityLevel::Verbose {
                eprintln!(
                    "{} itag={} {} [{}]",
                    stream.role,
                    stream.format.itag,
                    mime_essence(&stream.format.mime_type),
                    codecs(&stream.format.mime_type).join(", ")
                );
            }
            println!("{}", stream.url);
        }
    }

    /// Print download complete message
    pub fn print_download_complete(&self, report: &DownloadReport, duration: Duration) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!();
        for outcome in &report.outputs {
            match outcome {
                DownloadOutcome::Completed { path, bytes } => {
                    println!("💾 Saved to: {} ({})", path.display(), format_bytes(*bytes));
                }
                DownloadOutcome::AlreadyExists(path) => {
                    println!("⏭️  Already downloaded: {}", path.display());
                }
            }
        }
        println!("⏱️  Time: {}", format_eta(duration));
    }

    /// Print playlist information
    pub fn print_playlist_info(&self, playlist_id: &str, limit: Option<usize>) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        match limit {
            Some(limit) => println!("📋 Playlist: {} (limited to {})", playlist_id, limit),
            None => println!("📋 Playlist: {}", playlist_id),
        }
        println!();
    }

    /// Print playlist item progress
    pub fn print_playlist_item(&self, index: usize, total: usize, title: &str) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("📥 [{}/{}] {}", index + 1, total, title);
    }
}

fn update_bar(bar: &ProgressBar, progress: &Progress) {
    if progress.total_size > 0 {
        bar.set_length(progress.total_size);
    }
    bar.set_position(progress.downloaded_size);
    bar.set_message(format!(
        "{:.2}% {} eta {}",
        progress.percent,
        progress.speed_string(),
        progress.eta_string()
    ));
    if progress.is_complete() {
        bar.finish_with_message("done");
    }
}

/// Create a progress callback for the downloader
pub fn create_progress_callback(
    formatter: Arc<OutputFormatter>,
) -> impl Fn(StreamRole, DownloadEvent) + Send + Sync + 'static {
    move |role, event| formatter.handle_event(role, &event)
}
