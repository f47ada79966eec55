//! Main entry point for the sigtube CLI

use anyhow::Context;
use clap::Parser;
use sigtube::cli::output::{create_progress_callback, OutputFormatter};
use sigtube::cli::Args;
use sigtube::config::AppConfig;
use sigtube::core::{DownloadOptions, Downloader};
use sigtube::download::FfmpegMuxer;
use sigtube::platform::{HttpClient, HttpClientConfig};
use sigtube::utils::extract_playlist_id;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    init_logging(args.verbosity_level().default_log_filter());
    debug!("Starting sigtube with args: {:?}", args);

    let formatter = Arc::new(OutputFormatter::new(args.verbosity_level()));

    let config = match args.config.clone().or_else(AppConfig::default_path) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    let anchors = config
        .resolve_anchors(args.anchors.as_deref())
        .context("loading anchors")?;
    if let Some(path) = &args.anchors {
        formatter.info(&format!("Using anchors from {}", path.display()));
    }

    let http = HttpClient::with_config(HttpClientConfig {
        timeout: args.timeout_duration(),
        ..HttpClientConfig::default()
    })?;

    let options = DownloadOptions {
        media: args.media_type(),
        quality: args.quality.clone(),
        output_dir: args.output.clone().unwrap_or_else(|| config.download_path.clone()),
        merge: !args.no_merge,
        chunk_size: args.chunk_size.unwrap_or(config.chunk_size),
        max_retries: args.retries.unwrap_or(config.max_retries),
        ..DownloadOptions::default()
    };

    let cancel = CancellationToken::new();
    let mut downloader = Downloader::with_http(http, options)
        .with_anchors(anchors)
        .with_cancellation(cancel.clone())
        .with_muxer(Arc::new(FfmpegMuxer::new(config.ffmpeg_path.clone())));
    if !args.print_url {
        downloader = downloader.with_progress(create_progress_callback(formatter.clone()));
    }

    let interrupt_formatter = formatter.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt_formatter.warning("Interrupted, cleaning up partial files");
            cancel.cancel();
        }
    });

    if args.is_playlist() {
        handle_playlist(&downloader, &args, &formatter).await
    } else {
        handle_single(&downloader, &args, &formatter).await
    }
}

/// Handle single video download
async fn handle_single(
    downloader: &Downloader,
    args: &Args,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    // Print URL only mode
    if args.print_url {
        let resolved = downloader.resolve(&args.url).await?;
        formatter.print_resolved(&resolved);
        return Ok(());
    }

    let start_time = Instant::now();
    let details = downloader.video_details(&args.url).await?;
    formatter.print_video_info(&details);

    let report = downloader.download_details(details).await?;
    info!("Download completed successfully");
    formatter.print_download_complete(&report, start_time.elapsed());
    Ok(())
}

/// Handle playlist download
async fn handle_playlist(
    downloader: &Downloader,
    args: &Args,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    let playlist_id = extract_playlist_id(&args.url)?;
    info!("Processing playlist: {}", playlist_id);
    formatter.print_playlist_info(&playlist_id, args.playlist_limit());

    if args.print_url {
        for resolved in downloader
            .resolve_playlist(&args.url, args.playlist_limit())
            .await?
        {
            formatter.print_resolved(&resolved);
        }
        return Ok(());
    }

    let start_time = Instant::now();
    let reports = downloader
        .download_playlist(&args.url, args.playlist_limit())
        .await?;

    if reports.is_empty() {
        formatter.warning("No videos were downloaded");
        return Ok(());
    }
    for (index, report) in reports.iter().enumerate() {
        formatter.print_playlist_item(index, reports.len(), &report.details.title);
    }
    formatter.success(&format!(
        "Downloaded {} videos in {}",
        reports.len(),
        sigtube::core::format_eta(start_time.elapsed())
    ));
    formatter.reset_progress();
    Ok(())
}

/// Initialize logging system
fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}
