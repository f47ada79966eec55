//! Core functionality for sigtube

pub mod downloader;
pub mod progress;
pub mod video_info;

pub use downloader::*;
pub use progress::*;
pub use video_info::*;
