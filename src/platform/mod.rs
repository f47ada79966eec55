//! Video platform API client and related functionality

pub mod bundle;
pub mod client;
pub mod innertube;

pub use bundle::*;
pub use client::*;
pub use innertube::*;
