//! Media Fetch - Core Library
//!
//! Downloads media from direct links, HLS manifests, YouTube and pages that
//! embed a player, and converts downloaded files through ffmpeg.

pub mod core;
pub mod parsers;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::AppConfig,
    converter::TargetFormat,
    m3u8_downloader::{HlsDownloader, HlsRequest},
    manager::{Collaborators, DownloadManager},
    models::{AcquisitionMethod, AppError, AppResult, DownloadedFile},
    progress_tracker::ProgressObserver,
    source_discovery::SourceDiscovery,
    youtube_downloader::YoutubeDownloader,
};

use std::path::Path;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Loads the configuration, falling back to defaults when it is unreadable or invalid
///
/// With no explicit path the platform config file is used and created when missing.
pub fn load_or_initialize_config(path: Option<&Path>) -> AppConfig {
    let loaded = match path {
        Some(path) if path.exists() => AppConfig::load_from(path),
        Some(path) => {
            let config = AppConfig::default();
            if let Err(e) = config.save_to(path) {
                tracing::warn!("Failed to persist default configuration: {}", e);
            }
            Ok(config)
        }
        None => AppConfig::load(),
    };

    match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                "Failed to load configuration ({}). Using defaults",
                e
            );
            AppConfig::default()
        }
    }
}
