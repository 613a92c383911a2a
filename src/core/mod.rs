//! Core business logic module
//!
//! Acquisition pipelines (direct, HLS, YouTube, embedded players), the
//! external tool seams they run on, and the configuration tying them together.

pub mod config;
pub mod converter;
pub mod downloader;
pub mod error_handling;
pub mod external_downloader;
pub mod http_client;
pub mod m3u8_downloader;
pub mod manager;
pub mod models;
pub mod playlist_resolver;
pub mod progress_tracker;
pub mod segment_assembler;
pub mod segment_fetcher;
pub mod source_discovery;
pub mod tools;
pub mod transcoder;
pub mod workspace;
pub mod youtube_downloader;

#[cfg(test)]
mod m3u8_integration_tests;

#[cfg(test)]
mod youtube_downloader_integration_tests;


// Re-export commonly used types
pub use config::AppConfig;
pub use manager::DownloadManager;
