//! Application configuration management

use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathConfig,
    pub network: NetworkConfig,
    pub hls: HlsConfig,
    pub youtube: YoutubeConfig,
    pub discovery: DiscoveryConfig,
    pub tools: ToolConfig,
}

/// Where downloads, conversions and scratch workspaces live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub download_dir: PathBuf,
    pub convert_dir: PathBuf,
    pub temp_dir: PathBuf,
}

/// HTTP settings shared by every request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// HLS acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsConfig {
    pub segment_timeout_secs: u64,
    pub max_concurrent_segments: usize,
    /// Segments smaller than this are logged as suspicious but still kept
    pub min_segment_bytes: u64,
    /// Total payloads smaller than this are logged as suspicious
    pub min_total_bytes: u64,
    /// Playlists with fewer segments are logged as possibly mis-parsed
    pub min_segment_count: usize,
    pub overall_deadline_secs: u64,
    /// Hand the manifest to the general downloader when the manual pipeline fails
    pub external_fallback: bool,
}

/// YouTube-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Quality ceiling passed to the general downloader fallback
    pub fallback_max_height: u32,
    /// Containers ordered from most to least compatible
    pub preferred_containers: Vec<String>,
    pub overall_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_iframe_depth: usize,
    pub media_extensions: Vec<String>,
    /// Upper bound for fetching and analysing the whole page chain
    pub overall_deadline_secs: u64,
}

/// External executables, by name or absolute path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub ffmpeg: String,
    pub yt_dlp: String,
}

impl PathConfig {
    /// Lays out `download`, `convert` and `temp` under one root
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            download_dir: root.join("download"),
            convert_dir: root.join("convert"),
            temp_dir: root.join("temp"),
        }
    }

    /// Dated download and convert directories for `date`
    pub fn daily_dirs(&self, date: NaiveDate) -> (PathBuf, PathBuf) {
        let stamp = date.format("%Y-%m-%d").to_string();
        (self.download_dir.join(&stamp), self.convert_dir.join(&stamp))
    }

    pub fn today_dirs(&self) -> (PathBuf, PathBuf) {
        self.daily_dirs(chrono::Local::now().date_naive())
    }

    /// Creates the dated directories and the temp root
    pub fn setup_directories(&self, date: NaiveDate) -> Result<(PathBuf, PathBuf)> {
        let (download, convert) = self.daily_dirs(date);
        for dir in [&download, &convert, &self.temp_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        Ok((download, convert))
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self::under("data")
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::utils::network::DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_timeout_secs: 30,
            max_concurrent_segments: 8,
            min_segment_bytes: 1000,
            min_total_bytes: 10 * 1024 * 1024,
            min_segment_count: 10,
            overall_deadline_secs: 4 * 60 * 60,
            external_fallback: true,
        }
    }
}

impl HlsConfig {
    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.overall_deadline_secs)
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            fallback_max_height: 720,
            preferred_containers: vec!["mp4".to_string(), "webm".to_string()],
            overall_deadline_secs: 4 * 60 * 60,
        }
    }
}

impl YoutubeConfig {
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.overall_deadline_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_iframe_depth: 1,
            media_extensions: ["mp4", "mp3", "wav", "mov", "mkv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            overall_deadline_secs: 120,
        }
    }
}

impl DiscoveryConfig {
    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.overall_deadline_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            yt_dlp: "yt-dlp".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig =
            serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;

        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved configuration to: {:?}", path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "mediafetch", "media-fetch")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.request_timeout_secs == 0 || self.network.request_timeout_secs > 300 {
            anyhow::bail!("Request timeout should be between 1 and 300 seconds");
        }

        if self.hls.segment_timeout_secs == 0 {
            anyhow::bail!("Segment timeout must be greater than 0");
        }

        if self.hls.max_concurrent_segments == 0 {
            anyhow::bail!("Concurrent segment downloads must be greater than 0");
        }

        if self.hls.max_concurrent_segments > 32 {
            anyhow::bail!("Concurrent segment downloads should not exceed 32");
        }

        if self.hls.overall_deadline_secs == 0
            || self.youtube.overall_deadline_secs == 0
            || self.discovery.overall_deadline_secs == 0
        {
            anyhow::bail!("Overall deadlines must be greater than 0");
        }

        if self.discovery.max_iframe_depth > 5 {
            anyhow::bail!("Iframe depth should not exceed 5");
        }

        if self.youtube.fallback_max_height == 0 {
            anyhow::bail!("Fallback quality ceiling must be greater than 0");
        }

        if self.tools.ffmpeg.trim().is_empty() || self.tools.yt_dlp.trim().is_empty() {
            anyhow::bail!("Tool names must not be empty");
        }

        Ok(())
    }
}
