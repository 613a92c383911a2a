//! Download Manager - entry point that routes a URL to the right acquisition path
//!
//! YouTube links go to [`YoutubeDownloader`], media files to [`DirectDownloader`],
//! HLS manifests to [`HlsDownloader`]. Anything else is treated as a web page
//! and handed to [`SourceDiscovery`] first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::converter::{convert_media, list_downloaded_files, TargetFormat};
use crate::core::downloader::DirectDownloader;
use crate::core::external_downloader::{GeneralDownloader, YtDlpDownloader};
use crate::core::http_client::{HttpFetcher, ReqwestFetcher};
use crate::core::m3u8_downloader::{HlsDownloader, HlsRequest};
use crate::core::models::{AppError, AppResult, DownloadedFile, SourceKind};
use crate::core::progress_tracker::ProgressObserver;
use crate::core::source_discovery::{DiscoveredSource, SourceDiscovery};
use crate::core::transcoder::{FfmpegTranscoder, Transcoder};
use crate::core::youtube_downloader::{YoutubeClient, YoutubeDownloader, YtDlpClient};
use crate::utils::network::{has_media_extension, is_m3u8_url, is_youtube_url};
use crate::utils::validation::validate_url;

/// Acquisition path chosen for an input URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadRoute {
    Youtube,
    Direct,
    Hls,
    Discovery,
}

pub fn route_for(url: &str, media_extensions: &[String]) -> DownloadRoute {
    if is_youtube_url(url) {
        DownloadRoute::Youtube
    } else if has_media_extension(url, media_extensions) {
        DownloadRoute::Direct
    } else if is_m3u8_url(url) {
        DownloadRoute::Hls
    } else {
        DownloadRoute::Discovery
    }
}

/// External seams the manager is built from
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn HttpFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub external: Arc<dyn GeneralDownloader>,
    pub youtube_client: Arc<dyn YoutubeClient>,
}

impl Collaborators {
    /// reqwest for HTTP, ffmpeg and yt-dlp for the tools
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let fetcher =
            ReqwestFetcher::new(&config.network.user_agent, config.network.request_timeout())?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            transcoder: Arc::new(FfmpegTranscoder::new(config.tools.ffmpeg.clone())),
            external: Arc::new(YtDlpDownloader::new(config.tools.yt_dlp.clone())),
            youtube_client: Arc::new(YtDlpClient::new(
                config.tools.yt_dlp.clone(),
                config.network.user_agent.clone(),
            )),
        })
    }
}

pub struct DownloadManager {
    config: AppConfig,
    transcoder: Arc<dyn Transcoder>,
    direct: DirectDownloader,
    hls: HlsDownloader,
    discovery: SourceDiscovery,
    youtube: YoutubeDownloader,
}

impl DownloadManager {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::with_collaborators(config, collaborators))
    }

    pub fn with_collaborators(config: AppConfig, parts: Collaborators) -> Self {
        let user_agent = config.network.user_agent.clone();
        let temp_dir = config.paths.temp_dir.clone();

        let direct = DirectDownloader::new(parts.fetcher.clone(), user_agent.clone());
        let hls = HlsDownloader::new(
            parts.fetcher.clone(),
            parts.transcoder.clone(),
            parts.external.clone(),
            config.hls.clone(),
            user_agent.clone(),
            temp_dir.clone(),
        )
        .with_fallback_max_height(config.youtube.fallback_max_height);
        let discovery = SourceDiscovery::new(
            parts.fetcher.clone(),
            user_agent.clone(),
            config.discovery.clone(),
        );
        let youtube = YoutubeDownloader::new(
            parts.youtube_client,
            parts.fetcher,
            parts.transcoder.clone(),
            parts.external,
            config.youtube.clone(),
            user_agent,
            temp_dir,
        );

        Self {
            config,
            transcoder: parts.transcoder,
            direct,
            hls,
            discovery,
            youtube,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Downloads into today's download directory
    pub async fn handle(
        &self,
        url: &str,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        let (download_dir, _) = self.config.paths.today_dirs();
        self.handle_in(url, &download_dir, observer).await
    }

    pub async fn handle_in(
        &self,
        url: &str,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        let url = url.trim();
        validate_url(url)?;

        let route = route_for(url, &self.config.discovery.media_extensions);
        info!("Handling {} as {:?}", url, route);

        match route {
            DownloadRoute::Youtube => self.youtube.download(url, output_dir, observer).await,
            DownloadRoute::Direct => self.direct.download(url, output_dir, None, observer).await,
            DownloadRoute::Hls => {
                let request = HlsRequest::new(url, output_dir);
                self.hls.download(&request, observer).await
            }
            DownloadRoute::Discovery => {
                info!("Not a direct media link or YouTube, looking for embedded video");
                let found = self.discovery.discover(url).await?;
                self.download_discovered(found, output_dir, observer).await
            }
        }
    }

    async fn download_discovered(
        &self,
        found: DiscoveredSource,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        match found.candidate.kind {
            SourceKind::HlsManifest => {
                let request = HlsRequest::new(found.candidate.url, output_dir)
                    .with_referer(Some(found.page_url))
                    .with_title(found.title);
                self.hls.download(&request, observer).await
            }
            SourceKind::DirectMedia | SourceKind::Unknown => {
                self.direct
                    .download(
                        &found.candidate.url,
                        output_dir,
                        found.referer.as_deref(),
                        observer,
                    )
                    .await
            }
            // discovery never returns unusable candidates
            SourceKind::BlobUnsupported => Err(AppError::NoMediaFound),
        }
    }

    /// Converts into today's convert directory
    pub async fn convert(&self, input: &Path, format: TargetFormat) -> AppResult<PathBuf> {
        let (_, convert_dir) = self.config.paths.today_dirs();
        convert_media(self.transcoder.as_ref(), input, &convert_dir, format).await
    }

    /// Every file ever downloaded, across all dated directories
    pub fn list_downloads(&self) -> Vec<PathBuf> {
        list_downloaded_files(&self.config.paths.download_dir)
    }
}
