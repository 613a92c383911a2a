//! YouTube acquisition
//!
//! Metadata comes from a [`YoutubeClient`], tried with the default client
//! options and then an alternate set. The best stream is chosen locally:
//! a progressive stream when one exists, otherwise an adaptive video/audio
//! pair that is merged by the [`Transcoder`]. When metadata cannot be resolved
//! at all, or a stream download fails, the general downloader takes over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::config::YoutubeConfig;
use crate::core::error_handling::{run_strategy_chain, StrategyOutcome};
use crate::core::external_downloader::GeneralDownloader;
use crate::core::http_client::{HttpFetcher, RequestHeaders};
use crate::core::models::{AcquisitionMethod, AppError, AppResult, DownloadedFile};
use crate::core::progress_tracker::ProgressObserver;
use crate::core::tools::run_tool;
use crate::core::transcoder::Transcoder;
use crate::core::workspace::DownloadWorkspace;
use crate::utils::{ensure_dir_exists, output_filename};

/// Client option sets tried in order when resolving metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientVariant {
    Default,
    Alternate,
}

impl fmt::Display for ClientVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default client"),
            Self::Alternate => f.write_str("alternate client"),
        }
    }
}

/// One remote stream as reported by the metadata client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    pub url: Option<String>,
    pub height: Option<u32>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Progressive,
    AdaptiveVideo,
    AdaptiveAudio,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().map_or(false, |c| c != "none")
}

impl YoutubeFormat {
    /// `None` for formats carrying neither audio nor video (storyboards)
    pub fn kind(&self) -> Option<StreamKind> {
        match (has_codec(&self.vcodec), has_codec(&self.acodec)) {
            (true, true) => Some(StreamKind::Progressive),
            (true, false) => Some(StreamKind::AdaptiveVideo),
            (false, true) => Some(StreamKind::AdaptiveAudio),
            (false, false) => None,
        }
    }

    fn is_downloadable(&self) -> bool {
        self.url.as_deref().map_or(false, |u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubeVideoInfo {
    pub id: String,
    pub title: String,
    /// Length in seconds
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<YoutubeFormat>,
}

/// A selected stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChoice {
    pub kind: StreamKind,
    /// Height in pixels for video, bitrate in kbps for audio
    pub quality: u32,
    pub container: String,
    pub format: YoutubeFormat,
}

impl StreamChoice {
    fn new(kind: StreamKind, format: &YoutubeFormat) -> Self {
        let quality = match kind {
            StreamKind::AdaptiveAudio => format.abr.unwrap_or(0.0).round() as u32,
            _ => format.height.unwrap_or(0),
        };
        Self {
            kind,
            quality,
            container: format.ext.clone(),
            format: format.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPlan {
    Progressive(StreamChoice),
    Adaptive {
        video: StreamChoice,
        audio: StreamChoice,
    },
}

/// First maximum by `key`; earlier entries win ties
fn best_by<'a, I, K>(formats: I, key: K) -> Option<&'a YoutubeFormat>
where
    I: IntoIterator<Item = &'a YoutubeFormat>,
    K: Fn(&YoutubeFormat) -> u64,
{
    let mut best: Option<&YoutubeFormat> = None;
    for format in formats {
        if best.map_or(true, |b| key(format) > key(b)) {
            best = Some(format);
        }
    }
    best
}

fn height_key(format: &YoutubeFormat) -> u64 {
    u64::from(format.height.unwrap_or(0))
}

fn of_kind(formats: &[YoutubeFormat], kind: StreamKind) -> impl Iterator<Item = &YoutubeFormat> {
    formats
        .iter()
        .filter(move |f| f.kind() == Some(kind) && f.is_downloadable())
}

/// Audio containers that mux into an mp4 without re-encoding rank first
fn audio_rank(ext: &str) -> u64 {
    match ext {
        "m4a" | "mp4" => 2,
        "webm" => 1,
        _ => 0,
    }
}

/// Chooses what to download
///
/// Order of preference: the highest progressive stream in the first
/// `containers` entry that has one; the highest adaptive video (same container
/// preference) with the best audio; the highest progressive stream in any
/// container.
pub fn select_streams(formats: &[YoutubeFormat], containers: &[String]) -> AppResult<StreamPlan> {
    for container in containers {
        let candidates = of_kind(formats, StreamKind::Progressive).filter(|f| &f.ext == container);
        if let Some(best) = best_by(candidates, height_key) {
            return Ok(StreamPlan::Progressive(StreamChoice::new(
                StreamKind::Progressive,
                best,
            )));
        }
    }

    let video = containers
        .iter()
        .find_map(|container| {
            best_by(
                of_kind(formats, StreamKind::AdaptiveVideo).filter(|f| &f.ext == container),
                height_key,
            )
        })
        .or_else(|| best_by(of_kind(formats, StreamKind::AdaptiveVideo), height_key));
    let audio = best_by(of_kind(formats, StreamKind::AdaptiveAudio), |f| {
        audio_rank(&f.ext) * 1_000_000 + f.abr.unwrap_or(0.0).max(0.0) as u64
    });

    if let (Some(video), Some(audio)) = (video, audio) {
        return Ok(StreamPlan::Adaptive {
            video: StreamChoice::new(StreamKind::AdaptiveVideo, video),
            audio: StreamChoice::new(StreamKind::AdaptiveAudio, audio),
        });
    }

    best_by(of_kind(formats, StreamKind::Progressive), height_key)
        .map(|f| StreamPlan::Progressive(StreamChoice::new(StreamKind::Progressive, f)))
        .ok_or(AppError::NoStreamsAvailable)
}

#[async_trait]
pub trait YoutubeClient: Send + Sync {
    async fn fetch_info(&self, url: &str, variant: ClientVariant) -> AppResult<YoutubeVideoInfo>;
}

/// Metadata through `yt-dlp --dump-json`
pub struct YtDlpClient {
    binary: String,
    user_agent: String,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            user_agent: user_agent.into(),
        }
    }

    fn build_args(&self, url: &str, variant: ClientVariant) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        if variant == ClientVariant::Alternate {
            args.push("--extractor-args".to_string());
            args.push("youtube:player_client=android,web".to_string());
            args.push("--user-agent".to_string());
            args.push(self.user_agent.clone());
        }
        args.push(url.to_string());
        args
    }
}

pub fn parse_video_info(json: &str) -> AppResult<YoutubeVideoInfo> {
    serde_json::from_str(json.trim())
        .map_err(|e| AppError::Parse(format!("Invalid video metadata: {e}")))
}

#[async_trait]
impl YoutubeClient for YtDlpClient {
    async fn fetch_info(&self, url: &str, variant: ClientVariant) -> AppResult<YoutubeVideoInfo> {
        let output = run_tool(&self.binary, self.build_args(url, variant)).await?;
        parse_video_info(&output.stdout)
    }
}

/// Resolves, downloads and (for adaptive streams) merges one YouTube video
pub struct YoutubeDownloader {
    client: Arc<dyn YoutubeClient>,
    fetcher: Arc<dyn HttpFetcher>,
    transcoder: Arc<dyn Transcoder>,
    external: Arc<dyn GeneralDownloader>,
    config: YoutubeConfig,
    user_agent: String,
    temp_dir: PathBuf,
}

impl YoutubeDownloader {
    pub fn new(
        client: Arc<dyn YoutubeClient>,
        fetcher: Arc<dyn HttpFetcher>,
        transcoder: Arc<dyn Transcoder>,
        external: Arc<dyn GeneralDownloader>,
        config: YoutubeConfig,
        user_agent: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            fetcher,
            transcoder,
            external,
            config,
            user_agent: user_agent.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        let deadline = self.config.overall_deadline();
        match tokio::time::timeout(deadline, self.acquire(url, output_dir, observer)).await {
            Ok(result) => result,
            Err(_) => {
                error!("YouTube download exceeded {}s: {}", deadline.as_secs(), url);
                Err(AppError::Timeout(self.config.overall_deadline_secs))
            }
        }
    }

    async fn acquire(
        &self,
        url: &str,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        ensure_dir_exists(output_dir).await?;

        let variants = [ClientVariant::Default, ClientVariant::Alternate];
        let info = match run_strategy_chain("YouTube metadata", &variants, |variant| async move {
            StrategyOutcome::retryable(self.client.fetch_info(url, *variant).await)
        })
        .await
        {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not resolve video metadata: {}", e);
                return self.fallback(url, output_dir).await;
            }
        };

        info!("Video title: {}", info.title);
        if let Some(duration) = info.duration {
            info!("Video length: {:.0} seconds", duration);
        }

        match select_streams(&info.formats, &self.config.preferred_containers)? {
            StreamPlan::Progressive(choice) => {
                self.download_progressive(url, &info, &choice, output_dir, observer)
                    .await
            }
            StreamPlan::Adaptive { video, audio } => {
                self.download_adaptive(url, &info, &video, &audio, output_dir, observer)
                    .await
            }
        }
    }

    async fn download_progressive(
        &self,
        url: &str,
        info: &YoutubeVideoInfo,
        choice: &StreamChoice,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        info!(
            "Selected progressive stream {} ({}p, {})",
            choice.format.format_id, choice.quality, choice.container
        );
        let dest = output_dir.join(self.filename(info, &choice.container));

        match self.fetch_stream(choice, &dest, observer).await {
            Ok(size_bytes) => Ok(DownloadedFile {
                path: dest,
                size_bytes,
                method: AcquisitionMethod::YoutubeProgressive,
            }),
            Err(e) => {
                warn!("Stream download failed: {}", e);
                let _ = tokio::fs::remove_file(&dest).await;
                self.fallback(url, output_dir).await
            }
        }
    }

    async fn download_adaptive(
        &self,
        url: &str,
        info: &YoutubeVideoInfo,
        video: &StreamChoice,
        audio: &StreamChoice,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        info!(
            "Selected adaptive streams: video {} ({}p), audio {} ({} kbps)",
            video.format.format_id, video.quality, audio.format.format_id, audio.quality
        );
        let workspace = DownloadWorkspace::create(&self.temp_dir, "youtube_download_")?;
        let result = self
            .merge_adaptive(info, video, audio, &workspace, output_dir, observer)
            .await;
        workspace.close();

        match result {
            Err(AppError::Network { url: stream, reason }) => {
                warn!("Stream download failed ({}): {}", stream, reason);
                self.fallback(url, output_dir).await
            }
            other => other,
        }
    }

    async fn merge_adaptive(
        &self,
        info: &YoutubeVideoInfo,
        video: &StreamChoice,
        audio: &StreamChoice,
        workspace: &DownloadWorkspace,
        output_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        let video_path = workspace.file(&format!("video.{}", video.container));
        let audio_path = workspace.file(&format!("audio.{}", audio.container));

        info!("Downloading video stream...");
        self.fetch_stream(video, &video_path, observer).await?;
        info!("Downloading audio stream...");
        self.fetch_stream(audio, &audio_path, observer).await?;

        let output = output_dir.join(self.filename(info, "mp4"));
        info!("Merging video and audio into {}", output.display());
        self.transcoder
            .merge(&video_path, &audio_path, &output)
            .await?;

        let size_bytes = tokio::fs::metadata(&output).await?.len();
        Ok(DownloadedFile {
            path: output,
            size_bytes,
            method: AcquisitionMethod::YoutubeAdaptive,
        })
    }

    async fn fetch_stream(
        &self,
        choice: &StreamChoice,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<u64> {
        let url = choice.format.url.as_deref().ok_or(AppError::NoStreamsAvailable)?;
        let mut headers = RequestHeaders::new().with_user_agent(&self.user_agent);
        for (name, value) in &choice.format.http_headers {
            headers.insert(name.as_str(), value.as_str());
        }
        self.fetcher
            .download_to_file(url, &headers, dest, observer)
            .await
    }

    fn filename(&self, info: &YoutubeVideoInfo, ext: &str) -> String {
        output_filename(Some(&info.title), ext, &format!("{}.{}", info.id, ext))
    }

    async fn fallback(&self, url: &str, output_dir: &Path) -> AppResult<DownloadedFile> {
        info!(
            "Falling back to the general downloader (<= {}p)",
            self.config.fallback_max_height
        );
        self.external
            .download(
                url,
                output_dir,
                self.config.fallback_max_height,
                &RequestHeaders::new().with_user_agent(&self.user_agent),
            )
            .await
    }
}
