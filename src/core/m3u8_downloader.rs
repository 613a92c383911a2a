//! M3U8/HLS 流媒体下载器
//!
//! 按顺序尝试以下策略，直到某一个成功：
//! - ffmpeg 直接对播放列表做流复制
//! - 手动流程：解析播放列表 → 下载片段 → 合并
//! - 通用下载器（yt-dlp）兜底
//!
//! 每次调用独占一个临时工作目录，无论成功失败都会在结束时删除。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::HlsConfig;
use super::error_handling::{run_strategy_chain, StrategyOutcome};
use super::external_downloader::GeneralDownloader;
use super::http_client::{HttpFetcher, RequestHeaders};
use super::models::{AcquisitionMethod, AppError, AppResult, DownloadedFile};
use super::playlist_resolver::PlaylistResolver;
use super::progress_tracker::ProgressObserver;
use super::segment_assembler::SegmentAssembler;
use super::segment_fetcher::SegmentFetcher;
use super::transcoder::Transcoder;
use super::workspace::DownloadWorkspace;
use crate::utils::{ensure_dir_exists, file_size, output_filename};

pub const DEFAULT_HLS_FILENAME: &str = "video_stream.mp4";

/// 一次 HLS 下载请求
#[derive(Debug, Clone)]
pub struct HlsRequest {
    pub manifest_url: String,
    /// 嵌入页面地址，作为 Referer 发送
    pub referer: Option<String>,
    /// 页面标题，用作输出文件名
    pub title: Option<String>,
    pub output_dir: PathBuf,
}

impl HlsRequest {
    pub fn new(manifest_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            referer: None,
            title: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(output_filename(
            self.title.as_deref(),
            "mp4",
            DEFAULT_HLS_FILENAME,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HlsStrategy {
    StreamCopy,
    SegmentPipeline,
    ExternalDownloader,
}

impl fmt::Display for HlsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StreamCopy => "stream copy",
            Self::SegmentPipeline => "segment pipeline",
            Self::ExternalDownloader => "external downloader",
        })
    }
}

/// 单次调用内各策略共享的上下文
struct Attempt<'a> {
    request: &'a HlsRequest,
    headers: RequestHeaders,
    output: PathBuf,
    workspace: &'a DownloadWorkspace,
    observer: &'a dyn ProgressObserver,
}

pub struct HlsDownloader {
    fetcher: Arc<dyn HttpFetcher>,
    transcoder: Arc<dyn Transcoder>,
    external: Arc<dyn GeneralDownloader>,
    config: HlsConfig,
    user_agent: String,
    temp_dir: PathBuf,
    fallback_max_height: u32,
}

impl HlsDownloader {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        transcoder: Arc<dyn Transcoder>,
        external: Arc<dyn GeneralDownloader>,
        config: HlsConfig,
        user_agent: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            external,
            config,
            user_agent: user_agent.into(),
            temp_dir: temp_dir.into(),
            fallback_max_height: 720,
        }
    }

    pub fn with_fallback_max_height(mut self, max_height: u32) -> Self {
        self.fallback_max_height = max_height;
        self
    }

    fn strategies(&self) -> Vec<HlsStrategy> {
        let mut strategies = vec![HlsStrategy::StreamCopy, HlsStrategy::SegmentPipeline];
        if self.config.external_fallback {
            strategies.push(HlsStrategy::ExternalDownloader);
        }
        strategies
    }

    /// 下载 HLS 流，返回最终文件
    pub async fn download(
        &self,
        request: &HlsRequest,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        ensure_dir_exists(&request.output_dir).await?;
        let workspace = DownloadWorkspace::create(&self.temp_dir, "hls_download_")?;

        let attempt = Attempt {
            request,
            headers: RequestHeaders::new()
                .with_user_agent(&self.user_agent)
                .with_referer(request.referer.as_deref()),
            output: request.output_path(),
            workspace: &workspace,
            observer,
        };

        tracing::info!(
            "开始 HLS 下载: {} -> {}",
            request.manifest_url,
            attempt.output.display()
        );

        let strategies = self.strategies();
        let chain = run_strategy_chain("HLS download", &strategies, |strategy| {
            self.run(*strategy, &attempt)
        });

        let result = match tokio::time::timeout(self.config.overall_deadline(), chain).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.config.overall_deadline_secs)),
        };

        drop(attempt);
        workspace.close();

        match &result {
            Ok(file) => tracing::info!(
                "HLS 下载完成 ({}): {} ({} 字节)",
                file.method,
                file.path.display(),
                file.size_bytes
            ),
            Err(e) => tracing::error!("HLS 下载失败: {}", e),
        }
        result
    }

    async fn run(
        &self,
        strategy: HlsStrategy,
        attempt: &Attempt<'_>,
    ) -> StrategyOutcome<DownloadedFile> {
        match strategy {
            HlsStrategy::StreamCopy => self.stream_copy(attempt).await,
            HlsStrategy::SegmentPipeline => match self.segment_pipeline(attempt).await {
                Ok(file) => StrategyOutcome::Ok(file),
                Err(e) => {
                    if !e.is_pipeline_failure() {
                        tracing::warn!("播放列表或工作目录出错: {}", e);
                    }
                    StrategyOutcome::Retryable(e)
                }
            },
            HlsStrategy::ExternalDownloader => StrategyOutcome::retryable(
                self.external
                    .download(
                        &attempt.request.manifest_url,
                        &attempt.request.output_dir,
                        self.fallback_max_height,
                        &attempt.headers,
                    )
                    .await,
            ),
        }
    }

    async fn stream_copy(&self, attempt: &Attempt<'_>) -> StrategyOutcome<DownloadedFile> {
        let result = self
            .transcoder
            .stream_copy(&attempt.request.manifest_url, &attempt.output, &attempt.headers)
            .await;

        match result {
            Ok(_) => match file_size(&attempt.output).await {
                Ok(size_bytes) => StrategyOutcome::Ok(DownloadedFile {
                    path: attempt.output.clone(),
                    size_bytes,
                    method: AcquisitionMethod::HlsStreamCopy,
                }),
                Err(e) => StrategyOutcome::Retryable(e),
            },
            Err(e) => {
                // 未安装 ffmpeg 立即报告；手动流程的二进制拼接不依赖它
                if let AppError::ToolNotFound(tool) = &e {
                    tracing::error!("{} 未安装，跳过流复制", tool);
                }
                remove_partial(&attempt.output).await;
                StrategyOutcome::Retryable(e)
            }
        }
    }

    async fn segment_pipeline(&self, attempt: &Attempt<'_>) -> AppResult<DownloadedFile> {
        let resolver = PlaylistResolver::new(self.fetcher.clone(), self.config.min_segment_count);
        let playlist = resolver
            .resolve(&attempt.request.manifest_url, &attempt.headers)
            .await?;

        let fetcher = SegmentFetcher::new(self.fetcher.clone(), self.config.clone());
        let batch = fetcher
            .fetch_all(
                &playlist.segment_urls,
                &attempt.headers,
                attempt.workspace,
                attempt.observer,
            )
            .await?;

        SegmentAssembler::new(self.transcoder.clone())
            .assemble(&batch, attempt.workspace, &attempt.output)
            .await
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("无法删除未完成的文件 {}: {}", path.display(), e);
        }
    }
}
