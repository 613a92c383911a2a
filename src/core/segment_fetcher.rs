//! HLS 片段下载
//!
//! 以有限并发下载片段并写入工作目录。单个片段失败只记录，不会取消其他片段；
//! 结果始终按 `index` 排序，与完成顺序无关。

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

use super::config::HlsConfig;
use super::http_client::{HttpFetcher, RequestHeaders};
use super::models::{AppError, AppResult};
use super::progress_tracker::ProgressObserver;
use super::workspace::DownloadWorkspace;
use crate::utils::format_bytes;

/// 已落盘的片段数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentData {
    pub path: PathBuf,
    pub len: u64,
}

/// 单个片段的下载结果
#[derive(Debug, Clone)]
pub struct SegmentFetchResult {
    pub index: usize,
    pub data: Option<SegmentData>,
    pub error: Option<String>,
}

impl SegmentFetchResult {
    fn success(index: usize, data: SegmentData) -> Self {
        Self {
            index,
            data: Some(data),
            error: None,
        }
    }

    fn failure(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

/// 一个媒体播放列表的全部片段结果，`index` 为 0 起的连续区间
#[derive(Debug, Clone)]
pub struct FetchBatch {
    results: Vec<SegmentFetchResult>,
}

impl FetchBatch {
    pub fn new(mut results: Vec<SegmentFetchResult>) -> Self {
        results.sort_by_key(|r| r.index);
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[SegmentFetchResult] {
        &self.results
    }

    /// 成功的片段，按 `index` 升序
    pub fn successes(&self) -> impl Iterator<Item = &SegmentData> {
        self.results.iter().filter_map(|r| r.data.as_ref())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.index)
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.successes().map(|d| d.len).sum()
    }
}

pub struct SegmentFetcher {
    fetcher: Arc<dyn HttpFetcher>,
    config: HlsConfig,
}

impl SegmentFetcher {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, config: HlsConfig) -> Self {
        Self { fetcher, config }
    }

    /// 下载全部片段；没有任何片段成功时返回 [`AppError::AllSegmentsFailed`]
    pub async fn fetch_all(
        &self,
        segment_urls: &[String],
        headers: &RequestHeaders,
        workspace: &DownloadWorkspace,
        observer: &dyn ProgressObserver,
    ) -> AppResult<FetchBatch> {
        if segment_urls.is_empty() {
            return Err(AppError::NoSegmentsFound);
        }

        let total = segment_urls.len();
        let concurrency = self.config.max_concurrent_segments.max(1);
        tracing::info!("开始下载 {} 个片段 (并发 {})", total, concurrency);

        let mut pending = stream::iter(segment_urls.iter().enumerate())
            .map(|(index, url)| self.fetch_one(index, url, headers, workspace))
            .buffer_unordered(concurrency);

        let mut results = Vec::with_capacity(total);
        let mut bytes_done = 0u64;
        while let Some(result) = pending.next().await {
            if let Some(data) = &result.data {
                bytes_done += data.len;
                observer.on_progress(bytes_done, None);
            }
            results.push(result);
            observer.on_segment(results.len(), total);
        }
        observer.on_finish();

        let batch = FetchBatch::new(results);
        let succeeded = batch.success_count();
        if succeeded == 0 {
            return Err(AppError::AllSegmentsFailed(total));
        }

        let failed = batch.failed_indices();
        if !failed.is_empty() {
            tracing::warn!("{} 个片段下载失败: {:?}", failed.len(), failed);
        }

        let total_bytes = batch.total_bytes();
        tracing::info!(
            "片段下载完成: {}/{} 成功, 共 {}",
            succeeded,
            total,
            format_bytes(total_bytes)
        );
        if total_bytes < self.config.min_total_bytes {
            tracing::warn!(
                "下载总量仅 {}，低于 {}，文件可能不完整",
                format_bytes(total_bytes),
                format_bytes(self.config.min_total_bytes)
            );
        }

        Ok(batch)
    }

    async fn fetch_one(
        &self,
        index: usize,
        url: &str,
        headers: &RequestHeaders,
        workspace: &DownloadWorkspace,
    ) -> SegmentFetchResult {
        let response = match self
            .fetcher
            .get(url, headers, Some(self.config.segment_timeout()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("片段 {} 下载失败: {}", index, e);
                return SegmentFetchResult::failure(index, e.to_string());
            }
        };

        if !response.is_success() {
            tracing::warn!("片段 {} 返回状态 {}: {}", index, response.status, url);
            return SegmentFetchResult::failure(index, format!("HTTP status {}", response.status));
        }

        let len = response.body.len() as u64;
        if len < self.config.min_segment_bytes {
            tracing::warn!("片段 {} 过小 ({} 字节)，仍然保留", index, len);
        }

        let path = workspace.segment_path(index);
        if let Err(e) = tokio::fs::write(&path, &response.body).await {
            tracing::warn!("片段 {} 写入失败: {}", index, e);
            return SegmentFetchResult::failure(index, e.to_string());
        }

        SegmentFetchResult::success(index, SegmentData { path, len })
    }
}
