//! 播放列表解析器
//!
//! 下载播放列表文本；遇到主播放列表时选择最高带宽变体并继续解析，直到得到媒体播放列表。

use std::sync::Arc;

use super::http_client::{HttpFetcher, RequestHeaders};
use super::models::{AppError, AppResult};
use crate::parsers::{parse_playlist, PlaylistDocument};

/// 主播放列表嵌套的最大层数
const MAX_VARIANT_HOPS: usize = 8;

/// 最终的媒体播放列表
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    /// 媒体播放列表自身的地址
    pub url: String,
    pub segment_urls: Vec<String>,
}

pub struct PlaylistResolver {
    fetcher: Arc<dyn HttpFetcher>,
    min_segment_count: usize,
}

impl PlaylistResolver {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, min_segment_count: usize) -> Self {
        Self {
            fetcher,
            min_segment_count,
        }
    }

    pub async fn resolve(&self, url: &str, headers: &RequestHeaders) -> AppResult<ResolvedPlaylist> {
        let mut current = url.to_string();

        for _ in 0..=MAX_VARIANT_HOPS {
            tracing::debug!("获取播放列表: {}", current);
            let content = self.fetcher.get_text(&current, headers).await?;

            match parse_playlist(&content, &current)? {
                PlaylistDocument::Media { segment_urls } => {
                    if segment_urls.len() < self.min_segment_count {
                        tracing::warn!(
                            "播放列表只有 {} 个片段，可能解析有误: {}",
                            segment_urls.len(),
                            current
                        );
                    } else {
                        tracing::info!("解析到 {} 个片段", segment_urls.len());
                    }
                    return Ok(ResolvedPlaylist {
                        url: current,
                        segment_urls,
                    });
                }
                master @ PlaylistDocument::Master { .. } => {
                    let best = master.best_variant().ok_or(AppError::NoSegmentsFound)?;
                    tracing::info!("选择变体 BANDWIDTH={}: {}", best.bandwidth, best.url);
                    current = best.url.clone();
                }
            }
        }

        Err(AppError::Parse(format!(
            "master playlists nested deeper than {MAX_VARIANT_HOPS} levels: {url}"
        )))
    }
}
