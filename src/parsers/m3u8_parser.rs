//! M3U8 播放列表解析
//!
//! 只处理 `#EXT-X-STREAM-INF` / `BANDWIDTH=` 与注释行这一最小子集。
//! 一个文档要么是主播放列表（变体列表），要么是媒体播放列表（片段列表），不会同时是两者。

use regex::Regex;
use std::sync::OnceLock;

use crate::core::models::{AppError, AppResult};
use crate::utils::network::resolve_url;

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

/// 主播放列表中的一个变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bandwidth: u64,
    /// 已解析为绝对地址
    pub url: String,
}

/// 解析后的播放列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistDocument {
    Master { variants: Vec<Variant> },
    Media { segment_urls: Vec<String> },
}

impl PlaylistDocument {
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master { .. })
    }

    /// 带宽严格最大的变体，相同带宽时取先出现者
    pub fn best_variant(&self) -> Option<&Variant> {
        match self {
            Self::Master { variants } => {
                let mut best: Option<&Variant> = None;
                for variant in variants {
                    if best.map_or(true, |b| variant.bandwidth > b.bandwidth) {
                        best = Some(variant);
                    }
                }
                best
            }
            Self::Media { .. } => None,
        }
    }

    pub fn segment_urls(&self) -> &[String] {
        match self {
            Self::Media { segment_urls } => segment_urls,
            Self::Master { .. } => &[],
        }
    }
}

fn bandwidth_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 属性名需以 `:` 或 `,` 开头，避免匹配 AVERAGE-BANDWIDTH
    RE.get_or_init(|| Regex::new(r"(?:^|[:,])BANDWIDTH=(\d+)").expect("static regex"))
}

/// 解析播放列表文本，相对地址以 `base_url` 为基准
///
/// 含有 stream-info 标记的文档按主播放列表处理，其中的变体地址不会被当作片段。
/// 既没有变体也没有片段时返回 [`AppError::NoSegmentsFound`]。
pub fn parse_playlist(content: &str, base_url: &str) -> AppResult<PlaylistDocument> {
    let lines: Vec<&str> = content.lines().map(str::trim).collect();

    if lines.iter().any(|line| line.starts_with(STREAM_INF_TAG)) {
        let variants = parse_variants(&lines, base_url)?;
        if variants.is_empty() {
            return Err(AppError::NoSegmentsFound);
        }
        return Ok(PlaylistDocument::Master { variants });
    }

    let mut segment_urls = Vec::new();
    for line in lines {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        segment_urls.push(resolve_url(base_url, line)?);
    }

    if segment_urls.is_empty() {
        return Err(AppError::NoSegmentsFound);
    }
    Ok(PlaylistDocument::Media { segment_urls })
}

fn parse_variants(lines: &[&str], base_url: &str) -> AppResult<Vec<Variant>> {
    let mut variants = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with(STREAM_INF_TAG) {
            continue;
        }

        let Some(bandwidth) = bandwidth_regex()
            .captures(line)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        else {
            tracing::warn!("跳过缺少 BANDWIDTH 的变体: {}", line);
            continue;
        };

        // 变体地址是其后第一个非空行
        let uri = lines[i + 1..].iter().find(|l| !l.is_empty());
        match uri {
            Some(uri) if !uri.starts_with('#') => variants.push(Variant {
                bandwidth,
                url: resolve_url(base_url, uri)?,
            }),
            _ => tracing::warn!("变体缺少地址 (BANDWIDTH={})", bandwidth),
        }
    }

    Ok(variants)
}
