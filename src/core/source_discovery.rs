//! Source discovery
//!
//! Finds a downloadable media URL behind an arbitrary web page. Video and
//! source elements are checked first; when a page has none, its first iframe
//! is followed, up to a configured number of hops.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, OnceLock};

use super::config::DiscoveryConfig;
use super::http_client::{HttpFetcher, RequestHeaders};
use super::models::{AppError, AppResult, SourceCandidate, SourceKind};
use crate::utils::network::{has_media_extension, is_m3u8_url, resolve_url};

/// A usable candidate and the page it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub candidate: SourceCandidate,
    /// Page the candidate was extracted from; sent as Referer for HLS requests
    pub page_url: String,
    /// Referer used when fetching that page, set once an iframe was followed
    pub referer: Option<String>,
    pub title: Option<String>,
}

/// What a single page offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAnalysis {
    Source {
        candidate: SourceCandidate,
        title: Option<String>,
    },
    Iframe(String),
    Nothing,
}

fn selector(css: &'static str) -> AppResult<Selector> {
    Selector::parse(css).map_err(|e| AppError::Parse(format!("invalid selector {css}: {e:?}")))
}

fn plyr_title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""title":\s*"([^"]+)""#).expect("static regex"))
}

/// `src` of every `<video>`, its nested `<source>`s, then every `<source>` in the document
///
/// Nested sources therefore appear twice; callers only act on the first usable one.
pub fn extract_video_sources(html: &str) -> AppResult<Vec<String>> {
    let document = Html::parse_document(html);
    let video = selector("video")?;
    let source = selector("source")?;

    let mut sources = Vec::new();
    for element in document.select(&video) {
        if let Some(src) = element.value().attr("src") {
            sources.push(src.to_string());
        }
        for nested in element.select(&source) {
            if let Some(src) = nested.value().attr("src") {
                sources.push(src.to_string());
            }
        }
    }
    for element in document.select(&source) {
        if let Some(src) = element.value().attr("src") {
            sources.push(src.to_string());
        }
    }

    Ok(sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Title from the first video's `data-plyr-config`, else the page `<title>`
pub fn extract_video_title(html: &str) -> AppResult<Option<String>> {
    let document = Html::parse_document(html);

    if let Some(video) = document.select(&selector("video")?).next() {
        if let Some(config) = video.value().attr("data-plyr-config") {
            if let Some(caps) = plyr_title_regex().captures(config) {
                return Ok(Some(caps[1].to_string()));
            }
        }
    }

    Ok(document
        .select(&selector("title")?)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty()))
}

/// `src` of the first `<iframe>`, protocol-relative values upgraded to https
pub fn find_iframe_src(html: &str) -> AppResult<Option<String>> {
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector("iframe")?)
        .next()
        .and_then(|iframe| iframe.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(|src| match src.strip_prefix("//") {
            Some(rest) => format!("https://{rest}"),
            None => src.to_string(),
        }))
}

pub fn classify_source(url: &str, media_extensions: &[String]) -> SourceKind {
    if url.starts_with("blob:") {
        SourceKind::BlobUnsupported
    } else if is_m3u8_url(url) {
        SourceKind::HlsManifest
    } else if has_media_extension(url, media_extensions) {
        SourceKind::DirectMedia
    } else {
        SourceKind::Unknown
    }
}

/// Picks the first usable source of a page, or its iframe when it has no sources
pub fn analyze_page(
    html: &str,
    page_url: &str,
    media_extensions: &[String],
) -> AppResult<PageAnalysis> {
    let sources = extract_video_sources(html)?;

    if !sources.is_empty() {
        tracing::info!("Found {} video source(s) on {}", sources.len(), page_url);
        for raw in &sources {
            let kind = classify_source(raw, media_extensions);
            if !kind.is_usable() {
                tracing::warn!("Skipping blob URL (not downloadable): {}", raw);
                continue;
            }
            if kind == SourceKind::Unknown {
                tracing::info!("Unknown source type, treating as direct media: {}", raw);
            }
            let candidate = SourceCandidate {
                url: resolve_url(page_url, raw)?,
                kind,
            };
            return Ok(PageAnalysis::Source {
                candidate,
                title: extract_video_title(html)?,
            });
        }
    }

    // Pages whose only sources are blobs still fall through to the iframe
    match find_iframe_src(html)? {
        Some(src) => Ok(PageAnalysis::Iframe(resolve_url(page_url, &src)?)),
        None => Ok(PageAnalysis::Nothing),
    }
}

pub struct SourceDiscovery {
    fetcher: Arc<dyn HttpFetcher>,
    user_agent: String,
    config: DiscoveryConfig,
}

impl SourceDiscovery {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        user_agent: impl Into<String>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.into(),
            config,
        }
    }

    /// Fetches `url` and chases iframes until a usable source appears
    ///
    /// The whole chain runs under `overall_deadline_secs`.
    pub async fn discover(&self, url: &str) -> AppResult<DiscoveredSource> {
        let deadline = self.config.overall_deadline();
        match tokio::time::timeout(deadline, self.chase(url)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Page discovery exceeded {}s: {}", deadline.as_secs(), url);
                Err(AppError::Timeout(self.config.overall_deadline_secs))
            }
        }
    }

    async fn chase(&self, url: &str) -> AppResult<DiscoveredSource> {
        let mut page_url = url.to_string();
        let mut referer: Option<String> = None;
        let mut depth = 0;

        loop {
            tracing::info!("Fetching page: {}", page_url);
            let headers = RequestHeaders::new()
                .with_user_agent(&self.user_agent)
                .with_referer(referer.as_deref());
            let html = self.fetcher.get_text(&page_url, &headers).await?;

            match analyze_page(&html, &page_url, &self.config.media_extensions)? {
                PageAnalysis::Source { candidate, title } => {
                    tracing::info!("Selected {:?} source: {}", candidate.kind, candidate.url);
                    return Ok(DiscoveredSource {
                        candidate,
                        page_url,
                        referer,
                        title,
                    });
                }
                PageAnalysis::Iframe(src) if depth < self.config.max_iframe_depth => {
                    tracing::info!("Following iframe: {}", src);
                    depth += 1;
                    referer = Some(std::mem::replace(&mut page_url, src));
                }
                PageAnalysis::Iframe(src) => {
                    tracing::warn!(
                        "Not following iframe {} beyond depth {}",
                        src,
                        self.config.max_iframe_depth
                    );
                    return Err(AppError::NoMediaFound);
                }
                PageAnalysis::Nothing => return Err(AppError::NoMediaFound),
            }
        }
    }
}
