//! Network utilities and helpers

use crate::core::models::{AppError, AppResult};
use url::Url;

/// Browser user agent sent with page, playlist and segment requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Resolves `reference` against `base`
///
/// Absolute URLs are returned unchanged, protocol-relative ones (`//host/x`)
/// are upgraded to https.
pub fn resolve_url(base: &str, reference: &str) -> AppResult<String> {
    let reference = reference.trim();

    if let Some(rest) = reference.strip_prefix("//") {
        return Ok(format!("https://{rest}"));
    }

    if let Ok(absolute) = Url::parse(reference) {
        return Ok(absolute.to_string());
    }

    let base_url =
        Url::parse(base).map_err(|e| AppError::Parse(format!("Invalid base URL {base}: {e}")))?;

    let resolved = base_url
        .join(reference)
        .map_err(|e| AppError::Parse(format!("Failed to resolve {reference}: {e}")))?;

    Ok(resolved.to_string())
}

/// Whether the URL points at YouTube
pub fn is_youtube_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// Path component of a URL without query or fragment, lower-cased
fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    }
}

/// Whether the URL path ends in one of `extensions`
pub fn has_media_extension(url: &str, extensions: &[String]) -> bool {
    let path = url_path(url);
    extensions
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext.to_ascii_lowercase())))
}

/// Whether the URL path names an HLS manifest
pub fn is_m3u8_url(url: &str) -> bool {
    url_path(url).ends_with(".m3u8")
}

/// Last path segment of the URL, percent-decoded, used as a download filename
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    match urlencoding::decode(segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(segment.to_string()),
    }
}
