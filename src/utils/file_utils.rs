//! File system utilities

use crate::core::models::AppResult;
use std::path::Path;

/// Characters rejected by common filesystems
const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Ensure directory exists
pub async fn ensure_dir_exists(path: &Path) -> AppResult<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Size of a file in bytes
pub async fn file_size(path: &Path) -> AppResult<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// Strips characters that are invalid in filenames
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect()
}

/// Sanitized `title` with `ext` appended unless already present
pub fn output_filename(title: Option<&str>, ext: &str, fallback: &str) -> String {
    let name = title.map(sanitize_filename).unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        return fallback.to_string();
    }

    let suffix = format!(".{ext}");
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
