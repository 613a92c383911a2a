//! Format conversion of downloaded files

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use super::models::{AppError, AppResult};
use super::transcoder::Transcoder;
use crate::utils::{ensure_dir_exists, sanitize_filename};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Mp3,
    Wav,
    Mp4,
    Mkv,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [Self::Mp3, Self::Wav, Self::Mp4, Self::Mkv];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, Self::Mp3 | Self::Wav)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == wanted)
            .ok_or_else(|| AppError::Config(format!("unsupported target format: {s}")))
    }
}

/// Every file under `root`, recursively, sorted by path
///
/// A missing root yields an empty list.
pub fn list_downloaded_files(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// `<convert_dir>/<stem>.<ext>` with the name sanitized
pub fn conversion_output_path(input: &Path, convert_dir: &Path, format: TargetFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    convert_dir.join(sanitize_filename(&format!("{stem}.{}", format.extension())))
}

/// Converts `input` into `convert_dir` as `format`
pub async fn convert_media(
    transcoder: &dyn Transcoder,
    input: &Path,
    convert_dir: &Path,
    format: TargetFormat,
) -> AppResult<PathBuf> {
    if !input.is_file() {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", input.display()),
        )));
    }

    ensure_dir_exists(convert_dir).await?;
    let output = conversion_output_path(input, convert_dir, format);

    tracing::info!(
        "Converting {} to {} -> {}",
        input.display(),
        format.extension().to_uppercase(),
        output.display()
    );
    transcoder.convert(input, &output).await?;
    tracing::info!("Conversion successful: {}", output.display());
    Ok(output)
}
