//! Core data models for the media fetcher

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a finished file was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMethod {
    Direct,

    HlsStreamCopy,

    HlsBinaryMerge,

    HlsDemuxConcat,

    YoutubeProgressive,

    YoutubeAdaptive,

    ExternalDownloader,
}

impl fmt::Display for AcquisitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::HlsStreamCopy => "hls stream copy",
            Self::HlsBinaryMerge => "hls binary merge",
            Self::HlsDemuxConcat => "hls demux concat",
            Self::YoutubeProgressive => "youtube progressive",
            Self::YoutubeAdaptive => "youtube adaptive",
            Self::ExternalDownloader => "external downloader",
        };
        f.write_str(name)
    }
}

/// A file that landed on disk at the end of an acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub path: PathBuf,

    pub size_bytes: u64,

    pub method: AcquisitionMethod,
}

/// Classification of a media URL found in a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    DirectMedia,

    HlsManifest,

    BlobUnsupported,

    Unknown,
}

impl SourceKind {
    /// Whether a downloader may be pointed at a candidate of this kind
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::BlobUnsupported)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,

    pub kind: SourceKind,
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no segments found in playlist")]
    NoSegmentsFound,

    #[error("all {0} segments failed to download")]
    AllSegmentsFailed(usize),

    #[error("segment assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("no video sources or iframes found on the page")]
    NoMediaFound,

    #[error("no downloadable streams available")]
    NoStreamsAvailable,

    #[error("{0} not found; install it and make sure it is on PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("operation exceeded its deadline of {0}s")]
    Timeout(u64),

    #[error("YouTube error: {0}")]
    Youtube(String),
}

impl AppError {
    /// Failures of the manual HLS pipeline that hand control to the next strategy
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            Self::NoSegmentsFound | Self::AllSegmentsFailed(_) | Self::AssemblyFailed(_)
        )
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
