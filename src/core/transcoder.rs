//! Transcoder seam
//!
//! Stream copy, concatenation, merge and format conversion are delegated to
//! an external tool behind [`Transcoder`]. [`FfmpegTranscoder`] drives ffmpeg.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;

use super::http_client::RequestHeaders;
use super::models::AppResult;
use super::tools::{run_tool, ToolOutput};

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Repackages `input` (path or URL) into `output` without re-encoding
    async fn stream_copy(
        &self,
        input: &str,
        output: &Path,
        headers: &RequestHeaders,
    ) -> AppResult<ToolOutput>;

    /// Concatenates the files listed in a concat-demuxer manifest
    async fn concat_manifest(&self, manifest: &Path, output: &Path) -> AppResult<ToolOutput>;

    /// Muxes a video-only and an audio-only file into one container
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> AppResult<ToolOutput>;

    /// Converts `input` to the container implied by `output`'s extension
    async fn convert(&self, input: &Path, output: &Path) -> AppResult<ToolOutput>;
}

pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for a header-aware stream copy of a remote manifest
    fn stream_copy_args(input: &str, output: &Path, headers: &RequestHeaders) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if headers.get("Referer").is_some() {
            args.push("-headers".into());
            args.push(headers.to_ffmpeg_header_block().into());
        } else if let Some(user_agent) = headers.get("User-Agent") {
            args.push("-user_agent".into());
            args.push(user_agent.into());
        }
        args.extend(["-i".into(), input.into()]);
        args.extend(["-c".into(), "copy".into(), "-y".into()]);
        args.push(output.into());
        args
    }

    fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output.into(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn stream_copy(
        &self,
        input: &str,
        output: &Path,
        headers: &RequestHeaders,
    ) -> AppResult<ToolOutput> {
        run_tool(&self.binary, Self::stream_copy_args(input, output, headers)).await
    }

    async fn concat_manifest(&self, manifest: &Path, output: &Path) -> AppResult<ToolOutput> {
        run_tool(&self.binary, Self::concat_args(manifest, output)).await
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> AppResult<ToolOutput> {
        let args: Vec<OsString> = vec![
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output.into(),
        ];
        run_tool(&self.binary, args).await
    }

    async fn convert(&self, input: &Path, output: &Path) -> AppResult<ToolOutput> {
        let args: Vec<OsString> = vec![
            "-i".into(),
            input.into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            output.into(),
        ];
        run_tool(&self.binary, args).await
    }
}
