//! Last-resort acquisition through a general-purpose downloader (yt-dlp)

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::http_client::RequestHeaders;
use super::models::{AcquisitionMethod, AppError, AppResult, DownloadedFile};
use super::tools::run_tool;

#[async_trait]
pub trait GeneralDownloader: Send + Sync {
    /// Downloads `url` into `output_dir` at or below `max_height`
    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        max_height: u32,
        headers: &RequestHeaders,
    ) -> AppResult<DownloadedFile>;
}

pub struct YtDlpDownloader {
    binary: String,
}

impl YtDlpDownloader {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(
        url: &str,
        output_dir: &Path,
        max_height: u32,
        headers: &RequestHeaders,
    ) -> Vec<String> {
        let template = output_dir.join("%(title)s.%(ext)s");
        let mut args = vec![
            "--format".to_string(),
            format!("best[height<={max_height}]"),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ];
        for (name, value) in headers.iter() {
            args.push("--add-header".to_string());
            args.push(format!("{name}:{value}"));
        }
        args.push(url.to_string());
        args
    }
}

/// Final path printed by `--print after_move:filepath`
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

#[async_trait]
impl GeneralDownloader for YtDlpDownloader {
    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        max_height: u32,
        headers: &RequestHeaders,
    ) -> AppResult<DownloadedFile> {
        // A missing binary is reported before any download is attempted
        run_tool(&self.binary, ["--version"]).await?;

        tracing::info!("Running {} for {}", self.binary, url);
        let output = run_tool(
            &self.binary,
            Self::build_args(url, output_dir, max_height, headers),
        )
        .await?;

        let path = printed_path(&output.stdout).ok_or_else(|| AppError::ExternalTool {
            tool: self.binary.clone(),
            message: "finished without reporting an output file".to_string(),
        })?;
        let size_bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        Ok(DownloadedFile {
            path,
            size_bytes,
            method: AcquisitionMethod::ExternalDownloader,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let headers = RequestHeaders::new().with_referer(Some("https://page.example/"));
        let args = YtDlpDownloader::build_args(
            "https://youtu.be/abc",
            Path::new("/out"),
            720,
            &headers,
        );
        assert_eq!(args[1], "best[height<=720]");
        assert_eq!(args[3], "/out/%(title)s.%(ext)s");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"Referer:https://page.example/".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_printed_path() {
        let stdout = "[download] 100%\n/out/My Video.mp4\n\n";
        assert_eq!(printed_path(stdout), Some(PathBuf::from("/out/My Video.mp4")));
        assert_eq!(printed_path("  \n"), None);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let downloader = YtDlpDownloader::new("no-such-ytdlp-9931");
        let result = downloader
            .download("https://youtu.be/x", Path::new("."), 720, &RequestHeaders::new())
            .await;
        assert!(matches!(result, Err(AppError::ToolNotFound(_))));
    }
}
