//! 直接文件下载
//!
//! 单个媒体文件通过 HTTP 流式写入下载目录，文件名取自 URL 最后一段。

use std::path::Path;
use std::sync::Arc;

use super::http_client::{HttpFetcher, RequestHeaders};
use super::models::{AcquisitionMethod, AppResult, DownloadedFile};
use super::progress_tracker::ProgressObserver;
use crate::utils::network::filename_from_url;
use crate::utils::{ensure_dir_exists, sanitize_filename};

pub const DEFAULT_DIRECT_FILENAME: &str = "downloaded_file";

/// URL 最后一段（去掉查询参数）清理后的文件名
pub fn direct_filename(url: &str) -> String {
    let name = filename_from_url(url)
        .or_else(|| {
            url.split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .map(str::to_string)
        })
        .map(|name| sanitize_filename(&name))
        .unwrap_or_default();

    if name.trim().is_empty() {
        DEFAULT_DIRECT_FILENAME.to_string()
    } else {
        name
    }
}

pub struct DirectDownloader {
    fetcher: Arc<dyn HttpFetcher>,
    user_agent: String,
}

impl DirectDownloader {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, user_agent: impl Into<String>) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.into(),
        }
    }

    /// 下载到 `output_dir`，失败时删除未完成的文件
    pub async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        referer: Option<&str>,
        observer: &dyn ProgressObserver,
    ) -> AppResult<DownloadedFile> {
        ensure_dir_exists(output_dir).await?;
        let dest = output_dir.join(direct_filename(url));
        let headers = RequestHeaders::new()
            .with_user_agent(&self.user_agent)
            .with_referer(referer);

        tracing::info!("开始下载: {} -> {}", url, dest.display());

        match self
            .fetcher
            .download_to_file(url, &headers, &dest, observer)
            .await
        {
            Ok(size_bytes) => {
                tracing::info!("下载完成: {} ({} 字节)", dest.display(), size_bytes);
                Ok(DownloadedFile {
                    path: dest,
                    size_bytes,
                    method: AcquisitionMethod::Direct,
                })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                tracing::error!("下载失败 {}: {}", url, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http_client::testing::FakeFetcher;
    use crate::core::models::AppError;
    use crate::core::progress_tracker::NoopProgress;
    use tempfile::tempdir;

    #[test]
    fn test_direct_filename() {
        assert_eq!(direct_filename("https://e.com/media/clip.mp4?sig=1"), "clip.mp4");
        assert_eq!(direct_filename("https://e.com/a/we|ird:name.mp3"), "weirdname.mp3");
        assert_eq!(direct_filename("https://e.com/"), DEFAULT_DIRECT_FILENAME);
        assert_eq!(direct_filename("not a url/file.wav"), "file.wav");
        assert_eq!(direct_filename("https://e.com/a/My%20Song.mp3"), "My Song.mp3");
        assert_eq!(direct_filename("https://e.com/a/x%3Ay%2Fz.mp4"), "xyz.mp4");
    }

    #[tokio::test]
    async fn test_download_with_referer() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.ok("https://e.com/v/clip.mp4", vec![9u8; 300]);

        let file = DirectDownloader::new(fetcher.clone(), "ua")
            .download(
                "https://e.com/v/clip.mp4",
                &dir.path().join("out"),
                Some("https://page.example/"),
                &NoopProgress,
            )
            .await
            .unwrap();

        assert_eq!(file.path, dir.path().join("out").join("clip.mp4"));
        assert_eq!(file.size_bytes, 300);
        assert_eq!(file.method, AcquisitionMethod::Direct);
        let headers = fetcher.headers_for("https://e.com/v/clip.mp4").unwrap();
        assert_eq!(headers.get("Referer"), Some("https://page.example/"));
        assert_eq!(headers.get("User-Agent"), Some("ua"));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.status("https://e.com/gone.mp4", 404);

        let result = DirectDownloader::new(fetcher, "ua")
            .download("https://e.com/gone.mp4", dir.path(), None, &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::Network { .. })));
        assert!(!dir.path().join("gone.mp4").exists());
    }
}
