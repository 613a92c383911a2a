//! HLS 下载集成测试
//!
//! 用内存中的 HTTP、转码器和通用下载器替身驱动完整的策略链：
//! - 主播放列表选择最高带宽变体
//! - 部分片段失败时仍然成功合并
//! - 全部失败时调用兜底下载器
//! - 工作目录在任何结果下都被删除

#[cfg(test)]
mod tests {
    use super::super::config::HlsConfig;
    use super::super::external_downloader::testing::FakeGeneralDownloader;
    use super::super::http_client::testing::FakeFetcher;
    use super::super::http_client::RequestHeaders;
    use super::super::m3u8_downloader::{HlsDownloader, HlsRequest};
    use super::super::models::{AcquisitionMethod, AppError, AppResult};
    use super::super::progress_tracker::NoopProgress;
    use super::super::tools::ToolOutput;
    use super::super::transcoder::testing::FakeTranscoder;
    use super::super::transcoder::Transcoder;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const MASTER_URL: &str = "https://cdn.example/master.m3u8";
    const HIGH_URL: &str = "https://cdn.example/high.m3u8";

    struct Harness {
        root: TempDir,
        fetcher: Arc<FakeFetcher>,
        transcoder: Arc<FakeTranscoder>,
        external: Arc<FakeGeneralDownloader>,
    }

    impl Harness {
        fn new(external: FakeGeneralDownloader) -> Self {
            Self {
                root: tempdir().unwrap(),
                fetcher: Arc::new(FakeFetcher::new()),
                transcoder: Arc::new(FakeTranscoder {
                    fail_stream_copy: true,
                    ..FakeTranscoder::default()
                }),
                external: Arc::new(external),
            }
        }

        fn temp_root(&self) -> PathBuf {
            self.root.path().join("temp")
        }

        fn output_dir(&self) -> PathBuf {
            self.root.path().join("download")
        }

        fn downloader(&self, config: HlsConfig) -> HlsDownloader {
            HlsDownloader::new(
                self.fetcher.clone(),
                self.transcoder.clone(),
                self.external.clone(),
                config,
                "test-agent",
                self.temp_root(),
            )
        }

        fn request(&self, url: &str) -> HlsRequest {
            HlsRequest::new(url, self.output_dir())
        }

        fn leftover_workspaces(&self) -> usize {
            std::fs::read_dir(self.temp_root())
                .map(|entries| entries.count())
                .unwrap_or(0)
        }

        /// 主播放列表 + high 变体的媒体播放列表，返回各片段内容
        fn serve_playlist(&self, segments: usize, failing: &[usize]) -> Vec<Vec<u8>> {
            self.fetcher.ok(
                MASTER_URL,
                "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=500000\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=1500000\nhigh.m3u8\n",
            );
            let mut media = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
            let mut blobs = Vec::new();
            for i in 0..segments {
                media.push_str(&format!("#EXTINF:10.0,\nseg{i:03}.ts\n"));
                let url = format!("https://cdn.example/seg{i:03}.ts");
                if failing.contains(&i) {
                    self.fetcher.fail(&url, "connection reset");
                    blobs.push(Vec::new());
                } else {
                    let blob = format!("<segment {i}>").repeat(20).into_bytes();
                    self.fetcher.ok(&url, blob.clone());
                    blobs.push(blob);
                }
            }
            media.push_str("#EXT-X-ENDLIST\n");
            self.fetcher.ok(HIGH_URL, media);
            blobs
        }
    }

    #[tokio::test]
    async fn test_stream_copy_success_skips_pipeline() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        let transcoder = Arc::new(FakeTranscoder::default());
        let downloader = HlsDownloader::new(
            harness.fetcher.clone(),
            transcoder.clone(),
            harness.external.clone(),
            HlsConfig::default(),
            "test-agent",
            harness.temp_root(),
        );

        let file = downloader
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::HlsStreamCopy);
        assert_eq!(file.path, harness.output_dir().join("video_stream.mp4"));
        assert_eq!(transcoder.called("stream_copy"), 1);
        assert!(harness.fetcher.requests.lock().is_empty());
        assert_eq!(harness.external.call_count(), 0);
        assert_eq!(harness.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_partial_failures_assemble_in_order() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        let blobs = harness.serve_playlist(100, &[37, 52]);

        let request = harness
            .request(MASTER_URL)
            .with_title(Some("Lecture 7".to_string()));
        let file = harness
            .downloader(HlsConfig::default())
            .download(&request, &NoopProgress)
            .await
            .unwrap();

        let expected: Vec<u8> = blobs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 37 && *i != 52)
            .flat_map(|(_, blob)| blob.clone())
            .collect();

        assert_eq!(file.method, AcquisitionMethod::HlsBinaryMerge);
        assert_eq!(file.path, harness.output_dir().join("Lecture 7.mp4"));
        assert_eq!(file.size_bytes, expected.len() as u64);
        assert_eq!(std::fs::read(&file.path).unwrap(), expected);
        assert!(!harness.fetcher.requested("https://cdn.example/low.m3u8"));
        assert_eq!(harness.external.call_count(), 0);
        assert_eq!(harness.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_all_segments_failed_invokes_fallback() {
        let harness = Harness::new(FakeGeneralDownloader::failing());
        harness.serve_playlist(3, &[0, 1, 2]);

        let result = harness
            .downloader(HlsConfig::default())
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await;

        assert!(result.is_err());
        assert_eq!(harness.external.call_count(), 1);
        assert_eq!(harness.external.calls.lock()[0], (MASTER_URL.to_string(), 720));
        // 没有成功片段时不会进入合并阶段
        assert_eq!(harness.transcoder.called("concat"), 0);
        assert!(!harness.output_dir().join("video_stream.mp4").exists());
        assert_eq!(harness.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_fallback_success_after_pipeline_failure() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        harness.serve_playlist(3, &[0, 1, 2]);

        let file = harness
            .downloader(HlsConfig::default())
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::ExternalDownloader);
        assert_eq!(file.path, harness.output_dir().join("fallback.mp4"));
    }

    #[tokio::test]
    async fn test_fallback_disabled_surfaces_pipeline_error() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        harness.serve_playlist(3, &[0, 1, 2]);
        let config = HlsConfig {
            external_fallback: false,
            ..HlsConfig::default()
        };

        let result = harness
            .downloader(config)
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::AllSegmentsFailed(3))));
        assert_eq!(harness.external.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_playlist_is_pipeline_failure() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        harness.fetcher.ok(MASTER_URL, "#EXTM3U\n#EXT-X-ENDLIST\n");
        let config = HlsConfig {
            external_fallback: false,
            ..HlsConfig::default()
        };

        let result = harness
            .downloader(config)
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::NoSegmentsFound)));
        assert!(result.unwrap_err().is_pipeline_failure());
    }

    #[tokio::test]
    async fn test_referer_reaches_every_request() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        harness.serve_playlist(2, &[]);
        let request = harness
            .request(MASTER_URL)
            .with_referer(Some("https://page.example/watch".to_string()));

        harness
            .downloader(HlsConfig::default())
            .download(&request, &NoopProgress)
            .await
            .unwrap();

        for (url, headers) in harness.fetcher.requests.lock().iter() {
            assert_eq!(
                headers.get("Referer"),
                Some("https://page.example/watch"),
                "missing referer on {url}"
            );
            assert_eq!(headers.get("User-Agent"), Some("test-agent"));
        }
    }

    /// 流复制一直挂起
    struct HangingTranscoder;

    #[async_trait]
    impl Transcoder for HangingTranscoder {
        async fn stream_copy(
            &self,
            _input: &str,
            _output: &Path,
            _headers: &RequestHeaders,
        ) -> AppResult<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(AppError::Parse("unreachable".to_string()))
        }

        async fn concat_manifest(&self, _m: &Path, _o: &Path) -> AppResult<ToolOutput> {
            unreachable!()
        }

        async fn merge(&self, _v: &Path, _a: &Path, _o: &Path) -> AppResult<ToolOutput> {
            unreachable!()
        }

        async fn convert(&self, _i: &Path, _o: &Path) -> AppResult<ToolOutput> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_overall_deadline() {
        let harness = Harness::new(FakeGeneralDownloader::default());
        let config = HlsConfig {
            overall_deadline_secs: 1,
            ..HlsConfig::default()
        };
        let downloader = HlsDownloader::new(
            harness.fetcher.clone(),
            Arc::new(HangingTranscoder),
            harness.external.clone(),
            config,
            "test-agent",
            harness.temp_root(),
        );

        let result = downloader
            .download(&harness.request(MASTER_URL), &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::Timeout(1))));
        assert_eq!(harness.leftover_workspaces(), 0);
    }
}
