//! YouTube acquisition integration tests
//!
//! Drive [`YoutubeDownloader`] with fake metadata clients, HTTP endpoints
//! and tools to check the fallback ordering and the merge path.

#[cfg(test)]
mod tests {
    use super::super::config::YoutubeConfig;
    use super::super::external_downloader::testing::FakeGeneralDownloader;
    use super::super::http_client::testing::FakeFetcher;
    use super::super::models::{AcquisitionMethod, AppError};
    use super::super::progress_tracker::testing::RecordingProgress;
    use super::super::progress_tracker::NoopProgress;
    use super::super::transcoder::testing::FakeTranscoder;
    use super::super::youtube_downloader::testing::{format, FakeYoutubeClient};
    use super::super::youtube_downloader::{
        ClientVariant, YoutubeDownloader, YoutubeFormat, YoutubeVideoInfo,
    };
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=abc123";

    struct Setup {
        root: TempDir,
        client: Arc<FakeYoutubeClient>,
        fetcher: Arc<FakeFetcher>,
        transcoder: Arc<FakeTranscoder>,
        external: Arc<FakeGeneralDownloader>,
    }

    impl Setup {
        fn new(client: FakeYoutubeClient, external: FakeGeneralDownloader) -> Self {
            Self {
                root: tempdir().unwrap(),
                client: Arc::new(client),
                fetcher: Arc::new(FakeFetcher::new()),
                transcoder: Arc::new(FakeTranscoder::default()),
                external: Arc::new(external),
            }
        }

        fn out_dir(&self) -> PathBuf {
            self.root.path().join("download")
        }

        fn temp_dir(&self) -> PathBuf {
            self.root.path().join("temp")
        }

        fn downloader(&self) -> YoutubeDownloader {
            YoutubeDownloader::new(
                self.client.clone(),
                self.fetcher.clone(),
                self.transcoder.clone(),
                self.external.clone(),
                YoutubeConfig::default(),
                "test-agent",
                self.temp_dir(),
            )
        }
    }

    fn info(title: &str, formats: Vec<YoutubeFormat>) -> YoutubeVideoInfo {
        YoutubeVideoInfo {
            id: "abc123".to_string(),
            title: title.to_string(),
            duration: Some(61.0),
            formats,
        }
    }

    fn progressive_info() -> YoutubeVideoInfo {
        info(
            "My: Video?",
            vec![
                format("18", "mp4", Some(360), Some(96.0)),
                format("22", "mp4", Some(720), Some(128.0)),
            ],
        )
    }

    fn adaptive_info() -> YoutubeVideoInfo {
        info(
            "Adaptive",
            vec![
                format("137", "mp4", Some(1080), None),
                format("136", "mp4", Some(720), None),
                format("140", "m4a", None, Some(128.0)),
            ],
        )
    }

    #[tokio::test]
    async fn test_progressive_download() {
        let setup = Setup::new(
            FakeYoutubeClient {
                default: Some(progressive_info()),
                ..FakeYoutubeClient::default()
            },
            FakeGeneralDownloader::default(),
        );
        setup
            .fetcher
            .ok("https://media.example/22.mp4", vec![5u8; 4096]);
        let progress = RecordingProgress::default();

        let file = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &progress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::YoutubeProgressive);
        assert_eq!(file.path, setup.out_dir().join("My Video.mp4"));
        assert_eq!(file.size_bytes, 4096);
        assert!(!setup.fetcher.requested("https://media.example/18.mp4"));
        assert_eq!(*setup.client.calls.lock(), vec![ClientVariant::Default]);
        assert_eq!(setup.transcoder.called("merge"), 0);
        assert_eq!(progress.bytes.lock().last(), Some(&(4096, Some(4096))));
    }

    #[tokio::test]
    async fn test_alternate_client_after_default_fails() {
        let setup = Setup::new(
            FakeYoutubeClient {
                alternate: Some(progressive_info()),
                ..FakeYoutubeClient::default()
            },
            FakeGeneralDownloader::default(),
        );
        setup.fetcher.ok("https://media.example/22.mp4", vec![1u8; 10]);

        let file = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::YoutubeProgressive);
        assert_eq!(
            *setup.client.calls.lock(),
            vec![ClientVariant::Default, ClientVariant::Alternate]
        );
        assert_eq!(setup.external.call_count(), 0);
    }

    #[tokio::test]
    async fn test_general_downloader_after_both_clients_fail() {
        let setup = Setup::new(FakeYoutubeClient::default(), FakeGeneralDownloader::default());

        let file = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::ExternalDownloader);
        assert_eq!(setup.client.calls.lock().len(), 2);
        assert_eq!(
            setup.external.calls.lock().clone(),
            vec![(VIDEO_URL.to_string(), 720)]
        );
    }

    #[tokio::test]
    async fn test_general_downloader_failure_is_final() {
        let setup = Setup::new(FakeYoutubeClient::default(), FakeGeneralDownloader::failing());

        let result = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::ExternalTool { .. })));
        assert_eq!(setup.external.call_count(), 1);
    }

    #[tokio::test]
    async fn test_adaptive_download_merges_and_cleans_up() {
        let setup = Setup::new(
            FakeYoutubeClient {
                default: Some(adaptive_info()),
                ..FakeYoutubeClient::default()
            },
            FakeGeneralDownloader::default(),
        );
        setup.fetcher.ok("https://media.example/137.mp4", b"VIDEO".to_vec());
        setup.fetcher.ok("https://media.example/140.m4a", b"AUDIO".to_vec());

        let file = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::YoutubeAdaptive);
        assert_eq!(file.path, setup.out_dir().join("Adaptive.mp4"));
        assert_eq!(std::fs::read(&file.path).unwrap(), b"VIDEOAUDIO");
        assert_eq!(setup.transcoder.called("merge"), 1);
        assert!(!setup.fetcher.requested("https://media.example/136.mp4"));
        assert_eq!(std::fs::read_dir(setup.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stream_failure_falls_back_and_cleans_up() {
        let setup = Setup::new(
            FakeYoutubeClient {
                default: Some(adaptive_info()),
                ..FakeYoutubeClient::default()
            },
            FakeGeneralDownloader::default(),
        );
        setup.fetcher.ok("https://media.example/137.mp4", b"VIDEO".to_vec());
        setup.fetcher.status("https://media.example/140.m4a", 403);

        let file = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(file.method, AcquisitionMethod::ExternalDownloader);
        assert_eq!(setup.transcoder.called("merge"), 0);
        assert_eq!(std::fs::read_dir(setup.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_streams_does_not_fall_back() {
        let setup = Setup::new(
            FakeYoutubeClient {
                default: Some(info("Empty", vec![format("sb", "mhtml", None, None)])),
                ..FakeYoutubeClient::default()
            },
            FakeGeneralDownloader::default(),
        );

        let result = setup
            .downloader()
            .download(VIDEO_URL, &setup.out_dir(), &NoopProgress)
            .await;

        assert!(matches!(result, Err(AppError::NoStreamsAvailable)));
        assert_eq!(setup.external.call_count(), 0);
    }
}
