//! HTTP 访问层
//!
//! 所有网络请求都经过 [`HttpFetcher`]，便于在测试中替换为内存实现。

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::models::{AppError, AppResult};
use super::progress_tracker::ProgressObserver;

/// 有序的请求头列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置或替换同名请求头
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.insert("User-Agent", user_agent);
        self
    }

    /// 仅在提供了 referer 时添加
    pub fn with_referer(mut self, referer: Option<&str>) -> Self {
        if let Some(referer) = referer {
            self.insert("Referer", referer);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ffmpeg `-headers` 参数格式，每行以 CRLF 结尾
    pub fn to_ffmpeg_header_block(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| format!("{name}: {value}\r\n"))
            .collect()
    }
}

/// 一次 GET 的结果
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_length: Option<u64>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// 发送 GET 请求；非 2xx 状态不视为错误，由调用方判断
    async fn get(
        &self,
        url: &str,
        headers: &RequestHeaders,
        timeout: Option<Duration>,
    ) -> AppResult<HttpResponse>;

    /// 获取文本内容，非 2xx 状态返回 `Network` 错误
    async fn get_text(&self, url: &str, headers: &RequestHeaders) -> AppResult<String> {
        let response = self.get(url, headers, None).await?;
        if !response.is_success() {
            return Err(AppError::Network {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// 下载到文件并返回写入的字节数
    async fn download_to_file(
        &self,
        url: &str,
        headers: &RequestHeaders,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<u64> {
        let response = self.get(url, headers, None).await?;
        if !response.is_success() {
            return Err(AppError::Network {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }
        tokio::fs::write(dest, &response.body).await?;
        let written = response.body.len() as u64;
        observer.on_progress(written, response.content_length.or(Some(written)));
        observer.on_finish();
        Ok(written)
    }
}

/// 基于 reqwest 的实现
///
/// `get` 整体受请求超时限制；`download_to_file` 的超时作用于建立响应和
/// 每个数据块之间的空闲时间，大文件不会因总时长被中断。
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    request_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            request_timeout: timeout,
        })
    }

    fn request(&self, url: &str, headers: &RequestHeaders) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }
        request
    }
}

fn idle_timeout_error(url: &str, timeout: Duration) -> AppError {
    AppError::Network {
        url: url.to_string(),
        reason: format!("timed out: no data for {}s", timeout.as_secs()),
    }
}

fn network_error(url: &str, e: reqwest::Error) -> AppError {
    let reason = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    AppError::Network {
        url: url.to_string(),
        reason,
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(
        &self,
        url: &str,
        headers: &RequestHeaders,
        timeout: Option<Duration>,
    ) -> AppResult<HttpResponse> {
        let response = self
            .request(url, headers)
            .timeout(timeout.unwrap_or(self.request_timeout))
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response.bytes().await.map_err(|e| network_error(url, e))?;

        Ok(HttpResponse {
            status,
            body,
            content_length,
        })
    }

    async fn download_to_file(
        &self,
        url: &str,
        headers: &RequestHeaders,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> AppResult<u64> {
        let idle = self.request_timeout;
        let response = tokio::time::timeout(idle, self.request(url, headers).send())
            .await
            .map_err(|_| idle_timeout_error(url, idle))?
            .map_err(|e| network_error(url, e))?;

        if !response.status().is_success() {
            return Err(AppError::Network {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        let total = response.content_length();
        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| idle_timeout_error(url, idle))?
        {
            let chunk = chunk.map_err(|e| network_error(url, e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            observer.on_progress(downloaded, total);
        }

        // 确保文件数据写入磁盘
        file.flush().await?;
        file.sync_all().await?;
        observer.on_finish();

        tracing::debug!("下载完成: {} ({} 字节)", dest.display(), downloaded);
        Ok(downloaded)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// 内存中的 HTTP 端点表
    #[derive(Default)]
    pub struct FakeFetcher {
        routes: Mutex<HashMap<String, Result<HttpResponse, String>>>,
        pub requests: Mutex<Vec<(String, RequestHeaders)>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(&self, url: &str, body: impl Into<Bytes>) {
            let body = body.into();
            let content_length = Some(body.len() as u64);
            self.routes.lock().insert(
                url.to_string(),
                Ok(HttpResponse {
                    status: 200,
                    body,
                    content_length,
                }),
            );
        }

        pub fn status(&self, url: &str, status: u16) {
            self.routes.lock().insert(
                url.to_string(),
                Ok(HttpResponse {
                    status,
                    body: Bytes::new(),
                    content_length: Some(0),
                }),
            );
        }

        pub fn fail(&self, url: &str, reason: &str) {
            self.routes
                .lock()
                .insert(url.to_string(), Err(reason.to_string()));
        }

        pub fn requested(&self, url: &str) -> bool {
            self.requests.lock().iter().any(|(u, _)| u == url)
        }

        pub fn headers_for(&self, url: &str) -> Option<RequestHeaders> {
            self.requests
                .lock()
                .iter()
                .find(|(u, _)| u == url)
                .map(|(_, h)| h.clone())
        }
    }

    #[async_trait]
    impl HttpFetcher for FakeFetcher {
        async fn get(
            &self,
            url: &str,
            headers: &RequestHeaders,
            _timeout: Option<Duration>,
        ) -> AppResult<HttpResponse> {
            self.requests.lock().push((url.to_string(), headers.clone()));
            let route = self.routes.lock().get(url).cloned();
            match route {
                Some(Ok(response)) => Ok(response),
                Some(Err(reason)) => Err(AppError::Network {
                    url: url.to_string(),
                    reason,
                }),
                None => Ok(HttpResponse {
                    status: 404,
                    body: Bytes::new(),
                    content_length: None,
                }),
            }
        }
    }
}
