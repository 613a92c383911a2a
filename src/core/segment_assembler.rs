//! 片段合并
//!
//! 先按 `index` 顺序二进制拼接；仅当拼接出现 IO 错误时，改用 concat 清单交给转码器合并。

use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::models::{AcquisitionMethod, AppError, AppResult, DownloadedFile};
use super::segment_fetcher::FetchBatch;
use super::transcoder::Transcoder;
use super::workspace::DownloadWorkspace;

const MANIFEST_NAME: &str = "filelist.txt";

pub struct SegmentAssembler {
    transcoder: Arc<dyn Transcoder>,
}

impl SegmentAssembler {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// 合并成功的片段；缺失的 `index` 直接跳过
    pub async fn assemble(
        &self,
        batch: &FetchBatch,
        workspace: &DownloadWorkspace,
        output: &Path,
    ) -> AppResult<DownloadedFile> {
        let binary_error = match binary_concat(batch, output).await {
            Ok(size_bytes) => {
                tracing::info!("二进制拼接完成: {} ({} 字节)", output.display(), size_bytes);
                return Ok(DownloadedFile {
                    path: output.to_path_buf(),
                    size_bytes,
                    method: AcquisitionMethod::HlsBinaryMerge,
                });
            }
            Err(e) => e,
        };

        tracing::warn!("二进制拼接失败，改用 concat 清单: {}", binary_error);
        // 清理半成品，忽略错误
        let _ = tokio::fs::remove_file(output).await;

        match self
            .demux_concat(batch, &workspace.file(MANIFEST_NAME), output)
            .await
        {
            Ok(size_bytes) => Ok(DownloadedFile {
                path: output.to_path_buf(),
                size_bytes,
                method: AcquisitionMethod::HlsDemuxConcat,
            }),
            Err(demux_error) => {
                let _ = tokio::fs::remove_file(output).await;
                Err(AppError::AssemblyFailed(format!(
                    "binary concatenation: {binary_error}; demux concatenation: {demux_error}"
                )))
            }
        }
    }

    /// 写出 concat 清单并调用转码器，返回输出文件大小
    pub async fn demux_concat(
        &self,
        batch: &FetchBatch,
        manifest: &Path,
        output: &Path,
    ) -> AppResult<u64> {
        tokio::fs::write(manifest, concat_manifest(batch)).await?;
        self.transcoder.concat_manifest(manifest, output).await?;
        Ok(tokio::fs::metadata(output).await?.len())
    }
}

/// 按顺序逐字节追加到输出文件，返回写入的字节数
pub async fn binary_concat(batch: &FetchBatch, output: &Path) -> AppResult<u64> {
    let mut file = File::create(output).await?;
    let mut written = 0u64;

    for segment in batch.successes() {
        let mut input = File::open(&segment.path).await?;
        written += tokio::io::copy(&mut input, &mut file).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// concat 分离器清单：每行 `file '<path>'`
fn concat_manifest(batch: &FetchBatch) -> String {
    batch
        .successes()
        .map(|segment| {
            let path = segment.path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{path}'\n")
        })
        .collect()
}
