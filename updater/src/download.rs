//! 업데이트 에셋 스트리밍 다운로드
//!
//! 대용량 바이너리이므로 전체 타임아웃을 두지 않고, 사후 무결성 검증으로 제한합니다.
//! 임시 파일(`<dest>.download`)에 기록한 뒤 성공 시에만 대상 경로로 rename 합니다.
//! 실패 시 임시 파일은 조사용으로 남기고 대상 경로는 건드리지 않습니다.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, UpdaterError};
use crate::github::{read_error_body, MAX_ERROR_BODY_BYTES};
use crate::progress::{ProgressEvent, ProgressSink, UpdateStage};

/// 다운로드 단계가 차지하는 전체 진행률 구간
pub const DOWNLOAD_PERCENT_START: i64 = 5;
pub const DOWNLOAD_PERCENT_END: i64 = 85;
/// 전체 크기를 알 수 없을 때 보고하는 진행률
pub const DOWNLOAD_PERCENT_UNKNOWN: i64 = 50;

/// 다운로드 진행률 계산 (5~85 구간으로 고정)
pub fn download_percent(downloaded: u64, total: u64) -> i64 {
    if total == 0 {
        return DOWNLOAD_PERCENT_UNKNOWN;
    }
    let span = (DOWNLOAD_PERCENT_END - DOWNLOAD_PERCENT_START) as f64;
    let percent = DOWNLOAD_PERCENT_START + (downloaded as f64 / total as f64 * span) as i64;
    percent.clamp(DOWNLOAD_PERCENT_START, DOWNLOAD_PERCENT_END)
}

/// 다운로드 중 사용하는 임시 파일 경로
pub fn temp_download_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".download");
    PathBuf::from(name)
}

/// 버전 문자열을 파일명에 안전한 형태로 변환
pub fn sanitize_version_for_filename(version: &str) -> String {
    let mapped: String = version
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 에셋 다운로더
pub struct Downloader {
    http: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        // 전체 타임아웃 없음
        let http = reqwest::Client::builder()
            .user_agent("nooltools-auto-updater")
            .build()
            .map_err(|e| UpdaterError::Download(format!("failed to create http client: {}", e)))?;
        Ok(Self { http })
    }

    /// `url`을 `dest`로 스트리밍 다운로드
    ///
    /// 진행률 분모는 `max(content-length, expected_size)` 입니다.
    pub async fn stream(
        &self,
        url: &str,
        token: &str,
        dest: &Path,
        expected_size: u64,
        sink: &dyn ProgressSink,
    ) -> Result<u64> {
        sink.emit(ProgressEvent::new(
            UpdateStage::Downloading,
            DOWNLOAD_PERCENT_START,
            "Starting download",
        ));
        tracing::info!("[Download] {} -> {}", url, dest.display());

        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/octet-stream");
        if !token.trim().is_empty() {
            request = request.bearer_auth(token.trim());
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| UpdaterError::Download(format!("failed to download release asset: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(&mut response, MAX_ERROR_BODY_BYTES).await;
            return Err(UpdaterError::Download(format!(
                "asset download failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let total = response.content_length().unwrap_or(0).max(expected_size);

        let temp_path = temp_download_path(dest);
        match tokio::fs::remove_file(&temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(UpdaterError::io("cleanup temp download", &temp_path, e)),
        }
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| UpdaterError::io("create temp download", &temp_path, e))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| UpdaterError::Download(format!("failed during update download: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::io("write update package", &temp_path, e))?;
            downloaded += chunk.len() as u64;
            sink.emit(
                ProgressEvent::new(
                    UpdateStage::Downloading,
                    download_percent(downloaded, total),
                    "Downloading update package",
                )
                .with_detail(format!("{}/{} bytes", downloaded, total)),
            );
        }

        file.flush()
            .await
            .map_err(|e| UpdaterError::io("finalize downloaded file", &temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| UpdaterError::io("finalize downloaded file", &temp_path, e))?;
        drop(file);

        // 이전 pending 파일 제거 후 rename
        match tokio::fs::remove_file(dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(UpdaterError::io("cleanup previous pending file", dest, e)),
        }
        tokio::fs::rename(&temp_path, dest)
            .await
            .map_err(|e| UpdaterError::io("finalize pending update file", dest, e))?;

        sink.emit(
            ProgressEvent::new(UpdateStage::Downloading, DOWNLOAD_PERCENT_END, "Download complete")
                .with_detail(format!("{} bytes downloaded", downloaded)),
        );
        tracing::info!("[Download] Completed {} ({} bytes)", dest.display(), downloaded);
        Ok(downloaded)
    }
}
