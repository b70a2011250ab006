//! # nooltools 업데이터 라이브러리
//!
//! 원격 릴리스 피드를 확인하고, 허용된 경우 새 빌드를 다운로드/검증하여
//! 외부 교체 스크립트에 설치를 넘깁니다.
//!
//! ## 파이프라인
//! - **확인(github.rs)**: `releases/latest` 조회 (짧은 타임아웃, 재시도 없음)
//! - **판정(decision.rs)**: 버전 비교, 에셋 선택, 다이제스트 검증
//! - **다운로드(download.rs)**: 스테이징 파일로 스트리밍, 진행률 보고
//! - **검증(verify.rs)**: SHA-256 재계산 후 비교 (필수)
//! - **교체(installer.rs)**: 플랫폼 스크립트에 핸드오프 후 프로세스 종료
//! - **태스크(worker.rs)**: 단일 슬롯 백그라운드 실행
//!
//! ## 릴리스 에셋
//! 에셋에는 `digest` 필드(`"sha256:<hex>"`)가 있어야 자동 업데이트가 가능합니다.
//! 없으면 업데이트 알림만 하고 수동 다운로드를 안내합니다.

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod decision;
pub mod download;
pub mod error;
pub mod github;
pub mod installer;
pub mod progress;
pub mod token;
pub mod verify;
pub mod version;
pub mod worker;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use decision::{UpdateCheckResult, UpdatePreparation};
pub use error::{Result, UpdaterError};
pub use github::{GitHubAsset, GitHubClient, GitHubRelease};
pub use installer::{Installer, PlatformInstaller, ReplacementRequest};
pub use progress::{
    follow_until_terminal, BroadcastSink, NullSink, ProgressEvent, ProgressSink, UpdateStage,
};
pub use token::TOKEN_CONFIG_FILE_NAME;
pub use worker::{AutoUpdater, UpdateEnvironment, UpdateLocations};

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ══════════════════════════════════════════════════════
// 설정
// ══════════════════════════════════════════════════════

/// 비교 기준이 되는 현재 애플리케이션 버전
pub const APP_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// 릴리스를 게시하는 저장소
pub const DEFAULT_REPO_URL: &str = "https://github.com/HEUdbh/nooltools";

/// 현재 릴리스 에셋 이름
pub const RELEASE_ASSET_PRIMARY_NAME: &str = "nooltools.exe";
/// 이름 변경 이전 릴리스의 에셋 이름
pub const RELEASE_ASSET_LEGACY_NAME: &str = "noltools.exe";

/// 업데이트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// GitHub 저장소 URL (owner/repo 파싱용)
    pub repo_url: String,
    /// 현재 버전
    pub current_version: String,
    /// 허용 에셋 이름 (앞쪽이 우선)
    pub asset_names: Vec<String>,
    /// 메타데이터 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 교체 스크립트가 현재 프로세스 종료를 기다리는 최대 시간 (초)
    pub exit_wait_timeout_secs: u64,
    /// `restarting` 이벤트 후 종료까지 대기 (밀리초)
    pub restart_delay_ms: u64,
    /// API 베이스 URL 오버라이드 (테스트용 로컬 서버 지원,
    /// 예: "http://127.0.0.1:9876" 처럼 GitHub API 대신 사용할 URL 설정)
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            current_version: APP_VERSION.to_string(),
            asset_names: vec![
                RELEASE_ASSET_PRIMARY_NAME.to_string(),
                RELEASE_ASSET_LEGACY_NAME.to_string(),
            ],
            request_timeout_secs: 8,
            exit_wait_timeout_secs: 60,
            restart_delay_ms: 250,
            api_base_url: None,
        }
    }
}

impl UpdateConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn exit_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_wait_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
