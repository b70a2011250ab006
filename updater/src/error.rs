//! 업데이터 에러 타입
//!
//! ## 에러 정책
//! - 릴리스 확인 실패(네트워크/응답/디코드)는 호출자에게 그대로 전달
//! - 에셋/다이제스트 문제는 에러가 아니라 `can_auto_update=false`로 강등
//! - 다운로드/무결성 실패는 업데이트 태스크를 중단하고 단일 `error` 이벤트로 보고
//! - 재시도 없음

use std::path::PathBuf;

/// 업데이터 작업 결과 별칭
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// 업데이터 에러 타입
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// 전송 계층 실패 (연결 실패, 타임아웃 등)
    #[error("failed to query release feed: {0}")]
    Network(String),

    /// 2xx 이외의 응답 (본문은 잘라서 포함)
    #[error("release api returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// 릴리스 JSON 디코드 실패
    #[error("failed to decode release response: {0}")]
    Decode(String),

    /// 저장소 URL이 올바르지 않음
    #[error("invalid repository url: {0}")]
    InvalidRepository(String),

    /// 태그/이름 모두 비어 있음
    #[error("latest release version is empty")]
    MissingVersion,

    /// 버전 문자열 파싱 실패
    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    /// 지원하는 에셋 없음
    #[error("no supported release asset found")]
    NoSupportedAsset,

    /// sha256 다이제스트가 없거나 형식 오류
    #[error("missing or invalid sha256 digest: {0}")]
    MissingOrInvalidDigest(String),

    /// 다운로드 중 실패
    #[error("download failed: {0}")]
    Download(String),

    /// 해시 불일치
    #[error("sha256 mismatch, expected {expected} but got {actual}")]
    Integrity { expected: String, actual: String },

    /// 교체 스크립트가 호출 프로세스 종료를 기다리다 시간 초과
    #[error("timed out waiting for process {pid} to exit")]
    ReplacementTimeout { pid: u32 },

    /// 교체 스크립트 작성/실행 실패 또는 복사 실패
    #[error("binary replacement failed: {0}")]
    ReplacementFailed(String),

    /// 토큰 설정 파일 오류
    #[error("invalid token config {path}: {reason}")]
    TokenConfig { path: PathBuf, reason: String },

    /// 업데이트 태스크가 이미 실행 중
    #[error("update task is already running")]
    AlreadyRunning,

    /// 자동 업데이트 사전 조건 불충족 (최신 버전, 다이제스트 없음 등)
    #[error("{0}")]
    NotApplicable(String),

    /// 호스트가 업데이트 경로를 제공하지 못함 (호스트 측 에러 코드 보존)
    #[error("failed to resolve update locations: {source}")]
    Environment {
        code: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 파일 시스템 오류
    #[error("file system error during {operation} on '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdaterError {
    /// IO 에러를 작업/경로 정보와 함께 감싸기
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// 호스트 에러를 에러 코드와 함께 감싸기
    pub fn environment(
        code: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        UpdaterError::Environment {
            code,
            source: source.into(),
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            UpdaterError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            UpdaterError::Upstream {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            UpdaterError::Network(err.to_string())
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidRepository(_) => "INVALID_REPOSITORY",
            Self::MissingVersion => "MISSING_VERSION",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::NoSupportedAsset => "NO_SUPPORTED_ASSET",
            Self::MissingOrInvalidDigest(_) => "MISSING_OR_INVALID_DIGEST",
            Self::Download(_) => "DOWNLOAD_ERROR",
            Self::Integrity { .. } => "INTEGRITY_ERROR",
            Self::ReplacementTimeout { .. } => "REPLACEMENT_TIMEOUT",
            Self::ReplacementFailed(_) => "REPLACEMENT_FAILED",
            Self::TokenConfig { .. } => "TOKEN_CONFIG",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::NotApplicable(_) => "NOT_APPLICABLE",
            Self::Environment { code, .. } => *code,
            Self::Io { .. } => "IO_ERROR",
        }
    }

    /// 사용자에게 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Please check your internet connection.".to_string(),
            Self::Upstream { status, .. } => match status {
                403 => "Access denied by the release server. This may be an API rate limit.".to_string(),
                404 => "No published release was found.".to_string(),
                s if *s >= 500 => "The release server is having trouble. Try again later.".to_string(),
                s => format!("Release server error ({})", s),
            },
            Self::Integrity { .. } => {
                "The downloaded file failed verification and was not installed.".to_string()
            }
            Self::AlreadyRunning => "An update is already in progress.".to_string(),
            other => other.to_string(),
        }
    }
}
