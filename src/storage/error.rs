//! 저장소 전용 에러 타입: 마이그레이션/부트스트랩 실패를 종류별로 구분하여
//! 프런트엔드가 에러 코드로 분기할 수 있게 합니다.

use std::path::PathBuf;

use nooltools_updater_lib::UpdaterError;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to get user home directory")]
    HomeDirUnavailable,

    #[error("failed to parse storage config {}: {reason}", path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("target storage directory is the same as the current directory: {}", .0.display())]
    SameDirectory(PathBuf),

    #[error(
        "target storage directory cannot be inside current storage directory: {} is under {}",
        target.display(),
        current.display()
    )]
    TargetInsideSource { target: PathBuf, current: PathBuf },

    #[error("symlink is not supported for migration: {}", .0.display())]
    UnsupportedSymlink(PathBuf),

    #[error("failed to create conflict backup path for {}", .0.display())]
    BackupPathExhausted(PathBuf),

    #[error("data store at {} is unusable: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("failed to initialize github token config: {0}")]
    TokenConfig(#[source] UpdaterError),

    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 주 실패와 복구 중 발생한 실패를 모두 보존
    #[error("{primary}; {}", join_rollback(.rollback))]
    Rollback {
        primary: Box<StorageError>,
        rollback: Vec<StorageError>,
    },
}

fn join_rollback(errors: &[StorageError]) -> String {
    errors
        .iter()
        .map(|e| format!("additionally failed to recover: {}", e))
        .collect::<Vec<_>>()
        .join("; ")
}

impl StorageError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// 복구 실패가 없으면 주 에러를 그대로 반환
    pub fn with_rollback(primary: StorageError, rollback: Vec<StorageError>) -> Self {
        if rollback.is_empty() {
            primary
        } else {
            StorageError::Rollback {
                primary: Box::new(primary),
                rollback,
            }
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::HomeDirUnavailable => "HOME_DIR_UNAVAILABLE",
            Self::ConfigCorrupt { .. } => "CONFIG_CORRUPT",
            Self::SameDirectory(_) => "SAME_DIRECTORY",
            Self::TargetInsideSource { .. } => "TARGET_INSIDE_SOURCE",
            Self::UnsupportedSymlink(_) => "UNSUPPORTED_SYMLINK",
            Self::BackupPathExhausted(_) => "BACKUP_PATH_EXHAUSTED",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::TokenConfig(_) => "TOKEN_CONFIG",
            Self::Io { .. } => "IO_ERROR",
            Self::Rollback { primary, .. } => primary.error_code(),
        }
    }
}
