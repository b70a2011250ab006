//! 데이터 디렉터리 관리
//!
//! - 경로 해석: 기본 디렉터리(`~/.nooltools`) 또는 설정된 사용자 지정 디렉터리
//! - 설정 파일(`storage_config.json`)은 사용자 지정 여부와 무관하게 항상 기본 디렉터리에 둡니다
//! - 마이그레이션: 충돌 백업 후 복사, 설정 전환, 저장소 재오픈
//! - 부트스트랩: 시작 시 레이아웃 보장, 실패 시 기본 디렉터리로 폴백

pub mod bootstrap;
pub mod config;
pub mod copy;
pub mod error;
pub mod migrate;

pub use bootstrap::{bootstrap_data_dir, ensure_storage_layout, initialize_storage, StorageBootstrap};
pub use config::{ConfigStore, StorageConfig};
pub use error::{Result, StorageError};
pub use migrate::{MigrationPhase, MigrationResult, StorageMigrator};

use std::path::{Component, Path, PathBuf};

pub const DEFAULT_DATA_DIR_NAME: &str = ".nooltools";
pub const CONFIG_FILE_NAME: &str = "storage_config.json";
pub const MIGRATED_DATA_DIR_NAME: &str = "nooltools_data";
pub const DATABASE_FILE_NAME: &str = "nooltools.db";
pub const MARKDOWN_DIR_NAME: &str = "markdown";
pub const UPDATES_DIR_NAME: &str = "updates";

/// 홈 디렉터리를 기준으로 한 경로 해석기
#[derive(Debug, Clone)]
pub struct DataPaths {
    home: PathBuf,
}

impl DataPaths {
    /// 환경 변수에서 홈 디렉터리 조회 (`HOME`, 윈도우는 `USERPROFILE` 우선)
    pub fn from_env() -> Result<Self> {
        let vars: &[&str] = if cfg!(target_os = "windows") {
            &["USERPROFILE", "HOME"]
        } else {
            &["HOME"]
        };
        vars.iter()
            .filter_map(|name| std::env::var_os(name))
            .find(|value| !value.is_empty())
            .map(|home| Self::with_home(PathBuf::from(home)))
            .ok_or(StorageError::HomeDirUnavailable)
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn default_data_dir(&self) -> PathBuf {
        clean_path(&self.home.join(DEFAULT_DATA_DIR_NAME))
    }

    pub fn config_path(&self) -> PathBuf {
        self.default_data_dir().join(CONFIG_FILE_NAME)
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.config_path())
    }

    /// 사용자 지정 디렉터리가 설정되어 있으면 그 경로, 아니면 기본 디렉터리
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        let cfg = self.config_store().load()?;
        Ok(cfg
            .custom_data_dir
            .unwrap_or_else(|| self.default_data_dir()))
    }
}

/// 마이그레이션 대상 = `<parent>/nooltools_data`
pub fn build_target_data_dir(parent_dir: &Path) -> Result<PathBuf> {
    let parent = normalize_path(parent_dir)?;
    Ok(parent.join(MIGRATED_DATA_DIR_NAME))
}

/// 공백 제거, 빈 값 거부, 절대 경로화, 정리
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidPath("path is empty".to_string()));
    }

    let candidate = if trimmed.len() == raw.len() {
        path.to_path_buf()
    } else {
        PathBuf::from(trimmed)
    };
    let absolute = if candidate.is_absolute() {
        candidate
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            StorageError::InvalidPath(format!("failed to get absolute path: {}", e))
        })?;
        cwd.join(candidate)
    };
    Ok(clean_path(&absolute))
}

/// 어휘적 정리: `.` 제거, `..` 상쇄, 끝 구분자 제거
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn comparable(path: &Path) -> PathBuf {
    let cleaned = clean_path(path);
    if cfg!(target_os = "windows") {
        PathBuf::from(cleaned.to_string_lossy().to_lowercase())
    } else {
        cleaned
    }
}

/// 정리 후 비교 (윈도우는 대소문자 무시)
pub fn paths_equal(left: &Path, right: &Path) -> bool {
    comparable(left) == comparable(right)
}

/// `path`가 `parent` 아래에 엄격히 포함되는지 (같은 경로는 false)
pub fn is_sub_path(path: &Path, parent: &Path) -> bool {
    let path = comparable(path);
    let parent = comparable(parent);
    match path.strip_prefix(&parent) {
        Ok(rel) => !rel.as_os_str().is_empty(),
        Err(_) => false,
    }
}
