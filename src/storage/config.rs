//! `storage_config.json` 읽기/쓰기
//!
//! 읽기-수정-쓰기 연산은 프로세스 간 원자성이 없으므로 단일 인스턴스 실행을 전제로 합니다.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use super::error::{Result, StorageError};
use super::normalize_path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 사용자 지정 데이터 디렉터리 (항상 정규화된 절대 경로)
    #[serde(default, deserialize_with = "blank_as_none")]
    pub custom_data_dir: Option<PathBuf>,
}

fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from))
}

impl StorageConfig {
    pub fn is_custom(&self) -> bool {
        self.custom_data_dir.is_some()
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일이 없거나 비어 있으면 기본값, JSON 파싱 실패는 `ConfigCorrupt`
    pub fn load(&self) -> Result<StorageConfig> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StorageConfig::default()),
            Err(e) => return Err(StorageError::io("read storage config", &self.path, e)),
        };
        if data.trim().is_empty() {
            return Ok(StorageConfig::default());
        }

        let mut cfg: StorageConfig =
            serde_json::from_str(&data).map_err(|e| StorageError::ConfigCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if let Some(dir) = cfg.custom_data_dir.take() {
            cfg.custom_data_dir = Some(normalize_path(&dir)?);
        }
        Ok(cfg)
    }

    /// 사용자 지정 디렉터리를 정규화하여 저장 (소유자 전용 권한)
    pub fn save(&self, cfg: &StorageConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StorageError::io("create default data directory", dir, e))?;
        }

        let normalized = StorageConfig {
            custom_data_dir: cfg
                .custom_data_dir
                .as_deref()
                .map(normalize_path)
                .transpose()?,
        };
        let mut data = serde_json::to_string_pretty(&normalized).map_err(|e| {
            StorageError::ConfigCorrupt {
                path: self.path.clone(),
                reason: format!("failed to encode storage config: {}", e),
            }
        })?;
        data.push('\n');

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| StorageError::io("write storage config", &self.path, e))?;
        std::io::Write::write_all(&mut file, data.as_bytes())
            .map_err(|e| StorageError::io("write storage config", &self.path, e))?;

        tracing::debug!("[Storage] Saved config to {}", self.path.display());
        Ok(())
    }

    pub fn set_custom_data_dir(&self, data_dir: &Path) -> Result<()> {
        let normalized = normalize_path(data_dir)?;
        let mut cfg = self.load()?;
        cfg.custom_data_dir = Some(normalized);
        self.save(&cfg)
    }

    pub fn clear_custom_data_dir(&self) -> Result<()> {
        let mut cfg = self.load()?;
        cfg.custom_data_dir = None;
        self.save(&cfg)
    }
}
