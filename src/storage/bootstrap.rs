//! 시작 시 데이터 디렉터리 초기화
//!
//! 사용자 지정 디렉터리를 사용할 수 없으면 설정을 지우고 기본 디렉터리로 폴백하며,
//! 시작 자체는 실패시키지 않고 안내 문구를 남깁니다.

use std::path::{Path, PathBuf};

use nooltools_updater_lib::token::read_or_create_token_config;
use nooltools_updater_lib::TOKEN_CONFIG_FILE_NAME;

use super::error::{Result, StorageError};
use super::{normalize_path, DataPaths, DATABASE_FILE_NAME, MARKDOWN_DIR_NAME, UPDATES_DIR_NAME};
use crate::store::{DataStore, StoreOpener};

/// 부트스트랩 결과
pub struct StorageBootstrap {
    pub data_dir: PathBuf,
    pub store: Box<dyn DataStore>,
    /// 폴백이 일어났을 때만 채워짐
    pub startup_notice: Option<String>,
}

/// 데이터 디렉터리, `markdown/`, `updates/`, 토큰 파일 생성
pub fn ensure_storage_layout(data_dir: &Path) -> Result<()> {
    for dir in [
        data_dir.to_path_buf(),
        data_dir.join(MARKDOWN_DIR_NAME),
        data_dir.join(UPDATES_DIR_NAME),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io("create directory", &dir, e))?;
    }

    read_or_create_token_config(&data_dir.join(TOKEN_CONFIG_FILE_NAME))
        .map_err(StorageError::TokenConfig)?;
    Ok(())
}

/// 레이아웃을 보장하고 저장소를 열어 무결성까지 확인
pub fn bootstrap_data_dir(data_dir: &Path, opener: &dyn StoreOpener) -> Result<Box<dyn DataStore>> {
    let data_dir = normalize_path(data_dir)?;

    let db_path = data_dir.join(DATABASE_FILE_NAME);
    match std::fs::metadata(&db_path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("[Storage] Data store missing, initializing: {}", db_path.display());
        }
        Err(e) => return Err(StorageError::io("inspect data store", &db_path, e)),
    }

    ensure_storage_layout(&data_dir)?;

    let mut store = opener.open(&data_dir)?;
    let healthy = match store.check_integrity() {
        Ok(healthy) => healthy,
        Err(e) => {
            let _ = store.close();
            return Err(e);
        }
    };
    if !healthy {
        let path = store.path().to_path_buf();
        let _ = store.close();
        return Err(StorageError::StoreUnavailable {
            path,
            reason: "integrity check returned abnormal state after init".to_string(),
        });
    }

    tracing::info!("[Storage] Data store ready, data directory: {}", data_dir.display());
    Ok(store)
}

/// 설정된 디렉터리로 부트스트랩하고, 사용자 지정 디렉터리가 실패하면 기본 디렉터리로 폴백
pub fn initialize_storage(paths: &DataPaths, opener: &dyn StoreOpener) -> Result<StorageBootstrap> {
    let config_store = paths.config_store();
    let cfg = config_store.load()?;
    let default_dir = paths.default_data_dir();
    let current_dir = cfg.custom_data_dir.clone().unwrap_or_else(|| default_dir.clone());

    let failure = match bootstrap_data_dir(&current_dir, opener) {
        Ok(store) => {
            return Ok(StorageBootstrap {
                data_dir: current_dir,
                store,
                startup_notice: None,
            })
        }
        Err(e) if !cfg.is_custom() => return Err(e),
        Err(e) => e,
    };

    let notice = format!(
        "The custom storage directory is unavailable, fell back to the default directory. Reason: {}",
        failure
    );
    tracing::warn!("[Storage] {}", notice);

    config_store.clear_custom_data_dir()?;
    let store = bootstrap_data_dir(&default_dir, opener)?;
    tracing::info!("[Storage] Storage fell back to default directory: {}", default_dir.display());

    Ok(StorageBootstrap {
        data_dir: default_dir,
        store,
        startup_notice: Some(notice),
    })
}
