//! 애플리케이션 유지보수 퍼사드
//!
//! 저장소 부트스트랩/마이그레이션과 자동 업데이터를 하나의 핸들로 묶습니다.
//! 두 하위 시스템은 런타임 상태를 공유하지 않으며, 업데이터는 매 실행마다
//! 현재 데이터 디렉터리를 다시 조회합니다.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nooltools_updater_lib::{
    AutoUpdater, ProgressSink, UpdateCheckResult, UpdateConfig, UpdateEnvironment,
    UpdateLocations, UpdaterError, TOKEN_CONFIG_FILE_NAME,
};

use crate::storage::{
    initialize_storage, paths_equal, DataPaths, MigrationResult, Result, StorageError,
    StorageMigrator, UPDATES_DIR_NAME,
};
use crate::store::{DataStore, StoreOpener};

/// 저장소 설정 보기
#[derive(Debug, Clone, Serialize)]
pub struct StorageSettings {
    pub current_data_dir: PathBuf,
    pub default_data_dir: PathBuf,
    pub is_custom: bool,
    pub startup_notice: String,
}

/// 업데이터가 사용할 경로를 저장소 설정에서 조회
struct StorageUpdateEnvironment {
    paths: DataPaths,
}

impl UpdateEnvironment for StorageUpdateEnvironment {
    fn locations(&self) -> nooltools_updater_lib::Result<UpdateLocations> {
        let data_dir = self
            .paths
            .resolve_data_dir()
            .map_err(|e| UpdaterError::environment(e.error_code(), e))?;
        let target_executable = std::env::current_exe()
            .map_err(|e| UpdaterError::io("resolve current executable", PathBuf::new(), e))?;
        Ok(UpdateLocations {
            token_file: data_dir.join(TOKEN_CONFIG_FILE_NAME),
            updates_dir: data_dir.join(UPDATES_DIR_NAME),
            target_executable,
        })
    }
}

pub struct App {
    paths: DataPaths,
    opener: Arc<dyn StoreOpener>,
    store: Option<Box<dyn DataStore>>,
    startup_notice: Option<String>,
    updater: Arc<AutoUpdater>,
}

impl App {
    /// 저장소를 부트스트랩하고 업데이터를 준비
    pub fn start(
        paths: DataPaths,
        opener: Arc<dyn StoreOpener>,
        update_config: UpdateConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        Self::start_with(paths, opener, update_config, sink, |updater| updater)
    }

    /// `customize`로 업데이터 구성(설치기, 재시작 훅)을 바꿀 수 있는 생성자
    pub fn start_with(
        paths: DataPaths,
        opener: Arc<dyn StoreOpener>,
        update_config: UpdateConfig,
        sink: Arc<dyn ProgressSink>,
        customize: impl FnOnce(AutoUpdater) -> AutoUpdater,
    ) -> Result<Self> {
        let boot = initialize_storage(&paths, opener.as_ref())?;
        tracing::info!("[Storage] Using data directory {}", boot.data_dir.display());

        let env = Arc::new(StorageUpdateEnvironment {
            paths: paths.clone(),
        });
        let updater = customize(AutoUpdater::new(update_config, env).with_sink(sink));

        Ok(Self {
            paths,
            opener,
            store: Some(boot.store),
            startup_notice: boot.startup_notice,
            updater: Arc::new(updater),
        })
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn startup_notice(&self) -> Option<&str> {
        self.startup_notice.as_deref()
    }

    /// 현재 열린 저장소 파일 경로
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_ref().map(|store| store.path())
    }

    pub fn storage_settings(&self) -> Result<StorageSettings> {
        let current_data_dir = self.paths.resolve_data_dir()?;
        let default_data_dir = self.paths.default_data_dir();
        Ok(StorageSettings {
            is_custom: !paths_equal(&current_data_dir, &default_data_dir),
            current_data_dir,
            default_data_dir,
            startup_notice: self.startup_notice.clone().unwrap_or_default(),
        })
    }

    /// 데이터 디렉터리를 `<parent_dir>/nooltools_data`로 이동
    pub fn migrate_storage_directory(&mut self, parent_dir: &Path) -> Result<MigrationResult> {
        let migrator = StorageMigrator::new(self.paths.clone(), self.opener.clone());
        migrator.migrate(&mut self.store, parent_dir)
    }

    pub fn updater(&self) -> &Arc<AutoUpdater> {
        &self.updater
    }

    pub async fn check_for_update(&self) -> nooltools_updater_lib::Result<UpdateCheckResult> {
        self.updater.check_for_update().await
    }

    /// 백그라운드 업데이트 시작: 이미 실행 중이면 `AlreadyRunning`
    pub fn start_auto_update(&self) -> nooltools_updater_lib::Result<tokio::task::JoinHandle<()>> {
        self.updater.start()
    }

    pub fn is_updating(&self) -> bool {
        self.updater.is_running()
    }

    /// 같은 인자로 현재 실행 파일을 다시 띄움 (호출자는 이후 종료해야 함)
    pub fn restart_application(&self) -> Result<()> {
        let exe = std::env::current_exe()
            .map_err(|e| StorageError::io("get executable path", PathBuf::new(), e))?;
        let mut cmd = std::process::Command::new(&exe);
        cmd.args(std::env::args_os().skip(1));
        if let Some(dir) = exe.parent() {
            cmd.current_dir(dir);
        }
        cmd.spawn()
            .map_err(|e| StorageError::io("start new process", &exe, e))?;
        tracing::info!("[Storage] Relaunched {}", exe.display());
        Ok(())
    }

    /// 저장소 닫기
    pub fn shutdown(mut self) -> Result<()> {
        match self.store.take() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }
}
