//! 데이터 디렉터리 마이그레이션
//!
//! ## 단계
//! `Validating → ClosingStore → Copying → SwitchingConfig → ReopeningStore → Done`
//!
//! - 검증 실패는 어떤 상태도 바꾸지 않음
//! - 이후 단계가 실패하면 원래 위치에서 저장소를 다시 열어 앱이 계속 동작하도록 함
//! - 원본 트리는 삭제하지 않음 (대상 트리는 실패 시 일부만 채워져 있을 수 있음)

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::copy::copy_dir_with_conflict_backup;
use super::error::{Result, StorageError};
use super::{build_target_data_dir, is_sub_path, paths_equal, DataPaths};
use crate::store::{DataStore, StoreOpener};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Validating,
    ClosingStore,
    Copying,
    SwitchingConfig,
    ReopeningStore,
    Done,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::ClosingStore => "closing store",
            Self::Copying => "copying",
            Self::SwitchingConfig => "switching config",
            Self::ReopeningStore => "reopening store",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationResult {
    pub from_dir: PathBuf,
    pub to_dir: PathBuf,
    pub backed_up_conflicts: Vec<PathBuf>,
    pub restart_recommended: bool,
}

pub struct StorageMigrator {
    paths: DataPaths,
    opener: Arc<dyn StoreOpener>,
}

impl StorageMigrator {
    pub fn new(paths: DataPaths, opener: Arc<dyn StoreOpener>) -> Self {
        Self { paths, opener }
    }

    /// 현재 데이터 디렉터리를 `<parent_dir>/nooltools_data`로 옮김
    ///
    /// `store`는 호출자가 가진 열린 저장소 슬롯이며, 반환 시점에는 성공 여부와
    /// 관계없이 가능한 한 열린 상태로 채워집니다.
    pub fn migrate(
        &self,
        store: &mut Option<Box<dyn DataStore>>,
        parent_dir: &Path,
    ) -> Result<MigrationResult> {
        self.enter(MigrationPhase::Validating);
        let from_dir = self.paths.resolve_data_dir()?;
        let to_dir = build_target_data_dir(parent_dir)?;

        if paths_equal(&from_dir, &to_dir) {
            return Err(StorageError::SameDirectory(to_dir));
        }
        if is_sub_path(&to_dir, &from_dir) {
            return Err(StorageError::TargetInsideSource {
                target: to_dir,
                current: from_dir,
            });
        }

        std::fs::create_dir_all(&from_dir)
            .map_err(|e| StorageError::io("ensure source data directory", &from_dir, e))?;
        std::fs::create_dir_all(&to_dir)
            .map_err(|e| StorageError::io("create target data directory", &to_dir, e))?;

        let config_store = self.paths.config_store();
        let config_before = config_store.load()?;

        self.enter(MigrationPhase::ClosingStore);
        if let Some(current) = store.take() {
            if let Err(e) = current.close() {
                return Err(self.recover(store, &from_dir, e));
            }
        }

        self.enter(MigrationPhase::Copying);
        tracing::info!("[Migrate] {} -> {}", from_dir.display(), to_dir.display());
        let backed_up_conflicts = match copy_dir_with_conflict_backup(&from_dir, &to_dir) {
            Ok(list) => list,
            Err(e) => return Err(self.recover(store, &from_dir, e)),
        };

        self.enter(MigrationPhase::SwitchingConfig);
        if let Err(e) = config_store.set_custom_data_dir(&to_dir) {
            return Err(self.recover(store, &from_dir, e));
        }

        self.enter(MigrationPhase::ReopeningStore);
        match self.opener.open(&to_dir) {
            Ok(new_store) => *store = Some(new_store),
            Err(e) => {
                let mut rollback = Vec::new();
                if let Err(cfg_err) = config_store.save(&config_before) {
                    rollback.push(cfg_err);
                }
                if let Err(reopen_err) = self.reopen(store, &from_dir) {
                    rollback.push(reopen_err);
                }
                tracing::error!(
                    "[Migrate] Failed to open store in {}, rolled back ({} recovery failures)",
                    to_dir.display(),
                    rollback.len()
                );
                return Err(StorageError::with_rollback(e, rollback));
            }
        }

        self.enter(MigrationPhase::Done);
        tracing::info!(
            "[Migrate] Completed, {} conflicting path(s) backed up, restart recommended",
            backed_up_conflicts.len()
        );
        Ok(MigrationResult {
            from_dir,
            to_dir,
            backed_up_conflicts,
            restart_recommended: true,
        })
    }

    fn enter(&self, phase: MigrationPhase) {
        tracing::debug!("[Migrate] phase: {}", phase);
    }

    /// 원래 위치에서 저장소를 다시 열고, 실패하면 두 에러를 합쳐 반환
    fn recover(
        &self,
        store: &mut Option<Box<dyn DataStore>>,
        from_dir: &Path,
        primary: StorageError,
    ) -> StorageError {
        tracing::warn!("[Migrate] Aborted: {}", primary);
        let rollback = match self.reopen(store, from_dir) {
            Ok(()) => Vec::new(),
            Err(e) => vec![e],
        };
        StorageError::with_rollback(primary, rollback)
    }

    fn reopen(&self, store: &mut Option<Box<dyn DataStore>>, dir: &Path) -> Result<()> {
        match self.opener.open(dir) {
            Ok(reopened) => {
                *store = Some(reopened);
                Ok(())
            }
            Err(e) => {
                *store = None;
                Err(e)
            }
        }
    }
}
