//! 충돌 백업을 동반한 디렉터리 트리 복사
//!
//! 대상에 이미 있는 파일(또는 디렉터리 자리를 차지한 파일)은 덮어쓰기 전에
//! `<path>.backup_<UTC 타임스탬프>[_N]`으로 이름을 바꿔 보존합니다.
//! 심볼릭 링크는 따라가지도 건너뛰지도 않고 에러로 처리합니다.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{Result, StorageError};

const MAX_BACKUP_CANDIDATES: usize = 1000;

/// `source` 트리를 `target`에 복사하고 백업된 충돌 경로 목록 반환
pub fn copy_dir_with_conflict_backup(source: &Path, target: &Path) -> Result<Vec<PathBuf>> {
    let mut backed_up = Vec::new();
    copy_children(source, target, &mut backed_up)?;
    Ok(backed_up)
}

fn copy_children(source_dir: &Path, target_dir: &Path, backed_up: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(source_dir)
        .map_err(|e| StorageError::io("read source directory", source_dir, e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| StorageError::io("read source directory", source_dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let source_path = entry.path();
        let target_path = target_dir.join(entry.file_name());
        let meta = fs::symlink_metadata(&source_path)
            .map_err(|e| StorageError::io("inspect source path", &source_path, e))?;

        if meta.file_type().is_symlink() {
            return Err(StorageError::UnsupportedSymlink(source_path));
        }

        if meta.is_dir() {
            if let Some(backup) = backup_if_occupied_by_non_dir(&target_path)? {
                backed_up.push(backup);
            }
            create_dir_like(&target_path, &meta)?;
            copy_children(&source_path, &target_path, backed_up)?;
        } else {
            if let Some(backup) = backup_if_exists(&target_path)? {
                backed_up.push(backup);
            }
            copy_file(&source_path, &target_path, &meta)?;
        }
    }
    Ok(())
}

fn backup_if_occupied_by_non_dir(path: &Path) -> Result<Option<PathBuf>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(None),
        Ok(_) => backup_if_exists(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => backup_if_exists(path),
        Err(e) => Err(StorageError::io("check target path", path, e)),
    }
}

/// 경로가 존재하면 백업 이름으로 옮기고 그 경로를 반환
pub fn backup_if_exists(path: &Path) -> Result<Option<PathBuf>> {
    match fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io("check target path", path, e)),
    }

    let backup = conflict_backup_path(path)?;
    fs::rename(path, &backup).map_err(|e| StorageError::io("back up target conflict", path, e))?;
    tracing::info!(
        "[Migrate] Backed up conflicting {} -> {}",
        path.display(),
        backup.display()
    );
    Ok(Some(backup))
}

/// 기존 경로와 겹치지 않는 백업 경로 생성
pub fn conflict_backup_path(path: &Path) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(format!("{} has no file name", path.display())))?;

    for idx in 0..MAX_BACKUP_CANDIDATES {
        let mut name = file_name.to_os_string();
        name.push(format!(".backup_{}", timestamp));
        if idx > 0 {
            name.push(format!("_{}", idx));
        }
        let candidate = path.with_file_name(name);
        match fs::symlink_metadata(&candidate) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(StorageError::io("inspect backup candidate", &candidate, e)),
            Ok(_) => continue,
        }
    }
    Err(StorageError::BackupPathExhausted(path.to_path_buf()))
}

fn create_dir_like(path: &Path, source_meta: &fs::Metadata) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        builder.mode(source_meta.permissions().mode() & 0o777);
    }
    #[cfg(not(unix))]
    let _ = source_meta;
    builder
        .create(path)
        .map_err(|e| StorageError::io("create target directory", path, e))
}

fn copy_file(source: &Path, target: &Path, source_meta: &fs::Metadata) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::io("create target directory", parent, e))?;
    }

    let mut reader =
        fs::File::open(source).map_err(|e| StorageError::io("open source file", source, e))?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(source_meta.permissions().mode() & 0o777);
    }
    let mut writer = options
        .open(target)
        .map_err(|e| StorageError::io("create target file", target, e))?;

    io::copy(&mut reader, &mut writer)
        .map_err(|e| StorageError::io("copy file into", target, e))?;
    writer
        .sync_all()
        .map_err(|e| StorageError::io("finalize target file", target, e))?;

    #[cfg(not(unix))]
    fs::set_permissions(target, source_meta.permissions())
        .map_err(|e| StorageError::io("set permissions on", target, e))?;
    Ok(())
}
