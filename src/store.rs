//! 데이터 저장소 경계
//!
//! 엔티티 CRUD는 이 크레이트의 범위 밖이고, 마이그레이션과 부트스트랩은
//! 열기/닫기/무결성 확인만 필요합니다.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::{Result, StorageError, DATABASE_FILE_NAME};

/// 열린 저장소 핸들
pub trait DataStore: Send {
    /// 주 저장소 파일 경로
    fn path(&self) -> &Path;

    /// 무결성 확인: `Ok(false)`는 열렸지만 사용할 수 없는 상태
    fn check_integrity(&mut self) -> Result<bool>;

    fn close(self: Box<Self>) -> Result<()>;
}

/// 데이터 디렉터리에서 저장소를 여는 팩토리
pub trait StoreOpener: Send + Sync {
    fn open(&self, data_dir: &Path) -> Result<Box<dyn DataStore>>;
}

const FILE_STORE_HEADER: &[u8] = b"NOOLTOOLS-STORE 1\n";

/// 단일 파일 저장소: 새 파일에는 헤더를 기록하고 무결성 확인 시 검사
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
}

impl FileStore {
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(DATABASE_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io("open data store", &path, e))?;

        let len = file
            .metadata()
            .map_err(|e| StorageError::io("inspect data store", &path, e))?
            .len();
        if len == 0 {
            file.write_all(FILE_STORE_HEADER)
                .and_then(|_| file.sync_all())
                .map_err(|e| StorageError::io("initialize data store", &path, e))?;
            tracing::info!("[Storage] Initialized new data store at {}", path.display());
        }

        Ok(Self { path, file })
    }
}

impl DataStore for FileStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn check_integrity(&mut self) -> Result<bool> {
        let mut header = vec![0u8; FILE_STORE_HEADER.len()];
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::io("check data store", &self.path, e))?;
        match self.file.read_exact(&mut header) {
            Ok(()) => Ok(header == FILE_STORE_HEADER),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(StorageError::io("check data store", &self.path, e)),
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::io("close data store", &self.path, e))?;
        tracing::debug!("[Storage] Closed data store {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FileStoreOpener;

impl StoreOpener for FileStoreOpener {
    fn open(&self, data_dir: &Path) -> Result<Box<dyn DataStore>> {
        Ok(Box::new(FileStore::open_in(data_dir)?))
    }
}
