//! 다운로드 파일 SHA-256 검증
//!
//! 자동 업데이트 시 필수이며 우회할 수 없습니다. 불일치 시 교체 단계 전에 중단됩니다.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::{Result, UpdaterError};

/// 파일을 스트리밍으로 해시하여 hex 문자열 반환
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| UpdaterError::io("open downloaded file for hash check", path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| UpdaterError::io("hash downloaded file", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// 기대 다이제스트와 비교 (대소문자 무시)
pub fn verify_file_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(UpdaterError::Integrity {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }
    tracing::info!("[Updater] sha256 verified for {}", path.display());
    Ok(())
}
