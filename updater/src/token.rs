//! GitHub 토큰 설정 파일 (`github_token.json`)
//!
//! 데이터 디렉터리 아래에 두며, 처음 접근 시 빈 토큰으로 자동 생성합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, UpdaterError};

pub const TOKEN_CONFIG_FILE_NAME: &str = "github_token.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenConfig {
    #[serde(default)]
    pub github_token: String,
}

/// 토큰 설정을 읽거나, 없으면 빈 설정으로 생성
pub fn read_or_create_token_config(path: &Path) -> Result<TokenConfig> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| UpdaterError::io("create config directory", dir, e))?;
    }

    if !path.exists() {
        let cfg = TokenConfig::default();
        write_token_config(path, &cfg)?;
        tracing::info!("[Updater] Created empty token config at {}", path.display());
        return Ok(cfg);
    }

    let data = std::fs::read_to_string(path)
        .map_err(|e| UpdaterError::io("read token config", path, e))?;
    if data.trim().is_empty() {
        return Err(UpdaterError::TokenConfig {
            path: path.to_path_buf(),
            reason: "token config file is empty".to_string(),
        });
    }

    serde_json::from_str(&data).map_err(|e| UpdaterError::TokenConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// 토큰 문자열 로드 (앞뒤 공백 제거)
pub fn load_github_token(path: &Path) -> Result<String> {
    Ok(read_or_create_token_config(path)?.github_token.trim().to_string())
}

/// 토큰 설정 저장 (소유자 전용 권한)
pub fn write_token_config(path: &Path, cfg: &TokenConfig) -> Result<()> {
    let mut data = serde_json::to_string_pretty(cfg).map_err(|e| UpdaterError::TokenConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
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
        .open(path)
        .map_err(|e| UpdaterError::io("write token config", path, e))?;
    std::io::Write::write_all(&mut file, data.as_bytes())
        .map_err(|e| UpdaterError::io("write token config", path, e))
}
