//! 업데이트 판정: 버전 비교, 에셋 선택, 다이제스트 검증
//!
//! 에셋/다이제스트 문제는 에러가 아니라 자동 업데이트 불가(`can_auto_update=false`)로
//! 강등됩니다. 이 경우에도 `has_update`는 유지되어 수동 다운로드를 안내할 수 있습니다.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{Result, UpdaterError};
use crate::github::{GitHubAsset, GitHubRelease};
use crate::version::compare_versions;

pub const REASON_NO_SUPPORTED_ASSET: &str = "No supported release asset found.";
pub const REASON_INVALID_DIGEST: &str =
    "Missing valid SHA256 digest, automatic replacement is blocked.";

/// 업데이트 확인 결과 (매 확인마다 새로 생성, 저장하지 않음)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateCheckResult {
    pub has_update: bool,
    pub current_version: String,
    pub latest_version: String,
    pub release_name: String,
    pub release_url: String,
    pub published_at: String,
    pub release_notes: String,
    pub checked_at: String,
    pub message: String,
    pub asset_name: String,
    pub asset_size: u64,
    pub can_auto_update: bool,
    pub auto_update_reason: String,
}

/// 자동 업데이트 준비 정보: 판정 결과 + 선택된 에셋 + 정규화된 다이제스트
#[derive(Debug, Clone, Default)]
pub struct UpdatePreparation {
    pub result: UpdateCheckResult,
    pub selected_asset: Option<GitHubAsset>,
    /// 소문자 64자리 hex (다이제스트가 유효할 때만)
    pub sha256_digest: Option<String>,
}

impl UpdatePreparation {
    /// 자동 업데이트 진행 가능 여부를 확인하고 (에셋, 다이제스트) 반환
    pub fn ready_for_auto_update(&self) -> Result<(&GitHubAsset, &str)> {
        if !self.result.has_update {
            return Err(UpdaterError::NotApplicable(
                "You are already using the latest version.".to_string(),
            ));
        }
        let asset = self
            .selected_asset
            .as_ref()
            .filter(|asset| !asset.browser_download_url.trim().is_empty())
            .ok_or(UpdaterError::NoSupportedAsset)?;
        match self.sha256_digest.as_deref() {
            Some(digest) if !digest.is_empty() => Ok((asset, digest)),
            _ => Err(UpdaterError::MissingOrInvalidDigest(format!(
                "asset {} cannot be verified",
                asset.name
            ))),
        }
    }
}

/// 릴리스 정보로부터 업데이트 여부와 자동 업데이트 가능 여부를 판정
pub fn decide(
    release: &GitHubRelease,
    current_version: &str,
    asset_names: &[String],
) -> Result<UpdatePreparation> {
    let mut result = UpdateCheckResult {
        current_version: current_version.to_string(),
        checked_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ..Default::default()
    };

    let release_name = release.name.as_deref().unwrap_or_default().trim();
    let latest_version = match release.tag_name.trim() {
        "" => release_name,
        tag => tag,
    };
    if latest_version.is_empty() {
        return Err(UpdaterError::MissingVersion);
    }

    result.latest_version = latest_version.to_string();
    result.release_name = release_name.to_string();
    result.release_url = release.html_url.trim().to_string();
    result.published_at = release.published_at.as_deref().unwrap_or_default().trim().to_string();
    result.release_notes = release.body.as_deref().unwrap_or_default().trim().to_string();

    if compare_versions(current_version, latest_version)? != Ordering::Less {
        result.message = "You are using the latest version.".to_string();
        return Ok(UpdatePreparation {
            result,
            ..Default::default()
        });
    }

    result.has_update = true;
    result.message = "A new version is available.".to_string();

    let Some(asset) = select_preferred_asset(&release.assets, asset_names) else {
        tracing::info!("[Updater] {} has no supported asset", latest_version);
        result.auto_update_reason = REASON_NO_SUPPORTED_ASSET.to_string();
        return Ok(UpdatePreparation {
            result,
            ..Default::default()
        });
    };
    result.asset_name = asset.name.clone();
    result.asset_size = asset.size;

    match parse_sha256_digest(asset.digest.as_deref().unwrap_or_default()) {
        Ok(digest) => {
            result.can_auto_update = true;
            Ok(UpdatePreparation {
                result,
                selected_asset: Some(asset.clone()),
                sha256_digest: Some(digest),
            })
        }
        Err(e) => {
            tracing::info!("[Updater] asset {} blocks auto update: {}", asset.name, e);
            result.auto_update_reason = REASON_INVALID_DIGEST.to_string();
            Ok(UpdatePreparation {
                result,
                selected_asset: Some(asset.clone()),
                sha256_digest: None,
            })
        }
    }
}

/// 우선순위 순으로 이름을 비교하여 에셋 선택 (대소문자 무시)
pub fn select_preferred_asset<'a>(
    assets: &'a [GitHubAsset],
    asset_names: &[String],
) -> Option<&'a GitHubAsset> {
    asset_names.iter().find_map(|expected| {
        assets
            .iter()
            .find(|asset| asset.name.trim().eq_ignore_ascii_case(expected.trim()))
    })
}

/// `sha256:<64 hex>` 파싱 → 소문자 hex 반환
pub fn parse_sha256_digest(digest: &str) -> Result<String> {
    let invalid = |reason: &str| UpdaterError::MissingOrInvalidDigest(reason.to_string());

    let trimmed = digest.trim();
    if trimmed.is_empty() {
        return Err(invalid("digest is empty"));
    }

    const PREFIX: &str = "sha256:";
    let has_prefix = trimmed
        .get(..PREFIX.len())
        .map(|p| p.eq_ignore_ascii_case(PREFIX))
        .unwrap_or(false);
    if !has_prefix {
        return Err(invalid("digest must start with sha256:"));
    }

    let sum = trimmed[PREFIX.len()..].trim();
    if sum.len() != 64 {
        return Err(invalid("sha256 digest must be 64 hex chars"));
    }
    if !sum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid("sha256 digest contains non-hex chars"));
    }
    Ok(sum.to_ascii_lowercase())
}
