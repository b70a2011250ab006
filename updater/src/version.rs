//! 릴리스 버전 비교 유틸리티 (외부 크레이트 없이)
//!
//! 프리릴리스(`-...`)와 빌드 메타데이터(`+...`)는 비교에서 제외합니다.
//! 따라서 같은 숫자 코어의 프리릴리스는 업데이트로 취급되지 않습니다.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, UpdaterError};

/// 숫자 버전 코어 (major.minor.patch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionCore {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionCore {
    /// "v1.2.3", "1.2", "V2.0.0-beta+build.7" 형식을 파싱
    ///
    /// 세그먼트가 3개 미만이면 오른쪽을 0으로 채웁니다.
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = |reason: &str| UpdaterError::InvalidVersion {
            version: version.to_string(),
            reason: reason.to_string(),
        };

        let normalized = normalize_version(version);
        if normalized.is_empty() {
            return Err(invalid("version is empty"));
        }

        let core = normalized.split('-').next().unwrap_or_default();
        let core = core.split('+').next().unwrap_or_default();

        let segments: Vec<&str> = core.split('.').collect();
        if segments.is_empty() || segments.len() > 3 {
            return Err(invalid("version must contain between 1 and 3 numeric segments"));
        }

        let mut parts = [0u64; 3];
        for (idx, segment) in segments.iter().enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(invalid("version segment is empty"));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(&format!("version segment {:?} is not numeric", segment)));
            }
            parts[idx] = segment
                .parse()
                .map_err(|_| invalid(&format!("version segment {:?} is out of range", segment)))?;
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
        })
    }

    /// 현재 버전보다 새로운 버전인지 확인
    pub fn is_newer_than(&self, other: &VersionCore) -> bool {
        self > other
    }
}

impl fmt::Display for VersionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 앞뒤 공백과 선행 `v`/`V` 제거
pub fn normalize_version(version: &str) -> &str {
    let v = version.trim();
    let v = v.strip_prefix(['v', 'V']).unwrap_or(v);
    v.trim()
}

/// 현재 버전과 최신 버전 비교
///
/// `Less`면 최신 버전이 더 높음 (업데이트 필요).
pub fn compare_versions(current: &str, latest: &str) -> Result<Ordering> {
    let current = VersionCore::parse(current)?;
    let latest = VersionCore::parse(latest)?;
    Ok(current.cmp(&latest))
}
