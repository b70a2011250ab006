//! GitHub Release API 클라이언트
//!
//! 고정 저장소 URL에서 owner/repo를 파싱하여 `releases/latest` 엔드포인트를 조회합니다.
//! 메타데이터 요청은 짧은 타임아웃으로 제한되며 재시도하지 않습니다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, UpdaterError};
use crate::UpdateConfig;

/// 업스트림 에러 본문 최대 길이
pub(crate) const MAX_ERROR_BODY_BYTES: usize = 2048;
/// 릴리스 JSON 최대 크기
pub(crate) const MAX_RELEASE_BODY_BYTES: usize = 2 << 20;

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub Release Asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    /// 불투명 다이제스트 문자열 (예: "sha256:<hex>"), 없을 수 있음
    #[serde(default)]
    pub digest: Option<String>,
}

/// `https://github.com/<owner>/<repo>[.git][/...]` 에서 owner/repo 추출
pub fn parse_repo_url(repo_url: &str) -> Result<(String, String)> {
    let invalid = |reason: &str| UpdaterError::InvalidRepository(format!("{}: {}", repo_url, reason));

    let trimmed = repo_url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| invalid("url must use http or https"))?;

    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if !host.eq_ignore_ascii_case("github.com") {
        return Err(invalid("repository host must be github.com"));
    }

    let mut parts = path.trim_matches('/').split('/');
    let owner = parts.next().unwrap_or_default().trim();
    let repo = parts.next().unwrap_or_default().trim();
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return Err(invalid("repository url must include owner and repo"));
    }

    Ok((owner.to_string(), repo.to_string()))
}

/// 응답 본문을 최대 `limit` 바이트까지만 읽기
///
/// 한도를 넘으면 나머지는 읽지 않고 `(앞부분, true)`를 반환합니다.
pub(crate) async fn read_body_limited(
    response: &mut reqwest::Response,
    limit: usize,
) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// 잘린 에러 본문을 문자열로 (읽기 실패 시 빈 문자열)
pub(crate) async fn read_error_body(response: &mut reqwest::Response, limit: usize) -> String {
    let (bytes, _) = read_body_limited(response, limit).await.unwrap_or_default();
    truncate_body(&String::from_utf8_lossy(&bytes), limit)
}

/// 에러 본문을 문자 경계에 맞춰 자르기
fn truncate_body(body: &str, max: usize) -> String {
    let body = body.trim();
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// GitHub API 클라이언트
pub struct GitHubClient {
    owner: String,
    repo: String,
    http: reqwest::Client,
    /// API 베이스 URL (기본: "https://api.github.com")
    /// 로컬 mock 서버 테스트 시 "http://127.0.0.1:9876" 등으로 오버라이드
    base_url: String,
}

impl GitHubClient {
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let (owner, repo) = parse_repo_url(&config.repo_url)?;
        Self::with_base_url(&owner, &repo, config.api_base_url.as_deref(), config.request_timeout())
    }

    /// base_url을 오버라이드할 수 있는 생성자 (테스트/mock 서버용)
    pub fn with_base_url(
        owner: &str,
        repo: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("nooltools-update-checker")
            .timeout(timeout)
            .build()
            .map_err(|e| UpdaterError::Network(format!("failed to create http client: {}", e)))?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("https://api.github.com")
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// `releases/latest` 엔드포인트 URL
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repo
        )
    }

    /// 최신 릴리스 가져오기 (토큰이 있으면 Bearer 인증)
    pub async fn fetch_latest_release(&self, token: &str) -> Result<GitHubRelease> {
        let url = self.latest_release_url();
        tracing::debug!("[Updater] GET {}", url);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if !token.trim().is_empty() {
            request = request.bearer_auth(token.trim());
        }

        let mut response = request.send().await.map_err(|e| UpdaterError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::Upstream {
                status: status.as_u16(),
                body: read_error_body(&mut response, MAX_ERROR_BODY_BYTES).await,
            });
        }

        let (bytes, exceeded) = read_body_limited(&mut response, MAX_RELEASE_BODY_BYTES)
            .await
            .map_err(|e| UpdaterError::Network(e.to_string()))?;
        if exceeded {
            return Err(UpdaterError::Decode(format!(
                "release response exceeds {} bytes",
                MAX_RELEASE_BODY_BYTES
            )));
        }

        serde_json::from_slice(&bytes).map_err(|e| UpdaterError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_url_variants() {
        let cases = [
            ("https://github.com/HEUdbh/nooltools", "HEUdbh", "nooltools"),
            ("https://github.com/HEUdbh/nooltools/", "HEUdbh", "nooltools"),
            ("https://github.com/HEUdbh/nooltools.git", "HEUdbh", "nooltools"),
            ("https://GitHub.com/HEUdbh/nooltools/releases", "HEUdbh", "nooltools"),
        ];
        for (input, owner, repo) in cases {
            let (o, r) = parse_repo_url(input).unwrap();
            assert_eq!((o.as_str(), r.as_str()), (owner, repo), "input: {}", input);
        }
    }

    #[test]
    fn parse_repo_url_rejects() {
        assert!(parse_repo_url("https://gitlab.com/HEUdbh/nooltools").is_err());
        assert!(parse_repo_url("https://github.com/HEUdbh").is_err());
        assert!(parse_repo_url("github.com/HEUdbh/nooltools").is_err());
        assert!(parse_repo_url("").is_err());
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let s = "가나다라"; // 3 bytes each
        assert_eq!(truncate_body(s, 4), "가");
        assert_eq!(truncate_body("  short  ", 100), "short");
    }

    #[test]
    fn release_json_tolerates_missing_fields() {
        let json = r#"{"tag_name":"v1.5.0","assets":[{"name":"nooltools.exe","browser_download_url":"http://x/a"}]}"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v1.5.0");
        assert!(release.name.is_none());
        assert_eq!(release.assets[0].size, 0);
        assert!(release.assets[0].digest.is_none());
    }

    #[test]
    fn latest_release_url_uses_override() {
        let client = GitHubClient::with_base_url(
            "o",
            "r",
            Some("http://127.0.0.1:9876/"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.latest_release_url(),
            "http://127.0.0.1:9876/repos/o/r/releases/latest"
        );
    }
}
