//! 업데이터 시나리오 테스트
//!
//! ## 테스트 시나리오
//! 1. 업데이트 확인: Mock 서버의 `releases/latest` 응답으로 판정
//! 2. 전체 파이프라인: 다운로드 → 검증 → 교체 핸드오프 → 재시작
//! 3. 무결성 실패: 다이제스트 불일치 시 교체하지 않음
//! 4. 단일 슬롯: 실행 중 재시작 요청 거부
//! 5. 다운로드 실패: 404 / 중단된 스트림, pending 파일 보존
//! 6. 릴리스 조회 실패: 연결 실패, 잘못된 JSON, 크기 제한

use axum::routing::get;
use axum::Router;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::download::{temp_download_path, Downloader};
use crate::{
    AutoUpdater, Installer, NullSink, ProgressEvent, ProgressSink, ReplacementRequest,
    UpdateConfig, UpdateEnvironment, UpdateLocations, UpdateStage, UpdaterError,
};

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

const PAYLOAD: &[u8] = b"nooltools new build payload";

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 로컬 모킹 GitHub API 서버 시작
/// `{base}` 플레이스홀더는 실제 서버 주소로 치환됩니다.
async fn start_mock_server(release: serde_json::Value, delay: Duration) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let release_json = Arc::new(release.to_string().replace("{base}", &format!("http://{}", addr)));

    let app = Router::new()
        .route(
            "/repos/:owner/:repo/releases/latest",
            get({
                let body = release_json.clone();
                move || async move {
                    tokio::time::sleep(delay).await;
                    ([("content-type", "application/json")], body.as_str().to_string())
                }
            }),
        )
        .route(
            "/download/:filename",
            get(|axum::extract::Path(filename): axum::extract::Path<String>| async move {
                if filename == "nooltools.exe" {
                    (axum::http::StatusCode::OK, PAYLOAD.to_vec())
                } else {
                    (axum::http::StatusCode::NOT_FOUND, b"Not Found".to_vec())
                }
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// 임의의 라우터로 로컬 서버 시작
async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// 헤더는 1000바이트를 약속하고 10바이트만 보낸 뒤 연결을 끊는 서버
async fn start_truncating_server() -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: 1000\r\n\r\npartial!!!",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    addr
}

fn release_json(tag: &str, digest: Option<String>) -> serde_json::Value {
    release_with_asset_url(tag, digest, "{base}/download/nooltools.exe")
}

fn release_with_asset_url(tag: &str, digest: Option<String>, url: &str) -> serde_json::Value {
    json!({
        "tag_name": tag,
        "name": format!("nooltools {}", tag),
        "html_url": format!("https://github.com/HEUdbh/nooltools/releases/tag/{}", tag),
        "published_at": "2026-10-01T00:00:00Z",
        "body": "Fixed bugs",
        "assets": [{
            "name": "nooltools.exe",
            "browser_download_url": url,
            "size": PAYLOAD.len(),
            "digest": digest,
        }],
    })
}

fn test_config(addr: SocketAddr) -> UpdateConfig {
    UpdateConfig {
        current_version: "v1.4.0".to_string(),
        api_base_url: Some(format!("http://{}", addr)),
        restart_delay_ms: 0,
        ..Default::default()
    }
}

struct TestEnv {
    root: PathBuf,
}

impl UpdateEnvironment for TestEnv {
    fn locations(&self) -> crate::Result<UpdateLocations> {
        Ok(UpdateLocations {
            token_file: self.root.join("data").join("github_token.json"),
            updates_dir: self.root.join("data").join("updates"),
            target_executable: self.root.join("bin").join("nooltools"),
        })
    }
}

#[derive(Default)]
struct RecordingInstaller {
    requests: Mutex<Vec<ReplacementRequest>>,
}

impl Installer for RecordingInstaller {
    fn launch(&self, _updates_dir: &Path, request: &ReplacementRequest) -> crate::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

struct Harness {
    updater: Arc<AutoUpdater>,
    installer: Arc<RecordingInstaller>,
    events: Arc<Mutex<Vec<ProgressEvent>>>,
    restarts: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

fn harness(config: UpdateConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let env = Arc::new(TestEnv {
        root: dir.path().to_path_buf(),
    });
    let installer = Arc::new(RecordingInstaller::default());
    let events = Arc::new(Mutex::new(Vec::new()));
    let restarts = Arc::new(AtomicUsize::new(0));

    let sink: Arc<dyn ProgressSink> = {
        let events = events.clone();
        Arc::new(move |event: ProgressEvent| events.lock().unwrap().push(event))
    };
    let updater = AutoUpdater::new(config, env)
        .with_installer(installer.clone())
        .with_sink(sink)
        .with_restart_hook({
            let restarts = restarts.clone();
            move || {
                restarts.fetch_add(1, Ordering::SeqCst);
            }
        });

    Harness {
        updater: Arc::new(updater),
        installer,
        events,
        restarts,
        _dir: dir,
    }
}

// ═══════════════════════════════════════════════════════
// 테스트 1: 업데이트 확인
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn check_reports_new_version_with_auto_update() {
    let digest = format!("sha256:{}", sha256_hex(PAYLOAD));
    let addr = start_mock_server(release_json("v1.5.0", Some(digest)), Duration::ZERO).await;
    let h = harness(test_config(addr));

    let result = h.updater.check_for_update().await.unwrap();
    assert!(result.has_update);
    assert!(result.can_auto_update);
    assert_eq!(result.latest_version, "v1.5.0");
    assert_eq!(result.asset_name, "nooltools.exe");
    assert_eq!(result.asset_size, PAYLOAD.len() as u64);
    assert_eq!(result.release_notes, "Fixed bugs");
    assert!(!result.checked_at.is_empty());
}

#[tokio::test]
async fn check_same_version_is_not_update() {
    let addr = start_mock_server(release_json("v1.4.0", None), Duration::ZERO).await;
    let h = harness(test_config(addr));

    let result = h.updater.check_for_update().await.unwrap();
    assert!(!result.has_update);
    assert!(!result.can_auto_update);
    assert!(result.asset_name.is_empty());
}

#[tokio::test]
async fn check_creates_token_file() {
    let addr = start_mock_server(release_json("v1.4.0", None), Duration::ZERO).await;
    let h = harness(test_config(addr));
    h.updater.check_for_update().await.unwrap();

    let token_file = h._dir.path().join("data").join("github_token.json");
    assert!(token_file.exists(), "토큰 파일이 생성되어야 함");
}

#[tokio::test]
async fn check_upstream_error_is_reported() {
    // 라우트가 없는 서버 → 404
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new()).await.unwrap();
    });
    let h = harness(test_config(addr));

    let err = h.updater.check_for_update().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Upstream { status: 404, .. }));
    assert_eq!(err.error_code(), "UPSTREAM_ERROR");
}

// ═══════════════════════════════════════════════════════
// 테스트 2: 전체 파이프라인
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn full_pipeline_hands_off_verified_file() {
    let digest = format!("sha256:{}", sha256_hex(PAYLOAD).to_uppercase());
    let addr = start_mock_server(release_json("v1.5.0", Some(digest)), Duration::ZERO).await;
    let h = harness(test_config(addr));

    h.updater.start().unwrap().await.unwrap();

    let events = h.events.lock().unwrap().clone();
    let stages: Vec<UpdateStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(stages.first(), Some(&UpdateStage::Preparing));
    assert!(stages.contains(&UpdateStage::Downloading));
    assert!(stages.contains(&UpdateStage::Verifying));
    assert!(stages.contains(&UpdateStage::Replacing));
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Restarting);
    assert_eq!(last.percent, 100);
    assert!(!stages.contains(&UpdateStage::Error));

    // 진행률은 감소하지 않음
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);

    let requests = h.installer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.pid, std::process::id());
    assert!(request.staged_path.ends_with(format!("pending_v1.5.0{}", std::env::consts::EXE_SUFFIX)));
    assert_eq!(std::fs::read(&request.staged_path).unwrap(), PAYLOAD);
    assert_eq!(h.restarts.load(Ordering::SeqCst), 1);
    assert!(!h.updater.is_running());
}

// ═══════════════════════════════════════════════════════
// 테스트 3: 무결성 / 자동 업데이트 불가
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn digest_mismatch_stops_before_replacement() {
    let wrong = format!("sha256:{}", "0".repeat(64));
    let addr = start_mock_server(release_json("v1.5.0", Some(wrong)), Duration::ZERO).await;
    let h = harness(test_config(addr));

    h.updater.start().unwrap().await.unwrap();

    let events = h.events.lock().unwrap().clone();
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Error);
    assert_eq!(last.percent, 0);
    assert!(last.detail.contains("sha256 mismatch"), "detail: {}", last.detail);
    assert!(events.iter().any(|e| e.stage == UpdateStage::Verifying));
    assert!(!events.iter().any(|e| e.stage == UpdateStage::Replacing));
    assert!(h.installer.requests.lock().unwrap().is_empty());
    assert_eq!(h.restarts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_digest_refuses_auto_update() {
    let addr = start_mock_server(release_json("v1.5.0", None), Duration::ZERO).await;
    let h = harness(test_config(addr));

    let result = h.updater.check_for_update().await.unwrap();
    assert!(result.has_update);
    assert!(!result.can_auto_update);
    assert_eq!(result.auto_update_reason, crate::decision::REASON_INVALID_DIGEST);

    h.updater.start().unwrap().await.unwrap();
    let events = h.events.lock().unwrap().clone();
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Error);
    assert!(last.detail.contains("sha256 digest"), "detail: {}", last.detail);
    assert!(!events.iter().any(|e| e.stage == UpdateStage::Downloading));
}

#[tokio::test]
async fn already_latest_refuses_auto_update() {
    let addr = start_mock_server(release_json("v1.4.0", None), Duration::ZERO).await;
    let h = harness(test_config(addr));

    h.updater.start().unwrap().await.unwrap();
    let events = h.events.lock().unwrap().clone();
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Error);
    assert!(last.detail.contains("latest version"), "detail: {}", last.detail);
}

// ═══════════════════════════════════════════════════════
// 테스트 4: 단일 슬롯
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let digest = format!("sha256:{}", sha256_hex(PAYLOAD));
    let addr = start_mock_server(
        release_json("v1.5.0", Some(digest)),
        Duration::from_millis(300),
    )
    .await;
    let h = harness(test_config(addr));

    let first = h.updater.start().unwrap();
    assert!(h.updater.is_running());
    assert!(matches!(h.updater.start(), Err(UpdaterError::AlreadyRunning)));

    first.await.unwrap();
    assert!(!h.updater.is_running());

    // 완료 후에는 다시 시작 가능
    h.updater.start().unwrap().await.unwrap();
    assert_eq!(h.installer.requests.lock().unwrap().len(), 2);
}

// ═══════════════════════════════════════════════════════
// 테스트 5: 다운로드 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn missing_asset_download_reports_error() {
    let digest = format!("sha256:{}", sha256_hex(PAYLOAD));
    let release = release_with_asset_url("v1.5.0", Some(digest), "{base}/download/missing");
    let addr = start_mock_server(release, Duration::ZERO).await;
    let h = harness(test_config(addr));

    h.updater.start().unwrap().await.unwrap();

    let events = h.events.lock().unwrap().clone();
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Error);
    assert!(last.detail.contains("status 404"), "detail: {}", last.detail);
    assert!(!events.iter().any(|e| e.stage == UpdateStage::Verifying));
    assert!(h.installer.requests.lock().unwrap().is_empty());

    let updates = h._dir.path().join("data").join("updates");
    let pending: Vec<_> = std::fs::read_dir(updates)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("pending_"))
        .collect();
    assert!(pending.is_empty(), "pending 파일이 없어야 함: {:?}", pending);
}

#[tokio::test]
async fn non_success_download_leaves_destination_untouched() {
    let addr = start_mock_server(release_json("v1.5.0", None), Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pending_v1_5_0");
    std::fs::write(&dest, "previous build").unwrap();

    let err = Downloader::new()
        .unwrap()
        .stream(&format!("http://{}/download/missing", addr), "", &dest, 0, &NullSink)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "DOWNLOAD_ERROR");
    assert!(err.to_string().contains("Not Found"), "{}", err);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "previous build");
}

#[tokio::test]
async fn aborted_stream_leaves_destination_untouched() {
    let addr = start_truncating_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pending_v1_5_0");
    std::fs::write(&dest, "previous build").unwrap();

    let err = Downloader::new()
        .unwrap()
        .stream(&format!("http://{}/download/nooltools.exe", addr), "", &dest, 0, &NullSink)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "DOWNLOAD_ERROR");
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "previous build");
}

#[tokio::test]
async fn successful_download_replaces_stale_pending_file() {
    let addr = start_mock_server(release_json("v1.5.0", None), Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pending_v1_5_0");
    std::fs::write(&dest, "stale build").unwrap();
    std::fs::write(temp_download_path(&dest), "half written").unwrap();

    let written = Downloader::new()
        .unwrap()
        .stream(&format!("http://{}/download/nooltools.exe", addr), "", &dest, 0, &NullSink)
        .await
        .unwrap();
    assert_eq!(written, PAYLOAD.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);
    assert!(!temp_download_path(&dest).exists());
}

// ═══════════════════════════════════════════════════════
// 테스트 6: 릴리스 조회 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn closed_port_is_network_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let h = harness(test_config(addr));

    let err = h.updater.check_for_update().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Network(_)), "{:?}", err);
    assert_eq!(err.error_code(), "NETWORK_ERROR");
}

#[tokio::test]
async fn malformed_release_json_is_decode_error() {
    let addr = serve(Router::new().route(
        "/repos/:owner/:repo/releases/latest",
        get(|| async { ([("content-type", "application/json")], "{not json") }),
    ))
    .await;
    let h = harness(test_config(addr));

    let err = h.updater.check_for_update().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Decode(_)), "{:?}", err);
    assert_eq!(err.error_code(), "DECODE_ERROR");
}

#[tokio::test]
async fn oversized_release_body_is_rejected() {
    // 유효한 JSON 뒤에 공백을 붙여 크기 제한만 넘김
    let body = format!(
        "{}{}",
        release_json("v1.5.0", None),
        " ".repeat(crate::github::MAX_RELEASE_BODY_BYTES)
    );
    let addr = serve(Router::new().route(
        "/repos/:owner/:repo/releases/latest",
        get(move || async move { ([("content-type", "application/json")], body) }),
    ))
    .await;
    let h = harness(test_config(addr));

    let err = h.updater.check_for_update().await.unwrap_err();
    assert_eq!(err.error_code(), "DECODE_ERROR");
    assert!(err.to_string().contains("exceeds"), "{}", err);
}

#[tokio::test]
async fn upstream_error_body_is_truncated() {
    let addr = serve(Router::new().route(
        "/repos/:owner/:repo/releases/latest",
        get(|| async {
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "x".repeat(64 * 1024),
            )
        }),
    ))
    .await;
    let h = harness(test_config(addr));

    match h.updater.check_for_update().await.unwrap_err() {
        UpdaterError::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body.len(), crate::github::MAX_ERROR_BODY_BYTES);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
