//! 자동 업데이트 태스크: 확인, 다운로드, 검증, 교체 핸드오프
//!
//! ## 동시성
//! - 단일 슬롯: 실행 중에 다시 시작하면 즉시 `AlreadyRunning` (대기열/취소 없음)
//! - 진행 상황은 `ProgressSink`로 단방향 전달
//! - 시작된 태스크는 완료, 에러, 또는 프로세스 종료까지 진행

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::decision::{decide, UpdateCheckResult, UpdatePreparation};
use crate::download::{sanitize_version_for_filename, Downloader};
use crate::error::{Result, UpdaterError};
use crate::github::GitHubClient;
use crate::installer::{Installer, PlatformInstaller, ReplacementRequest};
use crate::progress::{NullSink, ProgressEvent, ProgressSink, UpdateStage};
use crate::token::load_github_token;
use crate::verify::verify_file_sha256;
use crate::UpdateConfig;

/// 업데이트에 필요한 경로: 데이터 디렉터리가 바뀔 수 있으므로 매번 조회
#[derive(Debug, Clone)]
pub struct UpdateLocations {
    /// `github_token.json` 경로
    pub token_file: PathBuf,
    /// pending 바이너리와 교체 스크립트가 놓이는 디렉터리
    pub updates_dir: PathBuf,
    /// 교체 대상 (보통 현재 실행 파일)
    pub target_executable: PathBuf,
}

/// 업데이터가 호스트 애플리케이션에 요구하는 경로 정보
pub trait UpdateEnvironment: Send + Sync {
    fn locations(&self) -> Result<UpdateLocations>;
}

/// 실행 중 여부를 나타내는 단일 슬롯
#[derive(Debug, Default)]
struct TaskSlot {
    busy: Mutex<bool>,
}

impl TaskSlot {
    fn try_acquire(self: &Arc<Self>) -> Result<SlotGuard> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if *busy {
            return Err(UpdaterError::AlreadyRunning);
        }
        *busy = true;
        Ok(SlotGuard { slot: self.clone() })
    }

    fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 드롭 시 슬롯 해제
struct SlotGuard {
    slot: Arc<TaskSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.slot.busy.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }
}

type RestartHook = Arc<dyn Fn() + Send + Sync>;

/// 자동 업데이터
pub struct AutoUpdater {
    config: UpdateConfig,
    env: Arc<dyn UpdateEnvironment>,
    installer: Arc<dyn Installer>,
    sink: Arc<dyn ProgressSink>,
    on_restart: RestartHook,
    slot: Arc<TaskSlot>,
}

impl AutoUpdater {
    pub fn new(config: UpdateConfig, env: Arc<dyn UpdateEnvironment>) -> Self {
        Self {
            config,
            env,
            installer: Arc::new(PlatformInstaller),
            sink: Arc::new(NullSink),
            on_restart: Arc::new(|| {
                std::process::exit(0);
            }),
            slot: Arc::new(TaskSlot::default()),
        }
    }

    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 교체 스크립트 실행 후 호출: 기본값은 프로세스 종료
    pub fn with_restart_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_restart = Arc::new(hook);
        self
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// 업데이트 태스크 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.slot.is_busy()
    }

    /// 최신 릴리스 확인 (토큰 파일이 없으면 생성)
    pub async fn check_for_update(&self) -> Result<UpdateCheckResult> {
        let locations = self.env.locations()?;
        let token = load_github_token(&locations.token_file)?;
        Ok(self.prepare(&token).await?.result)
    }

    /// 릴리스 조회 + 판정
    pub async fn prepare(&self, token: &str) -> Result<UpdatePreparation> {
        let client = GitHubClient::new(&self.config)?;
        let release = client.fetch_latest_release(token).await?;
        let prep = decide(&release, &self.config.current_version, &self.config.asset_names)?;
        tracing::info!(
            "[Updater] current={} latest={} has_update={} can_auto_update={}",
            prep.result.current_version,
            prep.result.latest_version,
            prep.result.has_update,
            prep.result.can_auto_update
        );
        Ok(prep)
    }

    /// 백그라운드 업데이트 태스크 시작: 이미 실행 중이면 `AlreadyRunning`
    pub fn start(self: &Arc<Self>) -> Result<tokio::task::JoinHandle<()>> {
        let guard = self.slot.try_acquire()?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            this.run_update_task().await;
        }))
    }

    async fn run_update_task(&self) {
        if let Err(e) = self.run_pipeline().await {
            tracing::error!("[Updater] Automatic update failed ({}): {}", e.error_code(), e);
            self.sink.emit(ProgressEvent::error(e.to_string()));
        }
    }

    async fn run_pipeline(&self) -> Result<()> {
        self.emit(UpdateStage::Preparing, 0, "Preparing update");

        let locations = self.env.locations()?;
        let token = load_github_token(&locations.token_file)?;
        let prep = self.prepare(&token).await?;
        let (asset, digest) = prep.ready_for_auto_update()?;

        std::fs::create_dir_all(&locations.updates_dir)
            .map_err(|e| UpdaterError::io("create updates directory", &locations.updates_dir, e))?;

        let pending_path = locations.updates_dir.join(format!(
            "pending_{}{}",
            sanitize_version_for_filename(&prep.result.latest_version),
            std::env::consts::EXE_SUFFIX
        ));

        Downloader::new()?
            .stream(
                &asset.browser_download_url,
                &token,
                &pending_path,
                asset.size,
                self.sink.as_ref(),
            )
            .await?;

        self.emit(UpdateStage::Verifying, 90, "Verifying file integrity");
        let verify_path = pending_path.clone();
        let expected = digest.to_string();
        tokio::task::spawn_blocking(move || verify_file_sha256(&verify_path, &expected))
            .await
            .map_err(|e| UpdaterError::Download(format!("verification task failed: {}", e)))??;

        self.emit(UpdateStage::Replacing, 96, "Replacing local program");
        let request = ReplacementRequest::for_current_process(
            locations.target_executable.clone(),
            pending_path,
            self.config.exit_wait_timeout(),
        );
        self.installer.launch(&locations.updates_dir, &request)?;

        self.emit(UpdateStage::Restarting, 100, "Update succeeded, restarting application");
        tokio::time::sleep(self.config.restart_delay()).await;
        (self.on_restart)();
        Ok(())
    }

    fn emit(&self, stage: UpdateStage, percent: i64, message: &str) {
        self.sink.emit(ProgressEvent::new(stage, percent, message));
    }
}
