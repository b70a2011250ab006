//! 플랫폼별 바이너리 교체: 짧은 외부 스크립트로 핸드오프
//!
//! ## 교체 스크립트 계약
//! 1. 호출 프로세스(PID)가 사라질 때까지 대기 (제한 시간 초과 시 교체 없이 종료, exit 2)
//! 2. 현재 바이너리를 `.bak`으로 백업 (기존 백업은 덮어씀)
//! 3. 검증된 스테이징 파일을 설치 경로로 복사
//! 4. 복사 실패 시 백업에서 복원 후 실패 보고 (exit 3)
//! 5. 설치된 바이너리 재실행
//!
//! 호출 프로세스는 스크립트를 띄운 뒤 결과를 기다리지 않고 종료합니다 (fire-and-forget).
//! 2~5단계의 실패는 다음 실행 시에야 사용자가 알 수 있습니다.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{Result, UpdaterError};

/// 스크립트 종료 코드: 호출 프로세스 종료 대기 시간 초과
pub const EXIT_CODE_TIMEOUT: i32 = 2;
/// 스크립트 종료 코드: 복사 실패 (백업 복원 시도 후)
pub const EXIT_CODE_COPY_FAILED: i32 = 3;

const POWERSHELL_SCRIPT: &str = r#"# nooltools self-update script
param(
  [int]$OldPid,
  [string]$TargetPath,
  [string]$NewFilePath,
  [string]$BackupPath,
  [int]$TimeoutSeconds = 60
)

$ErrorActionPreference = "Stop"

$deadline = (Get-Date).AddSeconds($TimeoutSeconds)
while ((Get-Process -Id $OldPid -ErrorAction SilentlyContinue) -and (Get-Date) -lt $deadline) {
  Start-Sleep -Milliseconds 300
}

if (Get-Process -Id $OldPid -ErrorAction SilentlyContinue) {
  Write-Error "Timed out waiting for target process exit." -ErrorAction Continue
  exit 2
}

if (Test-Path $BackupPath) {
  Remove-Item -Path $BackupPath -Force
}

$backupCreated = $false
if (Test-Path $TargetPath) {
  Copy-Item -Path $TargetPath -Destination $BackupPath -Force
  $backupCreated = $true
}

try {
  Copy-Item -Path $NewFilePath -Destination $TargetPath -Force
  Remove-Item -Path $NewFilePath -Force -ErrorAction SilentlyContinue
}
catch {
  if ($backupCreated -and (Test-Path $BackupPath)) {
    Copy-Item -Path $BackupPath -Destination $TargetPath -Force
  }
  Write-Error "Failed to copy new binary, restored backup." -ErrorAction Continue
  exit 3
}

Start-Sleep -Milliseconds 300
Start-Process -FilePath $TargetPath
exit 0
"#;

const SHELL_SCRIPT: &str = r#"#!/bin/sh
# nooltools self-update script
# usage: apply_update.sh <old_pid> <target_path> <new_file_path> <backup_path> [timeout_secs]

OLD_PID="$1"
TARGET_PATH="$2"
NEW_FILE_PATH="$3"
BACKUP_PATH="$4"
TIMEOUT_SECS="${5:-60}"

deadline=$(( $(date +%s) + TIMEOUT_SECS ))
while kill -0 "$OLD_PID" 2>/dev/null; do
    if [ "$(date +%s)" -ge "$deadline" ]; then
        echo "Timed out waiting for target process exit." >&2
        exit 2
    fi
    sleep 0.3
done

rm -f "$BACKUP_PATH"

backup_created=0
if [ -e "$TARGET_PATH" ]; then
    cp -p "$TARGET_PATH" "$BACKUP_PATH" || exit 3
    backup_created=1
fi

if ! cp "$NEW_FILE_PATH" "$TARGET_PATH"; then
    if [ "$backup_created" -eq 1 ] && [ -e "$BACKUP_PATH" ]; then
        cp -p "$BACKUP_PATH" "$TARGET_PATH"
    fi
    echo "Failed to copy new binary, restored backup." >&2
    exit 3
fi
chmod +x "$TARGET_PATH"
rm -f "$NEW_FILE_PATH"

sleep 0.3
nohup "$TARGET_PATH" >/dev/null 2>&1 &
exit 0
"#;

/// 교체 요청: 스크립트에 그대로 전달되는 인자
#[derive(Debug, Clone)]
pub struct ReplacementRequest {
    pub pid: u32,
    pub target_path: PathBuf,
    pub staged_path: PathBuf,
    pub backup_path: PathBuf,
    pub timeout: Duration,
}

impl ReplacementRequest {
    /// 현재 프로세스를 대상으로 한 요청 생성 (백업은 `<target>.bak`)
    pub fn for_current_process(target_path: PathBuf, staged_path: PathBuf, timeout: Duration) -> Self {
        Self {
            pid: std::process::id(),
            backup_path: backup_path_for(&target_path),
            target_path,
            staged_path,
            timeout,
        }
    }
}

/// 설치 바이너리의 백업 경로 (`<target>.bak`)
pub fn backup_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// 현재 플랫폼의 스크립트 파일명
pub fn script_file_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "apply_update.ps1"
    } else {
        "apply_update.sh"
    }
}

/// 현재 플랫폼의 스크립트 본문
pub fn script_content() -> &'static str {
    if cfg!(target_os = "windows") {
        POWERSHELL_SCRIPT
    } else {
        SHELL_SCRIPT
    }
}

/// 스크립트 파일 작성 (소유자 실행 권한)
pub fn write_apply_script(script_path: &Path) -> Result<()> {
    std::fs::write(script_path, script_content())
        .map_err(|e| UpdaterError::ReplacementFailed(format!("failed to write updater script: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(script_path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
            UpdaterError::ReplacementFailed(format!("failed to mark updater script executable: {}", e))
        })?;
    }
    Ok(())
}

/// 스크립트 실행 커맨드 구성 (실행은 호출자가 결정)
pub fn script_command(script_path: &Path, request: &ReplacementRequest) -> Command {
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("powershell");
        cmd.arg("-NoProfile")
            .args(["-ExecutionPolicy", "Bypass"])
            .arg("-File")
            .arg(script_path)
            .arg("-OldPid")
            .arg(request.pid.to_string())
            .arg("-TargetPath")
            .arg(&request.target_path)
            .arg("-NewFilePath")
            .arg(&request.staged_path)
            .arg("-BackupPath")
            .arg(&request.backup_path)
            .arg("-TimeoutSeconds")
            .arg(request.timeout.as_secs().max(1).to_string());
        cmd
    }

    #[cfg(not(target_os = "windows"))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg(script_path)
            .arg(request.pid.to_string())
            .arg(&request.target_path)
            .arg(&request.staged_path)
            .arg(&request.backup_path)
            .arg(request.timeout.as_secs().max(1).to_string());
        cmd
    }
}

/// 스크립트 종료 코드 해석
pub fn interpret_exit_code(code: Option<i32>, pid: u32) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(EXIT_CODE_TIMEOUT) => Err(UpdaterError::ReplacementTimeout { pid }),
        Some(EXIT_CODE_COPY_FAILED) => Err(UpdaterError::ReplacementFailed(
            "copy over installed binary failed, backup restored".to_string(),
        )),
        Some(other) => Err(UpdaterError::ReplacementFailed(format!(
            "replacement script exited with code {}",
            other
        ))),
        None => Err(UpdaterError::ReplacementFailed(
            "replacement script was terminated by a signal".to_string(),
        )),
    }
}

/// 교체 핸드오프 경계: 검증된 파일을 설치할 프로시저를 띄움
pub trait Installer: Send + Sync {
    /// 프로시저를 분리된 프로세스로 시작. 결과는 기다리지 않음.
    fn launch(&self, updates_dir: &Path, request: &ReplacementRequest) -> Result<()>;
}

/// 플랫폼 네이티브 스크립트 기반 설치기
#[derive(Debug, Default, Clone)]
pub struct PlatformInstaller;

impl Installer for PlatformInstaller {
    fn launch(&self, updates_dir: &Path, request: &ReplacementRequest) -> Result<()> {
        let script_path = updates_dir.join(script_file_name());
        write_apply_script(&script_path)?;

        let mut cmd = script_command(&script_path, request);

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // DETACHED_PROCESS | CREATE_BREAKAWAY_FROM_JOB | CREATE_NEW_PROCESS_GROUP
            cmd.creation_flags(0x00000008 | 0x01000000 | 0x00000200);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // 터미널 시그널이 전달되지 않도록 새 프로세스 그룹
            cmd.process_group(0);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpdaterError::ReplacementFailed(format!("failed to start updater script: {}", e)))?;

        tracing::info!(
            "[Installer] Replacement script spawned for pid {} ({} -> {}), current process should exit now",
            request.pid,
            request.staged_path.display(),
            request.target_path.display()
        );
        Ok(())
    }
}
