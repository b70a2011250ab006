//! 업데이트 진행 이벤트
//!
//! 코어는 장시간 작업 중 `ProgressSink`를 동기적으로 호출하고,
//! UI 등 소비자는 각자 구독합니다. 취소 채널은 없습니다.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// 진행 단계
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    Preparing,
    Downloading,
    Verifying,
    Replacing,
    Restarting,
    Error,
}

impl UpdateStage {
    /// 업데이트 태스크의 마지막 이벤트인지 (`restarting` 또는 `error`)
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateStage::Restarting | UpdateStage::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStage::Preparing => "preparing",
            UpdateStage::Downloading => "downloading",
            UpdateStage::Verifying => "verifying",
            UpdateStage::Replacing => "replacing",
            UpdateStage::Restarting => "restarting",
            UpdateStage::Error => "error",
        }
    }
}

/// 진행 이벤트 (percent는 0~100으로 고정)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub stage: UpdateStage,
    pub percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl ProgressEvent {
    pub fn new(stage: UpdateStage, percent: i64, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.clamp(0, 100) as u8,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// 종료 이벤트: 실패 원인을 detail로 전달
    pub fn error(detail: impl Into<String>) -> Self {
        Self::new(UpdateStage::Error, 0, "Automatic update failed").with_detail(detail)
    }
}

/// 진행 이벤트 수신자
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// 이벤트를 버리는 수신자
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// tokio broadcast 채널 기반 수신자: 여러 구독자에게 전달
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            "[Updater] progress {} {}% {}",
            event.stage.as_str(),
            event.percent,
            event.message
        );
        // 구독자가 없으면 전송 실패: 무시
        let _ = self.tx.send(event);
    }
}

/// 종료 이벤트가 올 때까지 구독 이벤트를 `on_event`로 전달하고 종료 이벤트를 반환
///
/// 수신이 밀려 중간 진행 이벤트를 건너뛰더라도 종료 이벤트는 놓치지 않습니다.
/// 채널이 닫힐 때까지 종료 이벤트가 없으면 `None`.
pub async fn follow_until_terminal(
    rx: &mut broadcast::Receiver<ProgressEvent>,
    mut on_event: impl FnMut(&ProgressEvent),
) -> Option<ProgressEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => {
                on_event(&event);
                if event.stage.is_terminal() {
                    return Some(event);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("[Updater] progress subscriber lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
