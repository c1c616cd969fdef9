use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, warn};

use super::error::DownloadError;
use super::registry::UrlKey;
use crate::transport::{TransferId, TransferOutcome};

pub type ProgressCallback = Box<dyn FnMut(u64, Option<u64>) + Send>;
pub type CompletionCallback = Box<dyn FnOnce(Result<(), DownloadError>) + Send>;

/// 任务状态机
///
/// `Active -> {Completed, Failed, Cancelling}`，`Cancelling -> {Cancelled, Failed}`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Active,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// 根据传输层的终止结果计算下一个状态
    fn resolve(self, outcome: &TransferOutcome) -> Option<TaskState> {
        match (self, outcome) {
            (TaskState::Active, TransferOutcome::Success) => Some(TaskState::Completed),
            (TaskState::Active, TransferOutcome::Failed(_)) => Some(TaskState::Failed),
            (TaskState::Active, TransferOutcome::Aborted) => Some(TaskState::Cancelled),
            // 取消之后到达的成功结果按取消处理
            (TaskState::Cancelling, TransferOutcome::Success) => Some(TaskState::Cancelled),
            (TaskState::Cancelling, TransferOutcome::Aborted) => Some(TaskState::Cancelled),
            (TaskState::Cancelling, TransferOutcome::Failed(_)) => Some(TaskState::Failed),
            _ => None,
        }
    }
}

/// 任务的只读快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub url: String,
    pub destination: PathBuf,
    pub state: TaskState,
    pub downloaded: u64,
    pub expected: Option<u64>,
}

pub struct DownloadTask {
    url: UrlKey,
    destination: PathBuf,
    transfer: TransferId,
    expected: Option<u64>,
    downloaded: u64,
    state: TaskState,
    on_progress: ProgressCallback,
    on_complete: Option<CompletionCallback>,
}

impl DownloadTask {
    pub fn new(
        url: UrlKey,
        destination: PathBuf,
        transfer: TransferId,
        on_progress: ProgressCallback,
        on_complete: CompletionCallback,
    ) -> Self {
        Self {
            url,
            destination,
            transfer,
            expected: None,
            downloaded: 0,
            state: TaskState::Active,
            on_progress,
            on_complete: Some(on_complete),
        }
    }

    pub fn url(&self) -> &UrlKey {
        &self.url
    }

    pub fn transfer(&self) -> TransferId {
        self.transfer
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            url: self.url.to_string(),
            destination: self.destination.clone(),
            state: self.state,
            downloaded: self.downloaded,
            expected: self.expected,
        }
    }

    /// Active -> Cancelling，返回是否发生了状态变化
    pub fn request_cancel(&mut self) -> bool {
        if self.state == TaskState::Active {
            self.state = TaskState::Cancelling;
            true
        } else {
            false
        }
    }

    /// 记录进度并在任务仍处于 Active 时通知调用方
    ///
    /// 返回是否转发给了调用方。
    pub fn record_progress(&mut self, downloaded: u64, expected: Option<u64>) -> bool {
        if self.state != TaskState::Active {
            debug!("任务不在下载中，忽略进度: {} ({:?})", self.url, self.state);
            return false;
        }
        if downloaded < self.downloaded {
            warn!(
                "进度回退，忽略: {} ({} < {})",
                self.url, downloaded, self.downloaded
            );
            return false;
        }

        self.downloaded = downloaded;
        if expected.is_some() {
            self.expected = expected;
        }

        let (downloaded, expected) = (self.downloaded, self.expected);
        let on_progress = &mut self.on_progress;
        if panic::catch_unwind(AssertUnwindSafe(|| on_progress(downloaded, expected))).is_err() {
            error!("进度回调发生 panic: {}", self.url);
        }
        true
    }

    /// 进入终止状态，返回交给完成回调的结果
    ///
    /// 任务已经处于终止状态时返回 `None`。
    pub fn resolve(&mut self, outcome: TransferOutcome) -> Option<Result<(), DownloadError>> {
        let next = self.state.resolve(&outcome)?;
        if self.state == TaskState::Cancelling && outcome == TransferOutcome::Success {
            warn!("取消后收到成功结果，按取消处理: {}", self.url);
        }
        self.state = next;

        Some(match (next, outcome) {
            (TaskState::Completed, _) => Ok(()),
            (TaskState::Failed, TransferOutcome::Failed(failure)) => Err(failure.into()),
            _ => Err(DownloadError::Cancelled),
        })
    }

    /// 与 [`resolve`](Self::resolve) 相同，但总是给出一个结果
    ///
    /// 状态机不接受该终止结果时按传输错误交付，完成回调仍然会被调用。
    pub fn settle(&mut self, outcome: TransferOutcome) -> Result<(), DownloadError> {
        let previous = self.state;
        self.resolve(outcome).unwrap_or_else(|| {
            error!("任务状态不接受终止结果: {} ({:?})", self.url, previous);
            if !previous.is_terminal() {
                self.state = TaskState::Failed;
            }
            Err(DownloadError::Transport(format!(
                "任务状态异常: {:?}",
                previous
            )))
        })
    }

    /// 调用完成回调，只会生效一次
    pub fn complete(mut self, result: Result<(), DownloadError>) {
        let Some(on_complete) = self.on_complete.take() else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| on_complete(result))).is_err() {
            error!("完成回调发生 panic: {}", self.url);
        }
    }
}
