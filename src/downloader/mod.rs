use tokio::sync::mpsc::UnboundedReceiver;

use crate::transport::TransferId;

pub mod error;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod task;

pub use error::{DownloadError, Result};
pub use manager::DownloadManager;
pub use task::{TaskSnapshot, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress {
        downloaded: u64,
        expected: Option<u64>,
    },
    Finished(Result<()>),
}

/// [`DownloadManager::download`] 返回的句柄，按顺序接收一个下载的全部事件
#[derive(Debug)]
pub struct DownloadHandle {
    transfer: TransferId,
    url: String,
    events: UnboundedReceiver<DownloadEvent>,
}

impl DownloadHandle {
    pub(crate) fn new(
        transfer: TransferId,
        url: String,
        events: UnboundedReceiver<DownloadEvent>,
    ) -> Self {
        Self {
            transfer,
            url,
            events,
        }
    }

    pub fn transfer(&self) -> TransferId {
        self.transfer
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 下一个事件；`Finished` 之后返回 `None`
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// 丢弃剩余的进度事件，等待最终结果
    pub async fn wait(mut self) -> Result<()> {
        while let Some(event) = self.events.recv().await {
            if let DownloadEvent::Finished(result) = event {
                return result;
            }
        }
        // 管理器保证完成回调一定会被调用，走到这里说明分发任务已经不在了
        Err(DownloadError::Transport("下载事件通道意外关闭".to_string()))
    }
}
