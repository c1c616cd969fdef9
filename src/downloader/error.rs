use thiserror::Error;

use crate::transport::TransferFailure;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("网络传输失败: {0}")]
    Transport(String),

    #[error("下载已取消")]
    Cancelled,

    #[error("该URL已有进行中的下载任务: {0}")]
    DuplicateRequest(String),

    #[error("写入文件失败: {0}")]
    Write(String),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<TransferFailure> for DownloadError {
    fn from(failure: TransferFailure) -> Self {
        match failure {
            TransferFailure::Network(reason) => DownloadError::Transport(reason),
            TransferFailure::Write(reason) => DownloadError::Write(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
