pub mod common;
pub mod config;
pub mod downloader;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use downloader::{
    DownloadError, DownloadEvent, DownloadHandle, DownloadManager, TaskSnapshot, TaskState,
};
pub use transport::{PartialOutput, TransferId, Transport};
