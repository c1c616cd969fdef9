use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::error::{DownloadError, Result};
use super::registry::{TaskRegistry, UrlKey};
use super::task::{DownloadTask, TaskSnapshot};
use super::{DownloadEvent, DownloadHandle};
use crate::config::Config;
use crate::transport::{
    EventSink, HttpTransport, PartialOutput, TransferId, TransferRequest, Transport,
    TransportEvent,
};

/// 下载管理器
///
/// 同一个 URL 同时最多只有一个下载任务。传输层的事件由后台分发任务
/// 按 transfer 句柄路由到对应任务，再调用调用方提供的回调。
///
/// 必须在 tokio 运行时内创建。
#[derive(Clone)]
pub struct DownloadManager {
    registry: Arc<Mutex<TaskRegistry>>,
    transport: Arc<dyn Transport>,
    events: UnboundedSender<TransportEvent>,
    partial_output: PartialOutput,
}

impl DownloadManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_partial_output(transport, PartialOutput::default())
    }

    pub fn with_partial_output(transport: Arc<dyn Transport>, partial_output: PartialOutput) -> Self {
        let registry = Arc::new(Mutex::new(TaskRegistry::new()));
        let (events, receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::dispatch(Arc::clone(&registry), receiver));

        Self {
            registry,
            transport,
            events,
            partial_output,
        }
    }

    /// 使用 HTTP 传输层创建管理器
    pub fn from_config(config: &Config) -> std::result::Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(&config.http)?;
        Ok(Self::with_partial_output(
            Arc::new(transport),
            config.partial_output,
        ))
    }

    /// 开始下载 `url` 到 `destination`
    ///
    /// 返回 `Ok` 表示请求被接受，此后 `on_complete` 一定会被调用且只调用一次；
    /// 该 URL 已有活跃任务时返回 [`DownloadError::DuplicateRequest`]，不会调用任何回调。
    pub async fn start<P, C>(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        on_progress: P,
        on_complete: C,
    ) -> Result<TransferId>
    where
        P: FnMut(u64, Option<u64>) + Send + 'static,
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let key = UrlKey::parse(url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        let destination = destination.into();
        let transfer = TransferId::new();

        let task = DownloadTask::new(
            key.clone(),
            destination.clone(),
            transfer,
            Box::new(on_progress),
            Box::new(on_complete),
        );

        let mut registry = self.registry.lock().await;
        if let Err(e) = registry.insert(task) {
            warn!("⏭️ 拒绝重复的下载请求: {}", key);
            return Err(e);
        }

        // 在锁内启动传输，保证 cancel 看到任务时传输层已经认识这个句柄
        let request = TransferRequest {
            transfer,
            url: key.as_str().to_owned(),
            destination,
            partial_output: self.partial_output,
        };
        self.transport
            .start(request, EventSink::new(transfer, self.events.clone()));
        drop(registry);

        info!("开始下载任务: {} ({})", key, transfer);
        Ok(transfer)
    }

    /// 取消 `url` 对应的下载；没有活跃任务时什么都不做
    pub async fn cancel(&self, url: &str) {
        let Ok(key) = UrlKey::parse(url) else {
            debug!("取消请求的URL无效，忽略: {}", url);
            return;
        };

        let transfer = {
            let mut registry = self.registry.lock().await;
            match registry.get_mut(&key) {
                Some(task) => {
                    if !task.request_cancel() {
                        debug!("任务已在取消中: {}", key);
                        return;
                    }
                    task.transfer()
                }
                None => {
                    debug!("没有需要取消的任务: {}", key);
                    return;
                }
            }
        };

        info!("请求取消下载: {}", key);
        self.transport.abort(transfer);
    }

    /// 取消所有活跃任务，返回本次发出取消请求的数量
    pub async fn cancel_all(&self) -> usize {
        let transfers: Vec<TransferId> = {
            let mut registry = self.registry.lock().await;
            registry
                .iter_mut()
                .filter_map(|task| task.request_cancel().then_some(task.transfer()))
                .collect()
        };

        for transfer in &transfers {
            self.transport.abort(*transfer);
        }
        if !transfers.is_empty() {
            info!("已请求取消 {} 个下载任务", transfers.len());
        }
        transfers.len()
    }

    /// 以事件通道的形式下载，适合需要 `await` 结果的调用方
    pub async fn download(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
    ) -> Result<DownloadHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress_tx = tx.clone();

        let transfer = self
            .start(
                url,
                destination,
                move |downloaded, expected| {
                    let _ = progress_tx.send(DownloadEvent::Progress {
                        downloaded,
                        expected,
                    });
                },
                move |result| {
                    let _ = tx.send(DownloadEvent::Finished(result));
                },
            )
            .await?;

        Ok(DownloadHandle::new(transfer, url.to_string(), rx))
    }

    pub async fn status(&self, url: &str) -> Option<TaskSnapshot> {
        let key = UrlKey::parse(url).ok()?;
        self.registry.lock().await.snapshot(&key)
    }

    pub async fn is_tracking(&self, url: &str) -> bool {
        match UrlKey::parse(url) {
            Ok(key) => self.registry.lock().await.contains(&key),
            Err(_) => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    async fn dispatch(
        registry: Arc<Mutex<TaskRegistry>>,
        mut events: UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Progress {
                    transfer,
                    downloaded,
                    expected,
                } => {
                    // 进度回调在锁内调用：cancel 返回之后不会再有进度回调
                    let mut registry = registry.lock().await;
                    match registry.get_by_transfer_mut(transfer) {
                        Some(task) => {
                            task.record_progress(downloaded, expected);
                        }
                        None => debug!("丢弃已结束任务的进度: {}", transfer),
                    }
                }
                TransportEvent::Finished { transfer, outcome } => {
                    // 先移出注册表再回调，回调里可以立即重新下载同一个 URL
                    let removed = registry.lock().await.remove_by_transfer(transfer);
                    let Some(mut task) = removed else {
                        warn!("丢弃未知任务的终止事件: {} ({:?})", transfer, outcome);
                        continue;
                    };

                    let result = task.settle(outcome);
                    match &result {
                        Ok(()) => info!("✅ 下载任务完成: {}", task.url()),
                        Err(DownloadError::Cancelled) => info!("下载任务已取消: {}", task.url()),
                        Err(e) => error!("❌ 下载任务失败: {}, 错误: {}", task.url(), e),
                    }
                    task.complete(result);
                }
            }
        }
        debug!("事件通道已关闭，分发任务退出");
    }
}
