use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    EventSink, PartialOutput, TransferFailure, TransferId, TransferOutcome, TransferRequest,
    Transport,
};
use crate::config::HttpConfig;
use crate::storage::{LocalStorage, Storage};

/// 基于 reqwest 的 HTTP 传输实现
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    storage: Arc<dyn Storage>,
    active: Arc<DashMap<TransferId, CancellationToken>>, // transfer -> 取消令牌
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Self::with_storage(config, Arc::new(LocalStorage))
    }

    pub fn with_storage(
        config: &HttpConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            storage,
            active: Arc::new(DashMap::new()),
        })
    }

    /// 正在进行中的传输数量
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    async fn run(
        client: reqwest::Client,
        storage: Arc<dyn Storage>,
        active: Arc<DashMap<TransferId, CancellationToken>>,
        token: CancellationToken,
        request: TransferRequest,
        sink: EventSink,
    ) {
        let outcome = tokio::select! {
            _ = token.cancelled() => TransferOutcome::Aborted,
            result = Self::fetch(&client, storage.as_ref(), &request, &sink) => match result {
                Ok(()) => TransferOutcome::Success,
                Err(failure) => TransferOutcome::Failed(failure),
            },
        };

        if outcome == TransferOutcome::Aborted {
            info!("传输已中止: {}", request.url);
            if request.partial_output == PartialOutput::Remove {
                if let Err(e) = storage.discard(&request.destination).await {
                    warn!("删除部分输出失败: {}, 错误: {}", request.destination.display(), e);
                }
            }
        }

        active.remove(&request.transfer);
        sink.finish(outcome);
    }

    async fn fetch(
        client: &reqwest::Client,
        storage: &dyn Storage,
        request: &TransferRequest,
        sink: &EventSink,
    ) -> Result<(), TransferFailure> {
        debug!("开始请求: {}", request.url);
        let response = client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| TransferFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("❌ 非成功状态码: {}, URL: {}", status, request.url);
            return Err(TransferFailure::Network(format!(
                "HTTP 请求失败，状态码: {}",
                status
            )));
        }

        let expected = response.content_length();
        debug!("Content Length: {:?}", expected);

        let mut writer = storage
            .create(&request.destination)
            .await
            .map_err(|e| write_failure(&request.destination, e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferFailure::Network(e.to_string()))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| write_failure(&request.destination, e))?;
            downloaded += chunk.len() as u64;
            sink.progress(downloaded, expected);
        }

        writer
            .flush()
            .await
            .map_err(|e| write_failure(&request.destination, e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| write_failure(&request.destination, e))?;

        debug!("下载完成: {}, 共 {} 字节", request.url, downloaded);
        Ok(())
    }
}

fn write_failure(path: &Path, err: std::io::Error) -> TransferFailure {
    TransferFailure::Write(format!("{}: {}", path.display(), err))
}

impl Transport for HttpTransport {
    fn start(&self, request: TransferRequest, sink: EventSink) {
        let token = CancellationToken::new();
        self.active.insert(request.transfer, token.clone());

        tokio::spawn(Self::run(
            self.client.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.active),
            token,
            request,
            sink,
        ));
    }

    fn abort(&self, transfer: TransferId) {
        match self.active.get(&transfer) {
            Some(token) => token.cancel(),
            None => debug!("中止请求的传输不存在或已结束: {}", transfer),
        }
    }
}
