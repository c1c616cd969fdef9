#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlmanager::downloader::DownloadHandle;
use dlmanager::transport::{EventSink, TransferId, TransferOutcome, TransferRequest, Transport};
use dlmanager::DownloadEvent;
use tokio_util::sync::CancellationToken;

/// 由测试手动驱动的传输层：保存每个操作的 sink，测试决定何时上报事件
#[derive(Default)]
pub struct ManualTransport {
    sinks: Mutex<HashMap<String, EventSink>>,
    requests: Mutex<Vec<TransferRequest>>,
    aborted: Mutex<Vec<TransferId>>,
    finish_on_abort: bool,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// abort 时立即上报 Aborted
    pub fn aborting() -> Arc<Self> {
        Arc::new(Self {
            finish_on_abort: true,
            ..Self::default()
        })
    }

    pub fn take_sink(&self, url: &str) -> EventSink {
        self.sinks
            .lock()
            .unwrap()
            .remove(url)
            .unwrap_or_else(|| panic!("没有进行中的操作: {}", url))
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> Vec<TransferId> {
        self.aborted.lock().unwrap().clone()
    }
}

impl Transport for ManualTransport {
    fn start(&self, request: TransferRequest, sink: EventSink) {
        self.sinks.lock().unwrap().insert(request.url.clone(), sink);
        self.requests.lock().unwrap().push(request);
    }

    fn abort(&self, transfer: TransferId) {
        self.aborted.lock().unwrap().push(transfer);
        if !self.finish_on_abort {
            return;
        }
        let sink = {
            let mut sinks = self.sinks.lock().unwrap();
            let url = sinks
                .iter()
                .find(|(_, sink)| sink.transfer() == transfer)
                .map(|(url, _)| url.clone());
            url.and_then(|url| sinks.remove(&url))
        };
        if let Some(sink) = sink {
            sink.finish(TransferOutcome::Aborted);
        }
    }
}

/// 自动运行的传输层：按脚本依次上报进度，最后上报成功，期间响应 abort
pub struct ScriptedTransport {
    steps: Vec<(u64, Option<u64>)>,
    tokens: Mutex<HashMap<TransferId, CancellationToken>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<(u64, Option<u64>)>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            tokens: Mutex::new(HashMap::new()),
        })
    }
}

impl Transport for ScriptedTransport {
    fn start(&self, request: TransferRequest, sink: EventSink) {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap()
            .insert(request.transfer, token.clone());
        let steps = self.steps.clone();

        tokio::spawn(async move {
            for (downloaded, expected) in steps {
                tokio::select! {
                    _ = token.cancelled() => {
                        sink.finish(TransferOutcome::Aborted);
                        return;
                    }
                    _ = tokio::task::yield_now() => {}
                }
                sink.progress(downloaded, expected);
            }
            sink.finish(TransferOutcome::Success);
        });
    }

    fn abort(&self, transfer: TransferId) {
        if let Some(token) = self.tokens.lock().unwrap().get(&transfer) {
            token.cancel();
        }
    }
}

/// 收集一个下载的全部事件，直到通道关闭
pub async fn collect_events(mut handle: DownloadHandle) -> Vec<DownloadEvent> {
    tokio::time::timeout(Duration::from_secs(10), async move {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("等待下载事件超时")
}

/// 断言恰好有一个终止事件且位于最后，返回它的结果
pub fn single_outcome(events: &[DownloadEvent]) -> Result<(), dlmanager::DownloadError> {
    let finished: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            DownloadEvent::Finished(result) => Some(result.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 1, "终止事件数量不对: {:?}", events);
    assert!(
        matches!(events.last(), Some(DownloadEvent::Finished(_))),
        "终止事件不是最后一个: {:?}",
        events
    );
    finished.into_iter().next().unwrap()
}
