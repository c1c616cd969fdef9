//! 传输层边界：管理器只通过这里的类型与网络实现交互。
//!
//! 管理器为每个操作分配 [`TransferId`]，把 [`TransferRequest`] 和一个 [`EventSink`]
//! 交给 [`Transport::start`]。传输层通过 sink 上报进度和唯一一次终止结果，
//! 事件经由 channel 送回管理器的分发任务。

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod http;

pub use http::HttpTransport;

/// 传输操作句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 取消后如何处理已经写入的部分文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialOutput {
    #[default]
    Keep,
    Remove,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub transfer: TransferId,
    pub url: String,
    pub destination: PathBuf,
    pub partial_output: PartialOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFailure {
    Network(String),
    Write(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failed(TransferFailure),
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Progress {
        transfer: TransferId,
        downloaded: u64,
        expected: Option<u64>,
    },
    Finished {
        transfer: TransferId,
        outcome: TransferOutcome,
    },
}

/// 网络传输实现
///
/// `start` 和 `abort` 都不能等待网络 I/O，管理器会在注册表的临界区里调用它们。
pub trait Transport: Send + Sync + 'static {
    /// 发起一次传输，所有结果都通过 `sink` 异步上报
    fn start(&self, request: TransferRequest, sink: EventSink);

    /// 请求中止；未知句柄直接忽略
    fn abort(&self, transfer: TransferId);
}

/// 单个传输操作的事件出口
///
/// `finish` 会消耗 sink，因此每个操作最多只有一次终止事件；
/// 未调用 `finish` 就被丢弃时会补发一个失败结果。
#[derive(Debug)]
pub struct EventSink {
    transfer: TransferId,
    events: UnboundedSender<TransportEvent>,
    finished: bool,
}

impl EventSink {
    pub fn new(transfer: TransferId, events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            transfer,
            events,
            finished: false,
        }
    }

    pub fn transfer(&self) -> TransferId {
        self.transfer
    }

    pub fn progress(&self, downloaded: u64, expected: Option<u64>) {
        let event = TransportEvent::Progress {
            transfer: self.transfer,
            downloaded,
            expected,
        };
        if self.events.send(event).is_err() {
            debug!("事件通道已关闭，丢弃进度: {}", self.transfer);
        }
    }

    pub fn finish(mut self, outcome: TransferOutcome) {
        self.send_terminal(outcome);
    }

    fn send_terminal(&mut self, outcome: TransferOutcome) {
        self.finished = true;
        let event = TransportEvent::Finished {
            transfer: self.transfer,
            outcome,
        };
        if self.events.send(event).is_err() {
            debug!("事件通道已关闭，丢弃终止事件: {}", self.transfer);
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        if !self.finished {
            warn!("传输操作未上报结果就结束了: {}", self.transfer);
            self.send_terminal(TransferOutcome::Failed(TransferFailure::Network(
                "传输操作未上报结果就结束了".to_string(),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_dropped_sink_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = TransferId::new();
        let sink = EventSink::new(id, tx);
        sink.progress(5, Some(10));
        drop(sink);

        assert_eq!(
            rx.try_recv().ok(),
            Some(TransportEvent::Progress {
                transfer: id,
                downloaded: 5,
                expected: Some(10),
            })
        );
        match rx.try_recv() {
            Ok(TransportEvent::Finished {
                transfer,
                outcome: TransferOutcome::Failed(TransferFailure::Network(_)),
            }) => assert_eq!(transfer, id),
            other => panic!("意外的事件: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finish_sends_exactly_one_terminal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = TransferId::new();
        EventSink::new(id, tx).finish(TransferOutcome::Success);

        assert_eq!(
            rx.try_recv().ok(),
            Some(TransportEvent::Finished {
                transfer: id,
                outcome: TransferOutcome::Success,
            })
        );
        assert!(rx.try_recv().is_err());
    }
}
