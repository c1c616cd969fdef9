use std::collections::HashMap;
use std::fmt;

use url::Url;

use super::error::DownloadError;
use super::task::{DownloadTask, TaskSnapshot};
use crate::transport::TransferId;

/// 任务在注册表中的身份：URL 的规范化字符串
///
/// scheme 和 host 统一小写，默认端口被去掉，空路径规范为 `/`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlKey(String);

impl UrlKey {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw.trim())?;
        Ok(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL -> 活跃任务 的映射，同一个 URL 最多只有一个任务
///
/// 另外维护 transfer -> URL 的索引，用于把传输层事件路由到任务。
/// 本身不加锁，由管理器放在同一把互斥锁后面。
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<UrlKey, DownloadTask>,
    transfers: HashMap<TransferId, UrlKey>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &UrlKey) -> bool {
        self.tasks.contains_key(url)
    }

    pub fn insert(&mut self, task: DownloadTask) -> Result<(), DownloadError> {
        if self.tasks.contains_key(task.url()) {
            return Err(DownloadError::DuplicateRequest(task.url().to_string()));
        }
        self.transfers.insert(task.transfer(), task.url().clone());
        self.tasks.insert(task.url().clone(), task);
        Ok(())
    }

    pub fn get_mut(&mut self, url: &UrlKey) -> Option<&mut DownloadTask> {
        self.tasks.get_mut(url)
    }

    pub fn get_by_transfer_mut(&mut self, transfer: TransferId) -> Option<&mut DownloadTask> {
        let url = self.transfers.get(&transfer)?;
        self.tasks.get_mut(url)
    }

    pub fn remove_by_transfer(&mut self, transfer: TransferId) -> Option<DownloadTask> {
        let url = self.transfers.remove(&transfer)?;
        self.tasks.remove(&url)
    }

    pub fn snapshot(&self, url: &UrlKey) -> Option<TaskSnapshot> {
        self.tasks.get(url).map(DownloadTask::snapshot)
    }

    #[cfg(test)]
    pub fn transfers(&self) -> Vec<TransferId> {
        self.transfers.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DownloadTask> {
        self.tasks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
