use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tracing::debug;

pub type OutputWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 文件系统边界：负责把收到的字节落盘
#[async_trait]
pub trait Storage: Send + Sync {
    /// 创建（或截断）目标文件
    async fn create(&self, path: &Path) -> io::Result<OutputWriter>;

    /// 删除已写入的部分输出，文件不存在时视为成功
    async fn discard(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

#[async_trait]
impl Storage for LocalStorage {
    async fn create(&self, path: &Path) -> io::Result<OutputWriter> {
        let file = tokio::fs::File::create(path).await?;
        debug!("已创建输出文件: {}", path.display());
        Ok(Box::new(file))
    }

    async fn discard(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("已删除部分输出: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_local_storage_create_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut writer = LocalStorage.create(&path).await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        LocalStorage.discard(&path).await.unwrap();
        assert!(!path.exists());

        // 再删一次也不报错
        LocalStorage.discard(&path).await.unwrap();
    }
}
